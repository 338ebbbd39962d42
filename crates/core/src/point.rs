//! Point records and shared point lists

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Attribute value types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AttributeValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// A located sample `{x, y, t, v}` with optional named attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub t: f64,
    #[serde(default)]
    pub v: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl Point {
    pub fn new(x: f64, y: f64, v: f64) -> Self {
        Self {
            x,
            y,
            t: 0.0,
            v,
            attributes: BTreeMap::new(),
        }
    }

    /// Set an attribute
    pub fn set_attribute(&mut self, key: impl Into<String>, value: AttributeValue) {
        self.attributes.insert(key.into(), value);
    }

    /// Get an attribute
    pub fn attribute(&self, key: &str) -> Option<&AttributeValue> {
        self.attributes.get(key)
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: AttributeValue) -> Self {
        self.set_attribute(key, value);
        self
    }
}

/// Ordered list of points, shared by every clone of the list.
///
/// Cloning a `PointList` yields another handle on the same records; use
/// [`PointList::deep_copy`] for an independent list.
#[derive(Debug, Clone, Default)]
pub struct PointList(Arc<RwLock<Vec<Point>>>);

impl PointList {
    pub fn new(points: Vec<Point>) -> Self {
        Self(Arc::new(RwLock::new(points)))
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Vec<Point>> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<Point>> {
        self.0.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current records
    pub fn snapshot(&self) -> Vec<Point> {
        self.read().clone()
    }

    pub fn deep_copy(&self) -> Self {
        Self::new(self.snapshot())
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub fn extend(&self, points: impl IntoIterator<Item = Point>) {
        self.write().extend(points);
    }

    pub fn clear(&self) {
        self.write().clear();
    }

    pub fn shares_storage(&self, other: &PointList) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Vec<Point>> for PointList {
    fn from(points: Vec<Point>) -> Self {
        Self::new(points)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_records() {
        let list = PointList::new(vec![Point::new(1.0, 2.0, 3.0)]);
        let handle = list.clone();
        handle.extend([Point::new(4.0, 5.0, 6.0)]);
        assert_eq!(list.len(), 2);

        let copy = list.deep_copy();
        copy.clear();
        assert_eq!(list.len(), 2);
        assert!(!copy.shares_storage(&list));
    }

    #[test]
    fn test_point_json_defaults() {
        let p: Point = serde_json::from_str(r#"{"x": 1.5, "y": 2.5, "attributes": {"id": 7}}"#).unwrap();
        assert_eq!(p.t, 0.0);
        assert_eq!(p.v, 0.0);
        assert_eq!(p.attribute("id"), Some(&AttributeValue::Int(7)));
    }
}
