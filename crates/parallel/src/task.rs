//! Task groups: the aligned partitions of every layer for one tile

use crate::config::EngineConfig;
use crate::decompose::Buffer;
use crate::operation::OperationSpec;
use gridwork_core::{DataKind, Domain, Error, Partition, Result};
use tracing::debug;

/// Same-tile partitions of every layer, output first.
#[derive(Debug)]
pub struct TaskGroup {
    index: usize,
    partitions: Vec<Partition>,
}

impl TaskGroup {
    pub fn new(index: usize, partitions: Vec<Partition>) -> Result<Self> {
        if partitions.is_empty() {
            return Err(Error::AssertionFailed(format!("task group {} has no output partition", index)));
        }
        Ok(Self { index, partitions })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    /// Output partition (always index 0)
    pub fn output(&self) -> &Partition {
        &self.partitions[0]
    }

    /// Input partitions in layer order
    pub fn inputs(&self) -> &[Partition] {
        &self.partitions[1..]
    }

    /// Input layer `index`, or an operation error naming the missing layer
    pub fn input(&self, index: usize) -> Result<&Partition> {
        self.inputs()
            .get(index)
            .ok_or_else(|| Error::Operation(format!("operation expects input layer {}", index + 1)))
    }

    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }
}

/// Title given to the output domain of an operation
pub fn output_title(operation: &str) -> String {
    format!("Output for operation {}", operation)
}

/// Duplicate the first layer as output, decompose every layer and group
/// the partitions tile by tile.
///
/// The output is decomposed without a halo so no two groups write the same
/// output cell; inputs use the operation's buffer.
pub fn build_task_groups(spec: &OperationSpec, config: &EngineConfig) -> Result<(Domain, Vec<TaskGroup>)> {
    let first = spec
        .layers()
        .first()
        .ok_or_else(|| Error::AssertionFailed(format!("operation '{}' has no layers", spec.name())))?;
    let output = first.duplicate(output_title(spec.name()))?;
    if let (Some(value), Some(view)) = (spec.initial_value(), output.grid()) {
        view.fill(value);
    }

    let tiles = spec.decomposition().decompose(&output, Buffer::NONE, config.granularity)?;
    let output_parts = output.to_partitions(&tiles)?;
    if output.data_kind() == Some(DataKind::Points)
        && let Some(list) = output.points()
    {
        // refilled from the output partitions after the run
        list.clear();
    }
    let tile_count = output_parts.len();

    let mut per_layer = vec![output_parts];
    for layer in spec.layers() {
        let tiles = spec.decomposition().decompose(layer, spec.buffer(), config.granularity)?;
        let parts = layer.to_partitions(&tiles)?;
        if parts.len() != tile_count {
            return Err(Error::AssertionFailed(format!(
                "layer '{}' decomposes into {} tiles, output into {}",
                layer.title(),
                parts.len(),
                tile_count
            )));
        }
        per_layer.push(parts);
    }

    // Transpose layer-major lists into tile-major groups
    let mut columns: Vec<_> = per_layer.into_iter().map(Vec::into_iter).collect();
    let mut groups = Vec::with_capacity(tile_count);
    for index in 0..tile_count {
        let partitions = columns.iter_mut().filter_map(Iterator::next).collect();
        groups.push(TaskGroup::new(index, partitions)?);
    }

    debug!(
        "Operation '{}': {} layers into {} task groups (buffer {})",
        spec.name(),
        spec.layers().len(),
        groups.len(),
        spec.buffer()
    );
    Ok((output, groups))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decompose::Decomposition;
    use crate::operation::OpClass;
    use gridwork_core::extent::Extent;
    use gridwork_core::{CellWindow, Point};
    use ndarray::Array2;

    fn grid(title: &str, rows: usize, cols: usize) -> Domain {
        Domain::from_array(title, 0.0, 0.0, &Array2::zeros((rows, cols)), 1.0, None).unwrap()
    }

    #[test]
    fn test_groups_are_aligned() {
        let spec = OperationSpec::builder("mean", OpClass::Focal)
            .layers([grid("a", 10, 4), grid("b", 10, 4)])
            .buffer_size(1.0)
            .bulk_fn(|_| Ok(()))
            .build()
            .unwrap();
        let config = EngineConfig::serial().with_granularity(4);
        let (output, groups) = build_task_groups(&spec, &config).unwrap();

        assert_eq!(output.title(), "Output for operation mean");
        assert_eq!(groups.len(), 3);
        for group in &groups {
            assert_eq!(group.partitions().len(), 3);
            let core = group.output().core();
            assert_eq!(group.output().data_window(), core);
            for input in group.inputs() {
                assert_eq!(input.core(), core);
                assert!(input.data_window().contains_window(&core));
            }
        }
        assert_eq!(groups[1].input(0).unwrap().data_window(), CellWindow::new(3, 0, 6, 4));
        assert!(groups[0].output().grid().unwrap().shares_storage(output.grid().unwrap()));
    }

    #[test]
    fn test_initial_value_fills_output() {
        let spec = OperationSpec::builder("spread", OpClass::Focal)
            .layer(grid("a", 4, 4))
            .initial_value(f64::INFINITY)
            .bulk_fn(|_| Ok(()))
            .build()
            .unwrap();
        let (output, _) = build_task_groups(&spec, &EngineConfig::serial()).unwrap();
        assert!(output.to_array().unwrap().iter().all(|v| v.is_infinite()));
    }

    #[test]
    fn test_mismatched_tile_counts() {
        let spec = OperationSpec::builder("sum", OpClass::Local)
            .layers([grid("a", 8, 4), grid("b", 12, 4)])
            .cell_fn(|ctx| Ok(ctx.values.iter().sum()))
            .build()
            .unwrap();
        let config = EngineConfig::serial().with_granularity(4);
        assert!(matches!(build_task_groups(&spec, &config), Err(Error::AssertionFailed(_))));
    }

    #[test]
    fn test_point_output_is_emptied() {
        let extent = Extent::new(0.0, 0.0, 4.0, 4.0).unwrap();
        let points = vec![Point::new(0.5, 0.5, 1.0), Point::new(0.5, 3.5, 2.0)];
        let layer = Domain::from_points("pts", extent, points, Some(1.0)).unwrap();
        let spec = OperationSpec::builder("copy", OpClass::Local)
            .layer(layer)
            .decomposition(Decomposition::Row)
            .cell_fn(|ctx| Ok(ctx.values.len() as f64))
            .build()
            .unwrap();
        let (output, groups) = build_task_groups(&spec, &EngineConfig::serial().with_granularity(2)).unwrap();
        assert_eq!(output.points().unwrap().len(), 0);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].output().points().unwrap().len(), 1);
        assert_eq!(groups[1].output().points().unwrap().len(), 1);
    }
}
