//! Zonal statistics
//!
//! Computes statistics for each zone defined by a zone layer and writes
//! the statistic of a cell's zone into every cell of that zone.
//! Zones are identified by the exact cell values of the zone layer.

use gridwork_core::{Domain, Error, Partition, Result};
use gridwork_parallel::{OpClass, OperationSpec, TaskGroup};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Available zonal statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZonalStatistic {
    Sum,
    Mean,
    Min,
    Max,
    /// Most frequent value (smallest value on ties)
    Majority,
    /// Least frequent value (smallest value on ties)
    Minority,
}

impl ZonalStatistic {
    fn operation_name(&self) -> &'static str {
        match self {
            ZonalStatistic::Sum => "ZonalSum",
            ZonalStatistic::Mean => "ZonalMean",
            ZonalStatistic::Min => "ZonalMinimum",
            ZonalStatistic::Max => "ZonalMaximum",
            ZonalStatistic::Majority => "ZonalMajority",
            ZonalStatistic::Minority => "ZonalMinority",
        }
    }
}

impl std::str::FromStr for ZonalStatistic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "sum" => Ok(ZonalStatistic::Sum),
            "mean" => Ok(ZonalStatistic::Mean),
            "min" | "minimum" => Ok(ZonalStatistic::Min),
            "max" | "maximum" => Ok(ZonalStatistic::Max),
            "majority" => Ok(ZonalStatistic::Majority),
            "minority" => Ok(ZonalStatistic::Minority),
            other => Err(Error::InvalidParameter {
                name: "statistic",
                value: other.to_string(),
                reason: "expected sum, mean, min, max, majority or minority".to_string(),
            }),
        }
    }
}

/// Running totals of the values of one zone
#[derive(Debug, Default)]
struct ZoneAccumulator {
    count: usize,
    sum: f64,
    min: f64,
    max: f64,
    frequencies: HashMap<u64, usize>,
}

impl ZoneAccumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
        *self.frequencies.entry(value_key(value)).or_default() += 1;
    }

    fn finish(&self, statistic: ZonalStatistic) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match statistic {
            ZonalStatistic::Sum => Some(self.sum),
            ZonalStatistic::Mean => Some(self.sum / self.count as f64),
            ZonalStatistic::Min => Some(self.min),
            ZonalStatistic::Max => Some(self.max),
            ZonalStatistic::Majority => self.mode(|a, b| b.cmp(&a)),
            ZonalStatistic::Minority => self.mode(|a, b| a.cmp(&b)),
        }
    }

    /// Value whose frequency ranks first under `rank`, smallest value on ties
    fn mode(&self, rank: impl Fn(usize, usize) -> Ordering) -> Option<f64> {
        self.frequencies
            .iter()
            .map(|(&bits, &n)| (f64::from_bits(bits), n))
            .min_by(|a, b| rank(a.1, b.1).then(a.0.total_cmp(&b.0)))
            .map(|(v, _)| v)
    }
}

/// Hash key of a cell value; +0 and -0 are the same zone
fn value_key(value: f64) -> u64 {
    if value == 0.0 { 0.0f64.to_bits() } else { value.to_bits() }
}

/// Zonal statistics of `values` over the zones of `zones`.
///
/// Both layers must share their geometry. Zonal operations always see the
/// whole domain: every tile accumulates over all cells of the zones it
/// contains. Nodata values are skipped; cells in a nodata zone, or in a
/// zone without valid values, receive nodata.
pub fn zonal_statistics(values: Domain, zones: Domain, statistic: ZonalStatistic) -> Result<OperationSpec> {
    if values.shape() != zones.shape() {
        let (er, ec) = values.shape().unwrap_or_default();
        let (ar, ac) = zones.shape().unwrap_or_default();
        return Err(Error::SizeMismatch { er, ec, ar, ac });
    }
    OperationSpec::builder(statistic.operation_name(), OpClass::Zonal)
        .layers([values, zones])
        .bulk_fn(move |group| zonal_tile(group, statistic))
        .build()
}

fn zonal_tile(group: &TaskGroup, statistic: ZonalStatistic) -> Result<()> {
    let output = group.output();
    let values: &Partition = group.input(0)?;
    let zones: &Partition = group.input(1)?;
    let core = output.core();
    let nodata = output.nodata().unwrap_or(f64::NAN);

    let mut accumulators: HashMap<u64, ZoneAccumulator> = HashMap::new();
    for (r, c) in core.cells() {
        let zone = zones.value_at(r, c)?;
        if !zones.is_nodata(zone) {
            accumulators.entry(value_key(zone)).or_default();
        }
    }

    let scan = values
        .data_window()
        .intersect(&zones.data_window())
        .ok_or_else(|| Error::Operation(format!("'{}' and '{}' do not overlap", values.title(), zones.title())))?;
    for (r, c) in scan.cells() {
        let zone = zones.value_at(r, c)?;
        if zones.is_nodata(zone) {
            continue;
        }
        if let Some(acc) = accumulators.get_mut(&value_key(zone)) {
            let v = values.value_at(r, c)?;
            if !values.is_nodata(v) {
                acc.push(v);
            }
        }
    }

    let results: HashMap<u64, Option<f64>> = accumulators
        .iter()
        .map(|(&zone, acc)| (zone, acc.finish(statistic)))
        .collect();
    for (r, c) in core.cells() {
        let zone = zones.value_at(r, c)?;
        let value = results.get(&value_key(zone)).copied().flatten().unwrap_or(nodata);
        output.set_at(r, c, value)?;
    }
    Ok(())
}
