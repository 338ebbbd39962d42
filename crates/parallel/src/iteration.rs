//! Order in which the cells of an output partition are visited

use gridwork_core::Partition;
use std::fmt;
use std::sync::Arc;

pub type IterationFn = dyn Fn(&Partition) -> Vec<(usize, usize)> + Send + Sync;

/// Produces absolute (row, col) coordinates over a partition's core
#[derive(Clone, Default)]
pub enum IterationOrder {
    #[default]
    RowMajor,
    ColumnMajor,
    Custom(Arc<IterationFn>),
}

impl IterationOrder {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&Partition) -> Vec<(usize, usize)> + Send + Sync + 'static,
    {
        IterationOrder::Custom(Arc::new(f))
    }

    pub fn cells(&self, partition: &Partition) -> Vec<(usize, usize)> {
        let core = partition.core();
        match self {
            IterationOrder::RowMajor => core.cells().collect(),
            IterationOrder::ColumnMajor => (core.col..core.col_end())
                .flat_map(|c| (core.row..core.row_end()).map(move |r| (r, c)))
                .collect(),
            IterationOrder::Custom(f) => f(partition),
        }
    }
}

impl fmt::Debug for IterationOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IterationOrder::RowMajor => write!(f, "RowMajor"),
            IterationOrder::ColumnMajor => write!(f, "ColumnMajor"),
            IterationOrder::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}
