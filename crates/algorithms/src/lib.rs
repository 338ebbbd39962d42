//! # gridwork algorithms
//!
//! Map-algebra operations built on the gridwork engine. Every function
//! here returns an [`OperationSpec`](gridwork_parallel::OperationSpec);
//! pass it to [`gridwork_parallel::run`] to compute the result.
//!
//! ## Available Operation Categories
//!
//! - **local**: sum, product, subtraction, division, sine
//! - **statistics**: focal statistics, zonal statistics
//! - **terrain**: aspect, hillshade, iterative cost distance
//! - **global**: nearest-point distance, scalar sum
//! - **algebra**: `plus`/`minus`/`times`/`divided_by` on layers

pub mod algebra;
pub mod global;
pub mod local;
pub mod statistics;
pub mod terrain;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::algebra::LayerAlgebra;
    pub use crate::global::{DistanceMetric, global_sum, min_distance, min_distance_index};
    pub use crate::local::{
        LocalOp, local_binary, local_division, local_mult, local_sin, local_subtraction, local_sum, local_sum_bulk,
    };
    pub use crate::statistics::{
        FocalParams, FocalStatistic, ZonalStatistic, focal_mean_bulk, focal_statistics, zonal_statistics,
    };
    pub use crate::terrain::{AspectOutput, CostDistanceParams, HillshadeParams, aspect, cost_distance, hillshade};
    pub use gridwork_core::prelude::*;
    pub use gridwork_parallel::{EngineConfig, ExecutionMode, OpClass, OperationSpec, RunOutput, run, run_with_report};
}
