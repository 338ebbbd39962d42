//! # gridwork parallel
//!
//! Decomposition and scheduling for the gridwork map-algebra engine.
//!
//! An [`OperationSpec`] names its layers, locality class and kernel. A run
//! decomposes every layer into aligned tiles, groups the tiles into
//! [`TaskGroup`]s and dispatches them serially or through a worker pool.
//! Iterative kernels are re-queued until their tiles stop changing.

pub mod config;
pub mod decompose;
pub mod executor;
pub mod iteration;
pub mod operation;
pub mod scheduler;
pub mod strategy;
pub mod task;

pub use config::EngineConfig;
pub use decompose::{Buffer, Decomposition, Strip, StripIterator, decompose_columns, decompose_rows};
pub use executor::{TaskStatus, advance_convergence, should_requeue};
pub use iteration::IterationOrder;
pub use operation::{CellContext, IterativeKernel, Kernel, OpClass, OperationBuilder, OperationSpec, Round, Target};
pub use scheduler::{RunOutput, RunReport, run, run_with_report};
pub use strategy::{ExecutionMode, num_cpus};
pub use task::{TaskGroup, build_task_groups, output_title};
