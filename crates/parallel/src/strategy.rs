//! Execution strategies

use gridwork_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How task groups are dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Task groups run one after another on the calling thread
    Serial,
    /// Task groups are drained from a shared queue by worker threads
    #[default]
    WorkerPool,
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "serial" | "sequential" => Ok(ExecutionMode::Serial),
            "pool" | "worker_pool" | "worker-pool" | "parallel" => Ok(ExecutionMode::WorkerPool),
            other => Err(Error::InvalidParameter {
                name: "mode",
                value: other.to_string(),
                reason: "expected 'serial' or 'pool'".to_string(),
            }),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Serial => write!(f, "serial"),
            ExecutionMode::WorkerPool => write!(f, "pool"),
        }
    }
}

/// Get the number of available CPU cores
pub fn num_cpus() -> usize {
    rayon::current_num_threads()
}

/// Dedicated pool of `workers` threads for one scheduling run
pub(crate) fn build_pool(workers: usize) -> Result<rayon::ThreadPool> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .thread_name(|i| format!("gridwork-worker-{}", i))
        .build()
        .map_err(|e| Error::Other(format!("Failed to build thread pool: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("serial".parse::<ExecutionMode>().unwrap(), ExecutionMode::Serial);
        assert_eq!("Pool".parse::<ExecutionMode>().unwrap(), ExecutionMode::WorkerPool);
        assert!("mpi".parse::<ExecutionMode>().is_err());
        assert_eq!(ExecutionMode::WorkerPool.to_string(), "pool");
    }
}
