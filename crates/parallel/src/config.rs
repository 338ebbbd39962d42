//! Engine configuration
//!
//! Values are resolved from, lowest to highest precedence: [`Default`], a
//! JSON file, `GRIDWORK_*` environment variables and finally whatever the
//! caller sets on the struct (the CLI applies its flags last).

use crate::strategy::{ExecutionMode, num_cpus};
use gridwork_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_WORKERS: &str = "GRIDWORK_WORKERS";
pub const ENV_MODE: &str = "GRIDWORK_MODE";
pub const ENV_GRANULARITY: &str = "GRIDWORK_GRANULARITY";
pub const ENV_PRECISION: &str = "GRIDWORK_PRECISION";
pub const ENV_IDLE_ROUNDS: &str = "GRIDWORK_IDLE_ROUNDS";

/// Settings threaded through every scheduling run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Worker threads in pool mode
    pub workers: usize,
    pub mode: ExecutionMode,
    /// Rows (or columns) per tile
    pub granularity: usize,
    /// Decimals written to text grids
    pub value_precision: usize,
    /// Consecutive idle rounds after which an iterative task is converged
    pub idle_rounds: u32,
    /// How long an idle worker waits on the queue before re-checking
    pub poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: num_cpus(),
            mode: ExecutionMode::WorkerPool,
            granularity: 32,
            value_precision: 6,
            idle_rounds: 10,
            poll_interval_ms: 50,
        }
    }
}

impl EngineConfig {
    /// Single-threaded configuration
    pub fn serial() -> Self {
        Self {
            mode: ExecutionMode::Serial,
            workers: 1,
            ..Self::default()
        }
    }

    /// Pool configuration with `workers` threads
    pub fn pool(workers: usize) -> Self {
        Self {
            mode: ExecutionMode::WorkerPool,
            workers,
            ..Self::default()
        }
    }

    pub fn with_granularity(mut self, granularity: usize) -> Self {
        self.granularity = granularity;
        self
    }

    pub fn with_idle_rounds(mut self, idle_rounds: u32) -> Self {
        self.idle_rounds = idle_rounds;
        self
    }

    /// Load from a JSON file; missing fields keep their defaults
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override fields from `GRIDWORK_*` environment variables
    pub fn with_env(self) -> Result<Self> {
        self.with_vars(|key| std::env::var(key).ok())
    }

    /// Override fields from any variable source
    pub fn with_vars(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(v) = lookup(ENV_WORKERS) {
            self.workers = parse_var("workers", &v)?;
        }
        if let Some(v) = lookup(ENV_MODE) {
            self.mode = v.parse()?;
        }
        if let Some(v) = lookup(ENV_GRANULARITY) {
            self.granularity = parse_var("granularity", &v)?;
        }
        if let Some(v) = lookup(ENV_PRECISION) {
            self.value_precision = parse_var("value_precision", &v)?;
        }
        if let Some(v) = lookup(ENV_IDLE_ROUNDS) {
            self.idle_rounds = parse_var("idle_rounds", &v)?;
        }
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.mode == ExecutionMode::WorkerPool && self.workers == 0 {
            return Err(Error::InvalidParameter {
                name: "workers",
                value: self.workers.to_string(),
                reason: "pool mode needs at least one worker".to_string(),
            });
        }
        if self.granularity == 0 {
            return Err(Error::InvalidParameter {
                name: "granularity",
                value: self.granularity.to_string(),
                reason: "tiles must span at least one row or column".to_string(),
            });
        }
        if self.idle_rounds == 0 {
            return Err(Error::InvalidParameter {
                name: "idle_rounds",
                value: self.idle_rounds.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(Error::InvalidParameter {
                name: "poll_interval_ms",
                value: self.poll_interval_ms.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn parse_var<T: std::str::FromStr>(name: &'static str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| Error::InvalidParameter {
        name,
        value: value.to_string(),
        reason: "not a valid number".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.granularity, 32);
        assert_eq!(config.idle_rounds, 10);
        assert_eq!(config.value_precision, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"mode": "serial", "granularity": 4}"#).unwrap();
        assert_eq!(config.mode, ExecutionMode::Serial);
        assert_eq!(config.granularity, 4);
        assert_eq!(config.poll_interval_ms, 50);
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.json");
        let config = EngineConfig::pool(3).with_granularity(8);
        config.save(&path).unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_vars_override() {
        let vars: HashMap<&str, &str> =
            [(ENV_MODE, "serial"), (ENV_GRANULARITY, "5"), (ENV_IDLE_ROUNDS, "3")].into_iter().collect();
        let config = EngineConfig::default()
            .with_vars(|k| vars.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.mode, ExecutionMode::Serial);
        assert_eq!(config.granularity, 5);
        assert_eq!(config.idle_rounds, 3);

        let bad = EngineConfig::default().with_vars(|k| (k == ENV_WORKERS).then(|| "many".to_string()));
        assert!(matches!(bad, Err(Error::InvalidParameter { name: "workers", .. })));
    }

    #[test]
    fn test_validate_rejects_zero() {
        assert!(EngineConfig::default().with_granularity(0).validate().is_err());
        assert!(EngineConfig::default().with_idle_rounds(0).validate().is_err());
        assert!(EngineConfig::pool(0).validate().is_err());
        let serial = EngineConfig { workers: 0, ..EngineConfig::serial() };
        assert!(serial.validate().is_ok());
    }
}
