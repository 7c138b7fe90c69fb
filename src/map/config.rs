use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How transactions of one request are aggregated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    /// Fan out over the rayon pool, merging per-worker partial statistics
    Parallel,
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sequential" => Ok(ExecutionMode::Sequential),
            "parallel" => Ok(ExecutionMode::Parallel),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionMode::Sequential => write!(f, "sequential"),
            ExecutionMode::Parallel => write!(f, "parallel"),
        }
    }
}

/// Map construction settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    pub execution_mode: ExecutionMode,
    /// Below this many transactions a parallel request runs sequentially
    pub parallel_threshold: usize,
    /// Default row limit for trace id scans
    pub scan_limit: usize,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            execution_mode: ExecutionMode::Sequential,
            parallel_threshold: 256,
            scan_limit: 10_000,
        }
    }
}

impl MapConfig {
    /// Read settings from the environment, falling back to defaults
    /// SERVERMAP_EXECUTION_MODE=sequential|parallel
    /// SERVERMAP_PARALLEL_THRESHOLD=256
    /// SERVERMAP_SCAN_LIMIT=10000
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let execution_mode = match std::env::var("SERVERMAP_EXECUTION_MODE") {
            Ok(value) => value.parse().unwrap_or_else(|e| {
                tracing::warn!("Ignoring SERVERMAP_EXECUTION_MODE: {}", e);
                defaults.execution_mode
            }),
            Err(_) => defaults.execution_mode,
        };
        let parallel_threshold = std::env::var("SERVERMAP_PARALLEL_THRESHOLD")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(defaults.parallel_threshold);
        let scan_limit = std::env::var("SERVERMAP_SCAN_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|limit| *limit > 0)
            .unwrap_or(defaults.scan_limit);

        Self {
            execution_mode,
            parallel_threshold,
            scan_limit,
        }
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    pub fn with_scan_limit(mut self, limit: usize) -> Self {
        self.scan_limit = limit;
        self
    }

    /// Mode actually used for a request of this many transactions
    pub fn mode_for(&self, transaction_count: usize) -> ExecutionMode {
        match self.execution_mode {
            ExecutionMode::Parallel if transaction_count >= self.parallel_threshold => {
                ExecutionMode::Parallel
            }
            _ => ExecutionMode::Sequential,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_execution_mode() {
        assert_eq!("Parallel".parse::<ExecutionMode>(), Ok(ExecutionMode::Parallel));
        assert_eq!(" sequential ".parse::<ExecutionMode>(), Ok(ExecutionMode::Sequential));
        assert!("fast".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn test_parallel_threshold() {
        let config = MapConfig::default()
            .with_execution_mode(ExecutionMode::Parallel)
            .with_parallel_threshold(10);
        assert_eq!(config.mode_for(9), ExecutionMode::Sequential);
        assert_eq!(config.mode_for(10), ExecutionMode::Parallel);

        let sequential = MapConfig::default().with_parallel_threshold(0);
        assert_eq!(sequential.mode_for(1_000), ExecutionMode::Sequential);
    }
}
