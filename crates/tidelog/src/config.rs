//! TOML configuration for logs and the entry fetcher.
//!
//! Every field has a default, so an empty document is a valid config:
//!
//! ```toml
//! [fetch]
//! concurrency = 32
//! timeout_ms = 5000
//!
//! [append]
//! reference_count = 16
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::LogError;

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Graph-fetch tuning.
    pub fetch: FetchConfig,
    /// Append tuning.
    pub append: AppendConfig,
}

/// `[fetch]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Maximum number of blockstore reads in flight at once.
    pub concurrency: usize,
    /// Per-read timeout. A read that exceeds it is treated as absent.
    pub timeout_ms: Option<u64>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 32,
            timeout_ms: None,
        }
    }
}

impl FetchConfig {
    /// The per-read timeout, if any.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// `[append]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppendConfig {
    /// Default pointer budget `k` used when choosing reference links.
    pub reference_count: usize,
}

impl Default for AppendConfig {
    fn default() -> Self {
        Self { reference_count: 1 }
    }
}

impl LogConfig {
    /// Load config from a TOML file, or return defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, LogError> {
        match path {
            Some(p) => {
                let content = std::fs::read_to_string(p)
                    .map_err(|e| LogError::Config(format!("{}: {e}", p.display())))?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Parse config from a TOML string.
    pub fn from_toml(s: &str) -> Result<Self, LogError> {
        let config: LogConfig = toml::from_str(s).map_err(|e| LogError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), LogError> {
        if self.fetch.concurrency == 0 {
            return Err(LogError::Config("fetch.concurrency must be at least 1".into()));
        }

        Ok(())
    }
}
