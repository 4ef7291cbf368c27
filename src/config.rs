//! Configuration
//!
//! The two knobs that shape candidate generation: where the CK library lives
//! and how many instances to keep per operation signature.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{Result, TemplarError};

/// Environment variable naming the CK library root
pub const ENV_CK_LIBRARY_PATH: &str = "TEMPLAR_CK_LIBRARY_PATH";

/// Environment variable bounding candidates per signature (`0` = unbounded)
pub const ENV_MAX_PROFILING_CONFIGS: &str = "TEMPLAR_MAX_PROFILING_CONFIGS";

/// Candidate generation settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplarConfig {
    /// Root of the composable-kernel installation
    pub ck_library_path: Option<PathBuf>,
    /// Sampling cap; `None` keeps every compatible instance
    pub max_profiling_configs: Option<usize>,
}

impl TemplarConfig {
    /// Read settings from `TEMPLAR_*` environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (environment, test map, ...)
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let ck_library_path = lookup(ENV_CK_LIBRARY_PATH)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        let max_profiling_configs = match lookup(ENV_MAX_PROFILING_CONFIGS) {
            None => None,
            Some(raw) if raw.trim().is_empty() => None,
            Some(raw) => {
                let cap: usize = raw.trim().parse().map_err(|_| {
                    TemplarError::InvalidConfig(format!("{ENV_MAX_PROFILING_CONFIGS}={raw}"))
                })?;
                (cap > 0).then_some(cap)
            }
        };

        Ok(Self {
            ck_library_path,
            max_profiling_configs,
        })
    }

    /// Set the CK library root
    #[must_use]
    pub fn with_ck_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ck_library_path = Some(path.into());
        self
    }

    /// Set the sampling cap
    #[must_use]
    pub fn with_max_profiling_configs(mut self, cap: Option<usize>) -> Self {
        self.max_profiling_configs = cap;
        self
    }
}
