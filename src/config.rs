//! Profiler configuration
//!
//! Settings come from a TOML file or from the environment:
//!
//! ```toml
//! output = "profile.log"
//! format = "text"        # or "json"
//! unresolved = "prune"   # or "placeholder"
//! ```
//!
//! Environment variables (read by the instrumentation hooks):
//! - `CALLTREE_CONFIG`: path to a TOML file loaded first
//! - `CALLTREE_OUTPUT`, `CALLTREE_FORMAT`, `CALLTREE_UNRESOLVED`: override
//!   the matching field

use crate::error::{ProfilerError, Result};
use crate::render::UnresolvedPolicy;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default report file, relative to the working directory at shutdown
pub const DEFAULT_OUTPUT: &str = "profile.log";

pub const ENV_CONFIG: &str = "CALLTREE_CONFIG";
pub const ENV_OUTPUT: &str = "CALLTREE_OUTPUT";
pub const ENV_FORMAT: &str = "CALLTREE_FORMAT";
pub const ENV_UNRESOLVED: &str = "CALLTREE_UNRESOLVED";

/// Report output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    /// Indented human-readable text (default)
    #[default]
    Text,
    /// Nested JSON document
    Json,
}

/// Where and how the final report is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProfilerConfig {
    /// Report file
    pub output: PathBuf,
    /// Report format
    pub format: ReportFormat,
    /// Handling of nodes without a symbol name
    pub unresolved: UnresolvedPolicy,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from(DEFAULT_OUTPUT),
            format: ReportFormat::default(),
            unresolved: UnresolvedPolicy::default(),
        }
    }
}

impl ProfilerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Configuration from an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup(ENV_CONFIG) {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(output) = lookup(ENV_OUTPUT) {
            config.output = PathBuf::from(output);
        }
        if let Some(format) = lookup(ENV_FORMAT) {
            config.format = parse_setting(ENV_FORMAT, &format)?;
        }
        if let Some(unresolved) = lookup(ENV_UNRESOLVED) {
            config.unresolved = parse_setting(ENV_UNRESOLVED, &unresolved)?;
        }

        Ok(config)
    }
}

fn parse_setting<T: ValueEnum>(key: &str, value: &str) -> Result<T> {
    T::from_str(value.trim(), true).map_err(|_| ProfilerError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    })
}
