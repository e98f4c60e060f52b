//! rollover.toml configuration parser.
//!
//! Every field has a default, so a missing file or an empty section is
//! valid. Environment overrides are applied on top of the file.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the task queue destination.
pub const QUEUE_URL_ENV: &str = "QUEUE_URL";

/// Environment variable that switches the default log level to debug when `1`.
pub const DEBUG_ENV: &str = "DEBUG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to render config: {0}")]
    Render(#[from] toml::ser::Error),
    #[error("invalid duration for {field}: {value:?}")]
    Duration { field: &'static str, value: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RolloverConfig {
    pub state: StateConfig,
    pub fanout: FanoutConfig,
    pub refresh: RefreshConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub data_dir: PathBuf,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/rollover"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Destination of refresh tasks.
    pub queue: String,
    /// Message group shared by every task of a plan. Keeps delivery FIFO.
    pub group_key: String,
    /// KV key holding the packer manifest.
    pub manifest_key: String,
    /// KV prefix under which `{account}/{target}` documents live.
    pub targets_prefix: String,
    /// Account scope for target lookup.
    pub account: String,
    /// Region qualifier stripped from manifest artifact ids.
    pub region_prefix: String,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            queue: "rollover-tasks.fifo".to_string(),
            group_key: "8FA07FBE-2772-4BFA-ABE7-70E0F2398ABF".to_string(),
            manifest_key: "packer_manifest".to_string(),
            targets_prefix: "rollover/groups".to_string(),
            account: "default".to_string(),
            region_prefix: "us-east-1:".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Wait after a `Pending` status.
    pub pending_interval: String,
    /// Wait after an `InProgress` status.
    pub progress_interval: String,
    /// Subtracted from the invocation budget to leave room for a clean return.
    pub safety_margin: String,
    /// Invocation budget when the environment does not supply one.
    pub invocation_timeout: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            pending_interval: "15s".to_string(),
            progress_interval: "60s".to_string(),
            safety_margin: "100ms".to_string(),
            invocation_timeout: "15m".to_string(),
        }
    }
}

impl RefreshConfig {
    pub fn pending_interval(&self) -> Result<Duration, ConfigError> {
        field_duration("refresh.pending_interval", &self.pending_interval)
    }

    pub fn progress_interval(&self) -> Result<Duration, ConfigError> {
        field_duration("refresh.progress_interval", &self.progress_interval)
    }

    pub fn safety_margin(&self) -> Result<Duration, ConfigError> {
        field_duration("refresh.safety_margin", &self.safety_margin)
    }

    pub fn invocation_timeout(&self) -> Result<Duration, ConfigError> {
        field_duration("refresh.invocation_timeout", &self.invocation_timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl RolloverConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load from `path` if it exists, otherwise start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) if p.exists() => Self::from_file(p),
            _ => Ok(Self::default()),
        }
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(queue) = lookup(QUEUE_URL_ENV).filter(|q| !q.is_empty()) {
            self.fanout.queue = queue;
        }
        if lookup(DEBUG_ENV).as_deref() == Some("1") {
            self.log.level = "debug".to_string();
        }
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

fn field_duration(field: &'static str, value: &str) -> Result<Duration, ConfigError> {
    parse_duration(value).ok_or_else(|| ConfigError::Duration {
        field,
        value: value.to_string(),
    })
}

/// Parse `"500ms"`, `"15s"`, `"2m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        scaled_secs(mins, 60)
    } else if let Some(hours) = s.strip_suffix('h') {
        scaled_secs(hours, 3600)
    } else {
        None
    }
}

/// `None` when the value does not parse or overflows.
fn scaled_secs(value: &str, unit: u64) -> Option<Duration> {
    value
        .parse::<u64>()
        .ok()
        .and_then(|v| v.checked_mul(unit))
        .map(Duration::from_secs)
}
