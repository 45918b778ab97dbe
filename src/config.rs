//! Process-level client configuration.
//! Defaults, then `TRADUCTOR_*` environment variables, then command-line
//! overrides. User-facing settings (backend URL, glossary, ...) live in the
//! settings store, not here.

use std::path::PathBuf;
use std::time::Duration;

use directories::ProjectDirs;

use crate::translate::EmptyInputPolicy;

pub const DEFAULT_TRANSLATE_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// File holding the local key/value store inside the data directory.
pub const STORAGE_FILE: &str = "local_storage.sqlite3";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: expected a positive number of seconds, got {value:?}")]
    InvalidSeconds { var: &'static str, value: String },
    #[error("{var}: {reason}")]
    InvalidValue { var: &'static str, reason: String },
    #[error("no data directory available; pass --data-dir")]
    NoDataDir,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub data_dir: Option<PathBuf>,
    /// Keep settings in memory only.
    pub ephemeral: bool,
    pub translate_timeout: Duration,
    pub probe_timeout: Duration,
    pub poll_interval: Duration,
    pub empty_input: EmptyInputPolicy,
    pub log_json: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            ephemeral: false,
            translate_timeout: DEFAULT_TRANSLATE_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
            empty_input: EmptyInputPolicy::default(),
            log_json: false,
        }
    }
}

/// Overrides taken from the command line. `None` keeps the env/default value.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub data_dir: Option<PathBuf>,
    pub ephemeral: bool,
    pub empty_input: Option<EmptyInputPolicy>,
    pub log_json: bool,
}

fn parse_seconds(var: &'static str, value: &str) -> Result<Duration, ConfigError> {
    match value.trim().parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::InvalidSeconds {
            var,
            value: value.to_string(),
        }),
    }
}

impl ClientConfig {
    /// Read `TRADUCTOR_*` variables from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(dir) = lookup("TRADUCTOR_DATA_DIR").filter(|d| !d.trim().is_empty()) {
            config.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(v) = lookup("TRADUCTOR_TRANSLATE_TIMEOUT_SECS") {
            config.translate_timeout = parse_seconds("TRADUCTOR_TRANSLATE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TRADUCTOR_PROBE_TIMEOUT_SECS") {
            config.probe_timeout = parse_seconds("TRADUCTOR_PROBE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("TRADUCTOR_POLL_INTERVAL_SECS") {
            config.poll_interval = parse_seconds("TRADUCTOR_POLL_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("TRADUCTOR_EMPTY_INPUT") {
            config.empty_input = v.parse().map_err(|reason| ConfigError::InvalidValue {
                var: "TRADUCTOR_EMPTY_INPUT",
                reason,
            })?;
        }
        if let Some(v) = lookup("TRADUCTOR_LOG_FORMAT") {
            config.log_json = match v.trim().to_ascii_lowercase().as_str() {
                "json" => true,
                "text" | "pretty" | "" => false,
                other => {
                    return Err(ConfigError::InvalidValue {
                        var: "TRADUCTOR_LOG_FORMAT",
                        reason: format!("unknown log format: {other}"),
                    })
                }
            };
        }
        Ok(config)
    }

    pub fn with_overrides(mut self, overrides: ConfigOverrides) -> Self {
        if let Some(dir) = overrides.data_dir {
            self.data_dir = Some(dir);
        }
        if let Some(policy) = overrides.empty_input {
            self.empty_input = policy;
        }
        self.ephemeral |= overrides.ephemeral;
        self.log_json |= overrides.log_json;
        self
    }

    /// Explicit data dir, or the platform data directory for this app.
    pub fn resolve_data_dir(&self) -> Result<PathBuf, ConfigError> {
        if let Some(dir) = &self.data_dir {
            return Ok(dir.clone());
        }
        ProjectDirs::from("dev", "traductor", "traductor")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoDataDir)
    }

    pub fn storage_path(&self) -> Result<PathBuf, ConfigError> {
        Ok(self.resolve_data_dir()?.join(STORAGE_FILE))
    }
}
