///
/// # Host Runtime Configuration
///
/// The only tunable of the host runtime is how its built-in condition
/// variable polls during timed waits: it sleeps between attempts, doubling
/// the sleep from `initial_delay_us` up to `max_delay_ms`.
///
/// ## Example config file
///
/// ```toml
/// [poll]
/// initial_delay_us = 500
/// max_delay_ms = 50
/// ```
///
/// `RuntimeConfig::from_env()` reads the file named by
/// `PTHREADING_HOST_CONFIG`. A missing variable means defaults; an unreadable
/// or invalid file is logged and also means defaults.
///

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "PTHREADING_HOST_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    pub poll: PollConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PollConfig {
    pub initial_delay_us: u64,
    pub max_delay_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay_us: 500,
            max_delay_ms: 50,
        }
    }
}

impl PollConfig {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_micros(self.initial_delay_us)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl RuntimeConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: RuntimeConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_env() -> Self {
        let Some(path) = std::env::var_os(CONFIG_ENV_VAR) else {
            return Self::default();
        };

        let path = PathBuf::from(path);
        match Self::load(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "loaded host runtime config");
                config
            }
            Err(err) => {
                tracing::warn!(path = %path.display(), %err, "ignoring host runtime config");
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll.max_delay_ms == 0 {
            return Err(ConfigError::Invalid("poll.max_delay_ms must be positive".to_string()));
        }
        if self.poll.initial_delay() > self.poll.max_delay() {
            return Err(ConfigError::Invalid(format!(
                "poll.initial_delay_us ({}) exceeds poll.max_delay_ms ({})",
                self.poll.initial_delay_us, self.poll.max_delay_ms
            )));
        }
        Ok(())
    }
}
