use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::replay_cache::MAX_CAPACITY;
use crate::salt_pool::DEFAULT_SALT_TTL;

const DEFAULT_CONFIG_PATH: &str = "replay-guard.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for environment variable {name}: {value}")]
    InvalidEnvVar { name: String, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Settings loaded from replay-guard.toml
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    replay_cache_capacity: Option<usize>,
    salt_pool_enabled: Option<bool>,
    salt_pool_ttl_secs: Option<u64>,
}

/// Anti-replay configuration for the handshake guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Minimum number of recent handshakes the replay cache remembers (0 disables it)
    pub replay_cache_capacity: usize,

    /// Whether the time-windowed salt pool is consulted
    pub salt_pool_enabled: bool,

    /// How long the salt pool remembers a salt
    pub salt_pool_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            replay_cache_capacity: MAX_CAPACITY,
            salt_pool_enabled: true,
            salt_pool_ttl: DEFAULT_SALT_TTL,
        }
    }
}

impl Config {
    /// Load configuration from .env, replay-guard.toml and environment overrides
    pub fn load() -> Result<Self, ConfigError> {
        // Load .env file
        dotenvy::dotenv().ok();

        Self::load_with(|name| env::var(name).ok(), Path::new(DEFAULT_CONFIG_PATH))
    }

    /// Pick the config file, then apply overrides, reading variables through `lookup`
    pub(crate) fn load_with<F>(lookup: F, default_path: &Path) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // An explicitly named file must exist; the default one is optional
        let config = match lookup("REPLAY_GUARD_CONFIG") {
            Some(path) => Self::from_file(path)?,
            None if default_path.exists() => Self::from_file(default_path)?,
            None => Self::default(),
        };

        let config = config.with_overrides(lookup)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let toml_config: TomlConfig = toml::from_str(contents)?;
        let defaults = Self::default();

        let config = Config {
            replay_cache_capacity: toml_config
                .replay_cache_capacity
                .unwrap_or(defaults.replay_cache_capacity),
            salt_pool_enabled: toml_config
                .salt_pool_enabled
                .unwrap_or(defaults.salt_pool_enabled),
            salt_pool_ttl: toml_config
                .salt_pool_ttl_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.salt_pool_ttl),
        };

        config.validate()?;
        Ok(config)
    }

    /// Apply REPLAY_CACHE_CAPACITY, SALT_POOL_ENABLED and SALT_POOL_TTL_SECS
    /// as returned by `lookup`
    fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(capacity) = parse_var::<usize, _>(&lookup, "REPLAY_CACHE_CAPACITY")? {
            self.replay_cache_capacity = capacity;
        }
        if let Some(enabled) = parse_var::<bool, _>(&lookup, "SALT_POOL_ENABLED")? {
            self.salt_pool_enabled = enabled;
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "SALT_POOL_TTL_SECS")? {
            self.salt_pool_ttl = Duration::from_secs(secs);
        }
        Ok(self)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        // Never clamp: a silently smaller cache hides the operator's mistake
        if self.replay_cache_capacity > MAX_CAPACITY {
            return Err(ConfigError::Invalid(format!(
                "replay_cache_capacity {} exceeds maximum of {}",
                self.replay_cache_capacity, MAX_CAPACITY
            )));
        }

        if self.salt_pool_ttl.is_zero() {
            return Err(ConfigError::Invalid(
                "salt_pool_ttl_secs must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, name: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidEnvVar {
                name: name.to_string(),
                value,
            }),
        None => Ok(None),
    }
}
