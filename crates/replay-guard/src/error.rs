use thiserror::Error;

use crate::config::ConfigError;

#[derive(Error, Debug)]
pub enum GuardError {
    /// Larger caches push the fingerprint false-positive rate past 2 * capacity / 2^32
    #[error("Replay cache capacity {requested} exceeds maximum of {max}")]
    CapacityExceeded { requested: usize, max: usize },

    #[error("Salt pool TTL must be greater than zero")]
    ZeroTtl,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
