use std::fmt;

use crate::config::{Config, ConfigError};
use crate::error::GuardError;
use crate::replay_cache::ReplayCache;
use crate::salt_pool::{Salt, SaltPool};

/// Which detector flagged a handshake as a replay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detector {
    ReplayCache,
    SaltPool,
}

impl fmt::Display for Detector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Detector::ReplayCache => f.write_str("replay_cache"),
            Detector::SaltPool => f.write_str("salt_pool"),
        }
    }
}

/// Outcome of checking an authenticated handshake
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Replayed(Detector),
}

impl Admission {
    pub fn is_admitted(&self) -> bool {
        matches!(self, Admission::Admitted)
    }
}

/// Anti-replay state shared across handshake-processing tasks.
///
/// Wrap in an `Arc` to share it; every check locks internally.
#[derive(Debug, Default)]
pub struct HandshakeGuard {
    /// Count-bounded memory of recent (key ID, salt) fingerprints
    replay_cache: ReplayCache,

    /// Exact salts seen within the TTL; `None` admits everything
    salt_pool: Option<SaltPool>,
}

impl HandshakeGuard {
    pub fn new(replay_cache: ReplayCache, salt_pool: Option<SaltPool>) -> Self {
        Self {
            replay_cache,
            salt_pool,
        }
    }

    /// Load configuration from the environment and build both detectors.
    ///
    /// Any error here should stop startup.
    pub fn load() -> Result<Self, GuardError> {
        Self::load_from(Config::load)
    }

    fn load_from<F>(load: F) -> Result<Self, GuardError>
    where
        F: FnOnce() -> Result<Config, ConfigError>,
    {
        let config = load()?;
        Self::from_config(&config)
    }

    /// Build both detectors from configuration
    pub fn from_config(config: &Config) -> Result<Self, GuardError> {
        let replay_cache = ReplayCache::new(config.replay_cache_capacity)?;
        let salt_pool = config
            .salt_pool_enabled
            .then(|| SaltPool::with_ttl(config.salt_pool_ttl))
            .transpose()?;

        tracing::info!(
            replay_cache_capacity = replay_cache.capacity(),
            salt_pool_enabled = salt_pool.is_some(),
            "Handshake guard initialized"
        );

        Ok(Self::new(replay_cache, salt_pool))
    }

    pub fn replay_cache(&self) -> &ReplayCache {
        &self.replay_cache
    }

    pub fn salt_pool(&self) -> Option<&SaltPool> {
        self.salt_pool.as_ref()
    }

    /// Check a handshake whose authentication tag has already been verified.
    ///
    /// The salt pool is only consulted once the replay cache has admitted the
    /// handshake, so a replay is recorded by at most one detector.
    pub fn admit(&self, id: &str, salt: &Salt) -> Admission {
        let admission = if !self.replay_cache.add(id, salt) {
            Admission::Replayed(Detector::ReplayCache)
        } else if !self.salt_pool.as_ref().map_or(true, |pool| pool.add(salt)) {
            Admission::Replayed(Detector::SaltPool)
        } else {
            Admission::Admitted
        };

        if let Admission::Replayed(detector) = admission {
            tracing::warn!(
                key_id = %id,
                detector = %detector,
                salt_prefix = %hex::encode(&salt[..8]),
                "Replay attack detected"
            );
        }

        admission
    }
}
