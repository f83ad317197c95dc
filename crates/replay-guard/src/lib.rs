//! Anti-replay detection for authenticated connection handshakes.
//!
//! Two independent detectors, both safe to share across threads:
//! - [`ReplayCache`]: remembers a bounded number of recent (key ID, salt)
//!   fingerprints in two generations.
//! - [`SaltPool`]: remembers exact salts for a fixed time window.
//!
//! [`HandshakeGuard`] combines them for an embedding service.

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod replay_cache;
pub mod salt_pool;

pub use config::{Config, ConfigError};
pub use error::GuardError;
pub use fingerprint::fingerprint;
pub use guard::{Admission, Detector, HandshakeGuard};
pub use replay_cache::{ReplayCache, MAX_CAPACITY};
pub use salt_pool::{Salt, SaltPool, DEFAULT_SALT_TTL, SALT_LEN};
