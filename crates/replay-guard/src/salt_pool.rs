use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::error::GuardError;

/// Width of a handshake salt in bytes
pub const SALT_LEN: usize = 32;

/// How long a salt is remembered
pub const DEFAULT_SALT_TTL: Duration = Duration::from_secs(30);

pub type Salt = [u8; SALT_LEN];

/// Exact-match set of recently seen salts, for tracking replays within a time window
#[derive(Debug)]
pub struct SaltPool {
    /// Maps salt -> server time (unix seconds) it was first seen
    salts: Mutex<HashMap<Salt, u64>>,
    /// Entries older than this many seconds are dropped on the next add
    ttl_secs: u64,
}

impl SaltPool {
    /// Create a new salt pool with the default 30 second TTL
    pub fn new() -> Self {
        Self::from_secs(DEFAULT_SALT_TTL.as_secs())
    }

    /// Create a salt pool with a custom TTL.
    ///
    /// Ages are tracked in whole seconds, so a fractional TTL rounds up.
    /// A zero TTL would forget every salt immediately and is rejected.
    pub fn with_ttl(ttl: Duration) -> Result<Self, GuardError> {
        if ttl.is_zero() {
            return Err(GuardError::ZeroTtl);
        }

        let ttl_secs = ttl
            .as_secs()
            .saturating_add(u64::from(ttl.subsec_nanos() > 0));
        Ok(Self::from_secs(ttl_secs))
    }

    fn from_secs(ttl_secs: u64) -> Self {
        tracing::info!(ttl_secs = ttl_secs, "Salt pool initialized");

        Self {
            salts: Mutex::new(HashMap::new()),
            ttl_secs,
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Record a salt against the current server time.
    /// Returns false if it was already seen within the TTL.
    ///
    /// Server time is used rather than any timestamp carried by the handshake,
    /// so a client cannot influence when its salt expires.
    pub fn add(&self, salt: &Salt) -> bool {
        self.add_at(salt, unix_now())
    }

    /// Same as [`SaltPool::add`] with an explicit server-clock reading in unix seconds
    pub fn add_at(&self, salt: &Salt, now: u64) -> bool {
        let mut salts = self.lock();

        self.cleanup(&mut salts, now);

        if salts.contains_key(salt) {
            return false;
        }

        salts.insert(*salt, now);
        true
    }

    /// Current pool size (for monitoring)
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove salts older than TTL
    fn cleanup(&self, salts: &mut HashMap<Salt, u64>, now: u64) {
        let before_count = salts.len();
        let ttl = self.ttl_secs;

        // A clock stepping backwards makes entries look fresh, not expired
        salts.retain(|_, &mut first_seen| now.saturating_sub(first_seen) <= ttl);

        let removed = before_count - salts.len();
        if removed > 0 {
            tracing::debug!(
                removed = removed,
                remaining = salts.len(),
                "Cleaned up expired salts from pool"
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Salt, u64>> {
        self.salts.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SaltPool {
    fn default() -> Self {
        Self::new()
    }
}

fn unix_now() -> u64 {
    // Before the epoch only happens on a badly broken clock; treat it as time zero
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    const T0: u64 = 1_700_000_000;

    fn salt(tag: u8) -> Salt {
        let mut salt = [0u8; SALT_LEN];
        salt[0] = tag;
        salt[SALT_LEN - 1] = tag;
        salt
    }

    #[test]
    fn test_replay_detection() {
        let pool = SaltPool::new();
        let s = salt(1);

        // First time - not a replay
        assert!(pool.add(&s));

        // Second time - is a replay
        assert!(!pool.add(&s));

        assert!(pool.add(&salt(2)));
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_expiry() {
        let pool = SaltPool::new();
        let s = salt(1);

        assert!(pool.add_at(&s, T0));
        assert!(!pool.add_at(&s, T0 + 10));
        // Exactly at the TTL the entry is still kept
        assert!(!pool.add_at(&s, T0 + 30));
        // A rejected replay does not refresh the timestamp
        assert!(pool.add_at(&s, T0 + 31));
    }

    #[test]
    fn test_cleanup() {
        let pool = SaltPool::new();

        for tag in 0..10 {
            assert!(pool.add_at(&salt(tag), T0 + tag as u64));
        }
        assert_eq!(pool.len(), 10);

        // Everything added at or before T0 + 4 is more than 30s old by T0 + 35
        assert!(pool.add_at(&salt(100), T0 + 35));
        assert_eq!(pool.len(), 6);

        // Old salts are new again, recent ones still replays
        assert!(pool.add_at(&salt(0), T0 + 35));
        assert!(!pool.add_at(&salt(9), T0 + 35));
    }

    #[test]
    fn test_sweep_over_long_run() {
        let pool = SaltPool::new();

        // One salt per second for two minutes
        for t in 0..120u64 {
            assert!(pool.add_at(&salt(t as u8), T0 + t));
            assert!(pool.len() <= 31, "stale salts retained at t={t}");
        }

        assert!(pool.add_at(&salt(0), T0 + 120));
        assert!(!pool.add_at(&salt(119), T0 + 120));
    }

    #[test]
    fn test_clock_going_backwards() {
        let pool = SaltPool::new();
        let s = salt(7);

        assert!(pool.add_at(&s, T0));
        assert!(!pool.add_at(&s, T0 - 100));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_custom_ttl() {
        let pool = SaltPool::with_ttl(Duration::from_secs(5)).unwrap();
        assert_eq!(pool.ttl(), Duration::from_secs(5));

        let s = salt(3);
        assert!(pool.add_at(&s, T0));
        assert!(!pool.add_at(&s, T0 + 5));
        assert!(pool.add_at(&s, T0 + 6));
    }

    #[test]
    fn test_fractional_ttl_rounds_up() {
        let pool = SaltPool::with_ttl(Duration::from_millis(1500)).unwrap();
        assert_eq!(pool.ttl(), Duration::from_secs(2));

        let s = salt(4);
        assert!(pool.add_at(&s, T0));
        assert!(!pool.add_at(&s, T0 + 2));
        assert!(pool.add_at(&s, T0 + 3));

        // Under a second still remembers a salt for the next second
        let short = SaltPool::with_ttl(Duration::from_millis(500)).unwrap();
        assert_eq!(short.ttl(), Duration::from_secs(1));
        assert!(short.add_at(&s, T0));
        assert!(!short.add_at(&s, T0 + 1));
    }

    #[test]
    fn test_zero_ttl_rejected() {
        assert!(matches!(
            SaltPool::with_ttl(Duration::ZERO),
            Err(GuardError::ZeroTtl)
        ));
    }

    #[test]
    fn test_concurrent_adds_admit_each_salt_once() {
        let pool = SaltPool::new();
        let admitted = AtomicUsize::new(0);

        thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for tag in 0..=255u8 {
                        if pool.add_at(&salt(tag), T0) {
                            admitted.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                });
            }
        });

        assert_eq!(admitted.load(Ordering::Relaxed), 256);
        assert_eq!(pool.len(), 256);
    }
}
