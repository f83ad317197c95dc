use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::GuardError;
use crate::fingerprint::fingerprint;

/// Largest allowed capacity of a `ReplayCache`.
///
/// The false positive rate is up to 2 * capacity / 2^32, about 1 in 100,000 at
/// this size. Going higher would need wider fingerprints.
pub const MAX_CAPACITY: usize = 20_000;

/// Two generations of fingerprints
#[derive(Debug)]
struct Generations {
    capacity: usize,
    active: HashSet<u32>,
    /// Frozen copy of the previous `active` set
    archive: HashSet<u32>,
}

impl Generations {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            active: HashSet::with_capacity(capacity),
            archive: HashSet::new(),
        }
    }

    fn insert(&mut self, hash: u32) -> bool {
        if self.active.contains(&hash) {
            // Already in the current generation
            return false;
        }

        let in_archive = self.archive.contains(&hash);

        if self.active.len() == self.capacity {
            // Drop the archive, the full active generation takes its place
            let fresh = HashSet::with_capacity(self.capacity);
            self.archive = std::mem::replace(&mut self.active, fresh);

            tracing::debug!(
                archived = self.archive.len(),
                "Replay cache generation rotated"
            );
        }

        self.active.insert(hash);
        !in_archive
    }
}

/// Remembers at least the most recent `capacity` handshakes, and at most
/// `2 * capacity - 1`, keyed by a 32-bit fingerprint of key ID and salt.
///
/// Memory is bounded to two generations. A disabled cache (capacity 0, or the
/// `Default` value) admits everything.
#[derive(Debug, Default)]
pub struct ReplayCache {
    generations: Option<Mutex<Generations>>,
}

impl ReplayCache {
    /// Create a cache that remembers at least `capacity` handshakes.
    ///
    /// A capacity of 0 yields a disabled cache. Capacities above
    /// [`MAX_CAPACITY`] are rejected rather than clamped.
    pub fn new(capacity: usize) -> Result<Self, GuardError> {
        if capacity > MAX_CAPACITY {
            return Err(GuardError::CapacityExceeded {
                requested: capacity,
                max: MAX_CAPACITY,
            });
        }

        if capacity == 0 {
            tracing::info!("Replay cache disabled");
            return Ok(Self::disabled());
        }

        tracing::info!(capacity = capacity, "Replay cache initialized");

        Ok(Self {
            generations: Some(Mutex::new(Generations::new(capacity))),
        })
    }

    /// A cache that reports every handshake as new
    pub fn disabled() -> Self {
        Self { generations: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.generations.is_some()
    }

    pub fn capacity(&self) -> usize {
        match &self.generations {
            Some(generations) => lock(generations).capacity,
            None => 0,
        }
    }

    /// Number of fingerprints held across both generations (for monitoring)
    pub fn len(&self) -> usize {
        match &self.generations {
            Some(generations) => {
                let generations = lock(generations);
                generations.active.len() + generations.archive.len()
            }
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a handshake with this key ID and salt.
    /// Returns false if it was already present.
    pub fn add(&self, id: &str, salt: &[u8]) -> bool {
        let Some(generations) = &self.generations else {
            return true;
        };

        let hash = fingerprint(id, salt);
        lock(generations).insert(hash)
    }
}

fn lock(generations: &Mutex<Generations>) -> MutexGuard<'_, Generations> {
    // Each insert leaves the sets consistent, so a poisoned lock is still usable
    generations.lock().unwrap_or_else(PoisonError::into_inner)
}
