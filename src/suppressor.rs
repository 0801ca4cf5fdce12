//! Loop suppression for platform-originated writes
//!
//! When the platform's configuration API rewrites an agent config file it
//! registers the sha256 of the bytes it wrote. The engine hashes every
//! settled change before dispatch; an exact match consumes the registration
//! and the change is skipped instead of being ingested again.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

/// Default lifetime of an unconsumed registration
pub const DEFAULT_SUPPRESSION_WINDOW: Duration = Duration::from_secs(5);

/// Registry of content hashes written by the platform itself.
///
/// Implementations consume a registration only on exact hash equality.
pub trait SuppressionRegistry: Send + Sync {
    /// Register a hash as platform-originated
    fn register(&self, hash: String);

    /// Consume a live registration for `hash`. Returns true if the change
    /// carrying it must be skipped.
    fn take(&self, hash: &str) -> bool;

    /// Drop expired registrations, returning how many were removed
    fn prune(&self) -> usize;
}

/// Hex-encoded sha256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Process-local registry with a fixed expiry window
pub struct LoopSuppressor {
    window: Duration,
    entries: Mutex<HashMap<String, Instant>>,
}

impl Default for LoopSuppressor {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPRESSION_WINDOW)
    }
}

impl LoopSuppressor {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Hash and register `bytes`, returning the hash
    pub fn register_contents(&self, bytes: &[u8]) -> String {
        let hash = content_hash(bytes);
        self.register(hash.clone());
        hash
    }

    /// Number of live (unexpired) registrations
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|expires_at| **expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) fn register_at(&self, hash: String, now: Instant) {
        self.lock().insert(hash, now + self.window);
    }

    pub(crate) fn take_at(&self, hash: &str, now: Instant) -> bool {
        let mut entries = self.lock();
        entries.retain(|_, expires_at| *expires_at > now);
        entries.remove(hash).is_some()
    }

    pub(crate) fn prune_at(&self, now: Instant) -> usize {
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, expires_at| *expires_at > now);
        before - entries.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Instant>> {
        // A poisoned map still holds valid hashes
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SuppressionRegistry for LoopSuppressor {
    fn register(&self, hash: String) {
        tracing::debug!("Registered platform write {}", hash.get(..12).unwrap_or(hash.as_str()));
        self.register_at(hash, Instant::now());
    }

    fn take(&self, hash: &str) -> bool {
        self.take_at(hash, Instant::now())
    }

    fn prune(&self) -> usize {
        self.prune_at(Instant::now())
    }
}
