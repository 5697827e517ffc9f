//! Advisory per-job poll locks
//!
//! Bounds wasted duplicate API calls when a polling cycle overruns its
//! interval. Correctness never depends on these locks; every persistent
//! write in the pipelines is idempotent.

use dashmap::DashMap;
use std::time::{Duration, Instant};

/// In-process keyed TTL lock. A lock with zero or negative remaining TTL
/// is treated as absent.
#[derive(Debug, Default)]
pub struct PollLock {
    expiries: DashMap<String, Instant>,
}

impl PollLock {
    pub fn new() -> Self {
        Self {
            expiries: DashMap::new(),
        }
    }

    /// Try to take the lock for `job_key`. Returns false immediately when
    /// a live lock exists; never blocks. TTLs below one second are
    /// clamped up to one second.
    pub fn acquire(&self, job_key: &str, ttl: Duration) -> bool {
        self.acquire_at(job_key, ttl, Instant::now())
    }

    fn acquire_at(&self, job_key: &str, ttl: Duration, now: Instant) -> bool {
        let ttl = ttl.max(Duration::from_secs(1));

        match self.expiries.entry(job_key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(mut entry) => {
                if *entry.get() > now {
                    return false;
                }
                entry.insert(now + ttl);
                true
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now + ttl);
                true
            }
        }
    }

    /// Remaining TTL of a live lock, if any. Reported back to the
    /// scheduler in the `AlreadyRunning` error.
    pub fn remaining(&self, job_key: &str) -> Option<Duration> {
        let expiry = *self.expiries.get(job_key)?;
        expiry.checked_duration_since(Instant::now())
    }

    /// Drop the lock early once a cycle finishes.
    pub fn release(&self, job_key: &str) {
        self.expiries.remove(job_key);
    }
}
