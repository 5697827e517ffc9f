//! Event-processing pipelines
//!
//! Three recurring jobs share one dependency bundle: the faction attack
//! poll, the user attack poll, and the mission refresh. Each job takes
//! the process-wide advisory lock for its key before touching anything,
//! so overlapping scheduler ticks collapse into one run.

pub mod attacks;
pub mod classifier;
pub mod estimator;
pub mod missions;
pub mod retaliation;
pub mod stats;

use std::sync::Arc;
use std::time::Duration;

use crate::client::GameApi;
use crate::error::{Result, WardenError};
use crate::notify::Notifier;
use crate::persistence::{CursorStore, EstimateRepo, FactionRepo, MissionRepo, PlayerRepo, PollLock};

/// Shared dependencies handed to every polling job.
pub struct PollContext {
    pub api: Arc<dyn GameApi>,
    pub players: Arc<dyn PlayerRepo>,
    pub factions: Arc<dyn FactionRepo>,
    pub estimates: Arc<dyn EstimateRepo>,
    pub missions: Arc<dyn MissionRepo>,
    pub cursors: Arc<dyn CursorStore>,
    pub notifier: Arc<dyn Notifier>,
    pub lock: Arc<PollLock>,
    pub lock_ttl: Duration,
}

/// Take the advisory lock for `job_key` or fail with the remaining TTL.
pub(crate) fn acquire_or_bail(ctx: &PollContext, job_key: &str) -> Result<()> {
    if ctx.lock.acquire(job_key, ctx.lock_ttl) {
        return Ok(());
    }
    let retry_after = ctx
        .lock
        .remaining(job_key)
        .unwrap_or(Duration::from_secs(1));
    Err(WardenError::AlreadyRunning {
        job: job_key.to_string(),
        retry_after_secs: retry_after.as_secs().max(1),
    })
}
