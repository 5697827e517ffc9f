//! Per-entity fetch cursors
//!
//! Each polling entity carries a watermark: the timestamp of the last
//! event that was fully classified and dispatched. The watermark only
//! ever moves forward, and only after a whole batch has been processed.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use sqlx::postgres::PgPool;
use tracing::debug;

use crate::domain::PollEntity;
use crate::error::Result;

/// A stale cursor older than this floods the pipeline with a day of
/// backlog; reset instead.
pub const STALE_CURSOR_SECS: i64 = 86_400;

/// Keyed watermark storage.
#[async_trait]
pub trait CursorStore: Send + Sync {
    async fn watermark(&self, entity: &PollEntity) -> Result<Option<DateTime<Utc>>>;

    /// Advance the watermark. Implementations must keep it monotonically
    /// non-decreasing even under concurrent re-delivery.
    async fn advance(&self, entity: &PollEntity, ts: DateTime<Utc>) -> Result<()>;
}

/// Decision on how one polling cycle should fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchWindow {
    /// No fetch this cycle (first sighting or stale reset)
    Skip,
    /// Fetch events since this instant; API-side filter is inclusive
    Since(DateTime<Utc>),
}

/// Gate one cycle against the stored watermark.
///
/// First poll of an entity sets the watermark to `now` and skips, which
/// deliberately discards backlog older than the first-seen time. A
/// watermark older than [`STALE_CURSOR_SECS`] is reset the same way.
pub async fn open_window(
    store: &dyn CursorStore,
    entity: &PollEntity,
    now: DateTime<Utc>,
) -> Result<FetchWindow> {
    match store.watermark(entity).await? {
        None => {
            debug!(entity = %entity.cursor_key(), "first sighting, bootstrapping watermark");
            store.advance(entity, now).await?;
            Ok(FetchWindow::Skip)
        }
        Some(watermark) if now - watermark > Duration::seconds(STALE_CURSOR_SECS) => {
            debug!(entity = %entity.cursor_key(), %watermark, "stale watermark, resetting");
            store.advance(entity, now).await?;
            Ok(FetchWindow::Skip)
        }
        Some(watermark) => Ok(FetchWindow::Since(watermark + Duration::seconds(1))),
    }
}

/// Postgres-backed cursor store.
pub struct PgCursorStore {
    pool: PgPool,
}

impl PgCursorStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_cursors (
                entity_key TEXT PRIMARY KEY,
                watermark TIMESTAMPTZ NOT NULL
            );
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl CursorStore for PgCursorStore {
    async fn watermark(&self, entity: &PollEntity) -> Result<Option<DateTime<Utc>>> {
        let row: Option<(DateTime<Utc>,)> =
            sqlx::query_as("SELECT watermark FROM poll_cursors WHERE entity_key = $1")
                .bind(entity.cursor_key())
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(ts,)| ts))
    }

    async fn advance(&self, entity: &PollEntity, ts: DateTime<Utc>) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO poll_cursors (entity_key, watermark)
            VALUES ($1, $2)
            ON CONFLICT (entity_key)
            DO UPDATE SET watermark = GREATEST(poll_cursors.watermark, EXCLUDED.watermark)
            "#,
        )
        .bind(entity.cursor_key())
        .bind(ts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

/// In-memory cursor store for tests and single-process dry runs.
#[derive(Debug, Default)]
pub struct MemoryCursorStore {
    watermarks: DashMap<String, DateTime<Utc>>,
}

impl MemoryCursorStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CursorStore for MemoryCursorStore {
    async fn watermark(&self, entity: &PollEntity) -> Result<Option<DateTime<Utc>>> {
        Ok(self.watermarks.get(&entity.cursor_key()).map(|ts| *ts))
    }

    async fn advance(&self, entity: &PollEntity, ts: DateTime<Utc>) -> Result<()> {
        self.watermarks
            .entry(entity.cursor_key())
            .and_modify(|current| {
                if ts > *current {
                    *current = ts;
                }
            })
            .or_insert(ts);
        Ok(())
    }
}
