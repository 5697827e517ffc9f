//! Repository traits and their Postgres implementations
//!
//! All writes are idempotent keyed by natural identifiers, so at-least-once
//! redelivery of a batch only produces redundant overwrites.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::Row;

use crate::domain::{
    EstimateScope, FactionId, Mission, MissionId, PlayerId, PlayerRecord, PlayerStub,
    StrengthEstimate,
};
use crate::error::Result;

#[async_trait]
pub trait PlayerRepo: Send + Sync {
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>>;

    /// Create a minimal record on first reference; preserves any richer
    /// data a previous full refresh already stored.
    async fn upsert_stub(&self, stub: &PlayerStub) -> Result<()>;

    /// Full overwrite from a profile refresh.
    async fn update_profile(&self, record: &PlayerRecord) -> Result<()>;

    /// Players with a registered API key, for the user-level poll.
    async fn with_api_keys(&self) -> Result<Vec<PlayerRecord>>;
}

#[async_trait]
pub trait FactionRepo: Send + Sync {
    async fn all(&self) -> Result<Vec<crate::domain::FactionRecord>>;
}

#[async_trait]
pub trait EstimateRepo: Send + Sync {
    /// Append one estimate. Idempotent on (subject, observed_at, source).
    async fn append(&self, estimate: &StrengthEstimate) -> Result<()>;

    /// Most recent estimate for `subject` visible within `scope`.
    async fn latest_visible(
        &self,
        subject: PlayerId,
        scope: EstimateScope,
    ) -> Result<Option<StrengthEstimate>>;
}

#[async_trait]
pub trait MissionRepo: Send + Sync {
    async fn get(&self, faction: FactionId, mission: MissionId) -> Result<Option<Mission>>;

    /// Upsert keyed by (faction, mission id).
    async fn upsert(&self, mission: &Mission) -> Result<()>;
}

/// Postgres-backed repositories sharing one pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Bootstrap every table this store owns.
    pub async fn ensure_schema(pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS players (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                faction_id BIGINT,
                battle_score DOUBLE PRECISION NOT NULL DEFAULT 0,
                score_updated_at TIMESTAMPTZ,
                api_key TEXT
            );

            CREATE TABLE IF NOT EXISTS factions (
                id BIGINT PRIMARY KEY,
                name TEXT NOT NULL,
                api_keys JSONB NOT NULL DEFAULT '[]',
                notify JSONB NOT NULL DEFAULT '{}',
                stats_db_enabled BOOLEAN NOT NULL DEFAULT FALSE,
                stats_db_global BOOLEAN NOT NULL DEFAULT FALSE
            );

            CREATE TABLE IF NOT EXISTS strength_estimates (
                subject_id BIGINT NOT NULL,
                score DOUBLE PRECISION NOT NULL,
                observed_at TIMESTAMPTZ NOT NULL,
                source_player BIGINT NOT NULL,
                source_faction BIGINT,
                global_visible BOOLEAN NOT NULL,
                PRIMARY KEY (subject_id, observed_at, source_player)
            );

            CREATE INDEX IF NOT EXISTS idx_estimates_subject
                ON strength_estimates(subject_id, observed_at DESC);

            CREATE TABLE IF NOT EXISTS missions (
                faction_id BIGINT NOT NULL,
                mission_id BIGINT NOT NULL,
                kind TEXT NOT NULL,
                participants JSONB NOT NULL DEFAULT '[]',
                time_started TIMESTAMPTZ,
                time_ready TIMESTAMPTZ,
                time_completed TIMESTAMPTZ,
                initiated_by BIGINT,
                money_gain BIGINT NOT NULL DEFAULT 0,
                respect_gain DOUBLE PRECISION NOT NULL DEFAULT 0,
                delayers JSONB NOT NULL DEFAULT '[]',
                notified_ready BOOLEAN NOT NULL DEFAULT FALSE,
                notified_completed BOOLEAN NOT NULL DEFAULT FALSE,
                PRIMARY KEY (faction_id, mission_id)
            );
            "#,
        )
        .execute(pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PlayerRepo for PgStore {
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>> {
        let row = sqlx::query(
            "SELECT id, name, faction_id, battle_score, score_updated_at, api_key
             FROM players WHERE id = $1",
        )
        .bind(id as i64)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| PlayerRecord {
            id: row.get::<i64, _>("id") as PlayerId,
            name: row.get("name"),
            faction_id: row.get::<Option<i64>, _>("faction_id").map(|f| f as FactionId),
            battle_score: row.get("battle_score"),
            score_updated_at: row.get("score_updated_at"),
            api_key: row.get("api_key"),
        }))
    }

    async fn upsert_stub(&self, stub: &PlayerStub) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO players (id, name, faction_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                faction_id = EXCLUDED.faction_id
            "#,
        )
        .bind(stub.id as i64)
        .bind(&stub.name)
        .bind(stub.faction_id.map(|f| f as i64))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_profile(&self, record: &PlayerRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO players (id, name, faction_id, battle_score, score_updated_at, api_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                faction_id = EXCLUDED.faction_id,
                battle_score = EXCLUDED.battle_score,
                score_updated_at = EXCLUDED.score_updated_at,
                api_key = COALESCE(EXCLUDED.api_key, players.api_key)
            "#,
        )
        .bind(record.id as i64)
        .bind(&record.name)
        .bind(record.faction_id.map(|f| f as i64))
        .bind(record.battle_score)
        .bind(record.score_updated_at)
        .bind(&record.api_key)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn with_api_keys(&self) -> Result<Vec<PlayerRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, faction_id, battle_score, score_updated_at, api_key
             FROM players WHERE api_key IS NOT NULL AND api_key <> ''",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| PlayerRecord {
                id: row.get::<i64, _>("id") as PlayerId,
                name: row.get("name"),
                faction_id: row.get::<Option<i64>, _>("faction_id").map(|f| f as FactionId),
                battle_score: row.get("battle_score"),
                score_updated_at: row.get("score_updated_at"),
                api_key: row.get("api_key"),
            })
            .collect())
    }
}

#[async_trait]
impl FactionRepo for PgStore {
    async fn all(&self) -> Result<Vec<crate::domain::FactionRecord>> {
        let rows = sqlx::query(
            "SELECT id, name, api_keys, notify, stats_db_enabled, stats_db_global FROM factions",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                let api_keys: serde_json::Value = row.get("api_keys");
                let notify: serde_json::Value = row.get("notify");
                Ok(crate::domain::FactionRecord {
                    id: row.get::<i64, _>("id") as FactionId,
                    name: row.get("name"),
                    api_keys: serde_json::from_value(api_keys)?,
                    notify: serde_json::from_value(notify)?,
                    stats_db_enabled: row.get("stats_db_enabled"),
                    stats_db_global: row.get("stats_db_global"),
                })
            })
            .collect()
    }
}

#[async_trait]
impl EstimateRepo for PgStore {
    async fn append(&self, estimate: &StrengthEstimate) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO strength_estimates
                (subject_id, score, observed_at, source_player, source_faction, global_visible)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (subject_id, observed_at, source_player) DO NOTHING
            "#,
        )
        .bind(estimate.subject_id as i64)
        .bind(estimate.score)
        .bind(estimate.observed_at)
        .bind(estimate.source_player as i64)
        .bind(estimate.source_faction.map(|f| f as i64))
        .bind(estimate.global_visible)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn latest_visible(
        &self,
        subject: PlayerId,
        scope: EstimateScope,
    ) -> Result<Option<StrengthEstimate>> {
        let viewer_faction: Option<i64> = match scope {
            EstimateScope::Global => None,
            EstimateScope::Faction(id) => Some(id as i64),
        };

        let row = sqlx::query(
            r#"
            SELECT subject_id, score, observed_at, source_player, source_faction, global_visible
            FROM strength_estimates
            WHERE subject_id = $1
              AND (global_visible OR source_faction = $2)
            ORDER BY observed_at DESC
            LIMIT 1
            "#,
        )
        .bind(subject as i64)
        .bind(viewer_faction)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| StrengthEstimate {
            subject_id: row.get::<i64, _>("subject_id") as PlayerId,
            score: row.get("score"),
            observed_at: row.get("observed_at"),
            source_player: row.get::<i64, _>("source_player") as PlayerId,
            source_faction: row
                .get::<Option<i64>, _>("source_faction")
                .map(|f| f as FactionId),
            global_visible: row.get("global_visible"),
        }))
    }
}

#[async_trait]
impl MissionRepo for PgStore {
    async fn get(&self, faction: FactionId, mission: MissionId) -> Result<Option<Mission>> {
        let row = sqlx::query(
            r#"
            SELECT faction_id, mission_id, kind, participants, time_started, time_ready,
                   time_completed, initiated_by, money_gain, respect_gain, delayers,
                   notified_ready, notified_completed
            FROM missions WHERE faction_id = $1 AND mission_id = $2
            "#,
        )
        .bind(faction as i64)
        .bind(mission as i64)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<Mission> {
            let participants: serde_json::Value = row.get("participants");
            let delayers: serde_json::Value = row.get("delayers");
            Ok(Mission {
                faction_id: row.get::<i64, _>("faction_id") as FactionId,
                mission_id: row.get::<i64, _>("mission_id") as MissionId,
                kind: row.get("kind"),
                participants: serde_json::from_value(participants)?,
                time_started: row.get::<Option<DateTime<Utc>>, _>("time_started"),
                time_ready: row.get("time_ready"),
                time_completed: row.get("time_completed"),
                initiated_by: row
                    .get::<Option<i64>, _>("initiated_by")
                    .map(|p| p as PlayerId),
                money_gain: row.get("money_gain"),
                respect_gain: row.get("respect_gain"),
                delayers: serde_json::from_value(delayers)?,
                notified_ready: row.get("notified_ready"),
                notified_completed: row.get("notified_completed"),
            })
        })
        .transpose()
    }

    async fn upsert(&self, mission: &Mission) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO missions
                (faction_id, mission_id, kind, participants, time_started, time_ready,
                 time_completed, initiated_by, money_gain, respect_gain, delayers,
                 notified_ready, notified_completed)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (faction_id, mission_id) DO UPDATE
            SET kind = EXCLUDED.kind,
                participants = EXCLUDED.participants,
                time_started = EXCLUDED.time_started,
                time_ready = EXCLUDED.time_ready,
                time_completed = EXCLUDED.time_completed,
                initiated_by = EXCLUDED.initiated_by,
                money_gain = EXCLUDED.money_gain,
                respect_gain = EXCLUDED.respect_gain,
                delayers = EXCLUDED.delayers,
                notified_ready = EXCLUDED.notified_ready,
                notified_completed = EXCLUDED.notified_completed
            "#,
        )
        .bind(mission.faction_id as i64)
        .bind(mission.mission_id as i64)
        .bind(&mission.kind)
        .bind(serde_json::to_value(&mission.participants)?)
        .bind(mission.time_started)
        .bind(mission.time_ready)
        .bind(mission.time_completed)
        .bind(mission.initiated_by.map(|p| p as i64))
        .bind(mission.money_gain)
        .bind(mission.respect_gain)
        .bind(serde_json::to_value(&mission.delayers)?)
        .bind(mission.notified_ready)
        .bind(mission.notified_completed)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
