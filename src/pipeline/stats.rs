//! Strength-estimate ingestion
//!
//! One pass over a combat-event batch, inverting the fairness multiplier
//! against the known side's score and appending estimates for opponents.
//! Shared by the faction-level and user-level polling jobs.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{debug, error};

use crate::client::GameApi;
use crate::domain::{CombatEvent, StrengthEstimate};
use crate::error::Result;
use crate::persistence::{EstimateRepo, PlayerRepo};

use super::classifier::{resolve_sides, stat_relevant, IngestSubject};
use super::estimator::invert_fair_fight;

/// Stat ingestion pass, parameterized by subject so the faction-level
/// and user-level pipelines share one implementation.
pub struct StatIngest {
    pub api: Arc<dyn GameApi>,
    pub players: Arc<dyn PlayerRepo>,
    pub estimates: Arc<dyn EstimateRepo>,
}

impl StatIngest {
    /// Process one batch on behalf of `subject`.
    ///
    /// `global_visible` scopes the produced estimates; `refresh_key` is
    /// the credential used for best-effort opponent profile refreshes.
    pub async fn process(
        &self,
        subject: IngestSubject,
        global_visible: bool,
        refresh_key: &str,
        events: &[CombatEvent],
        watermark: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        for ev in events {
            if !stat_relevant(ev, watermark) {
                continue;
            }
            let Some(sides) = resolve_sides(ev, subject) else {
                continue;
            };

            // Stale or unknown self-scores must not seed estimates
            let Some(user) = self.players.get(sides.self_player).await? else {
                continue;
            };
            let Some(user_score) = user.fresh_score(now) else {
                debug!(
                    player = sides.self_player,
                    "self score unknown or stale, skipping event"
                );
                continue;
            };

            self.players.upsert_stub(&sides.opponent).await?;
            self.spawn_refresh(sides.opponent.id, refresh_key);

            let Some(score) =
                invert_fair_fight(user_score, ev.fair_fight, sides.self_is_defender)
            else {
                // Undefined inversion carries no information
                continue;
            };

            self.estimates
                .append(&StrengthEstimate {
                    subject_id: sides.opponent.id,
                    score,
                    observed_at: ev.timestamp_ended,
                    source_player: sides.self_player,
                    source_faction: user.faction_id,
                    global_visible,
                })
                .await?;
        }

        Ok(())
    }

    /// Best-effort background refresh of the opponent's own profile, so a
    /// future self-estimate exists. Failure never aborts the batch.
    fn spawn_refresh(&self, opponent_id: u64, key: &str) {
        let api = Arc::clone(&self.api);
        let players = Arc::clone(&self.players);
        let key = key.to_string();

        tokio::spawn(async move {
            match api.player_profile(&key, opponent_id).await {
                Ok(record) => {
                    if let Err(e) = players.update_profile(&record).await {
                        error!(player = opponent_id, error = %e, "profile refresh store failed");
                    }
                }
                Err(e) => {
                    debug!(player = opponent_id, error = %e, "profile refresh fetch failed");
                }
            }
        });
    }
}
