//! Retaliation detection
//!
//! One pass over a combat-event batch, emitting an alert for each
//! qualifying defensive loss still inside its actionable window.
//! Delivery failures are logged and skipped; repository failures abort
//! the pass so the watermark stays put and the batch is re-polled.

use chrono::{DateTime, Utc};
use tracing::{debug, error};

use crate::domain::alert::EstimatedStrength;
use crate::domain::{
    CombatEvent, EstimateScope, FactionRecord, PlayerStub, RetaliationAlert,
};
use crate::error::Result;
use crate::notify::{Notification, Notifier};
use crate::persistence::{EstimateRepo, PlayerRepo};

use super::classifier::retaliation_relevant;
use super::estimator::{invert_fair_fight, ANOMALOUS_FAIR_FIGHT};

/// Run the retaliation pass for one faction over one batch.
pub async fn process(
    faction: &FactionRecord,
    players: &dyn PlayerRepo,
    estimates: &dyn EstimateRepo,
    notifier: &dyn Notifier,
    events: &[CombatEvent],
    watermark: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    let Some(channel) = faction.notify.retaliation else {
        return Ok(());
    };

    for ev in events {
        if !retaliation_relevant(ev, faction.id, watermark, now) {
            continue;
        }
        // Classifier guarantees the attacker is known here
        let Some(aggressor_id) = ev.attacker_id else {
            continue;
        };

        let aggressor_name = ev
            .attacker_name
            .clone()
            .unwrap_or_else(|| format!("Player {aggressor_id}"));

        // Keep foreign keys valid even for first-seen parties
        players
            .upsert_stub(&PlayerStub {
                id: ev.defender_id,
                name: ev.defender_name.clone(),
                faction_id: ev.defender_faction,
            })
            .await?;
        players
            .upsert_stub(&PlayerStub {
                id: aggressor_id,
                name: aggressor_name.clone(),
                faction_id: ev.attacker_faction,
            })
            .await?;

        let estimated = if ev.fair_fight != ANOMALOUS_FAIR_FIGHT {
            // Invert from the victim's own fresh self-score
            match players.get(ev.defender_id).await? {
                Some(victim) => victim
                    .fresh_score(now)
                    .and_then(|score| invert_fair_fight(score, ev.fair_fight, true))
                    .map(|score| EstimatedStrength {
                        score,
                        observed_at: now,
                    }),
                None => None,
            }
        } else {
            // Saturated multiplier carries no ratio information; fall back
            // to the most recent visible stored estimate
            estimates
                .latest_visible(aggressor_id, EstimateScope::Faction(faction.id))
                .await?
                .map(|est| EstimatedStrength {
                    score: est.score,
                    observed_at: est.observed_at,
                })
        };

        let alert = RetaliationAlert {
            victim_id: ev.defender_id,
            victim_name: ev.defender_name.clone(),
            aggressor_id,
            aggressor_name,
            aggressor_faction: ev.attacker_faction,
            aggressor_faction_name: ev.attacker_faction_name.clone(),
            log_code: ev.log_code.clone(),
            result: ev.result.to_string(),
            respect_gain: ev.respect_gain,
            expires_at: ev.retaliation_deadline(),
            estimated_aggressor_strength: estimated,
            aggressor_chaining: ev.attacker_faction.is_some() && ev.chain > 100,
        };

        debug!(
            faction = faction.id,
            aggressor = alert.aggressor_id,
            victim = alert.victim_id,
            "emitting retaliation alert"
        );

        if let Err(e) = notifier.send(channel, &Notification::Retaliation(alert)).await {
            error!(faction = faction.id, error = %e, "retaliation alert delivery failed");
        }
    }

    Ok(())
}
