//! Combat-event classification
//!
//! Two independent predicate chains over one immutable batch: which
//! events are actionable for retaliation, and which may seed strength
//! estimates. An event may pass one, both, or neither.

use chrono::{DateTime, Duration, Utc};

use crate::domain::{AttackResult, CombatEvent, FactionId, PlayerId, PlayerStub};

/// Fixed non-player training-target identifiers; fights against these
/// carry no intelligence value.
pub const TRAINING_TARGETS: [PlayerId; 7] = [4, 10, 15, 17, 19, 20, 21];

/// Seconds after `timestamp_ended` during which a defensive loss is
/// still actionable.
pub const RETALIATION_WINDOW_SECS: i64 = 300;

/// Results that carry no usable information for either pipeline.
/// `Unrecognized` is excluded explicitly instead of falling through.
fn result_excluded(result: AttackResult) -> bool {
    matches!(
        result,
        AttackResult::Assist
            | AttackResult::Lost
            | AttackResult::Stalemate
            | AttackResult::Escape
            | AttackResult::Looted
            | AttackResult::Interrupted
            | AttackResult::Timeout
            | AttackResult::Unrecognized
    )
}

fn training_target(id: PlayerId) -> bool {
    TRAINING_TARGETS.contains(&id)
}

/// Whether one event qualifies for a retaliation alert for `faction_id`.
pub fn retaliation_relevant(
    ev: &CombatEvent,
    faction_id: FactionId,
    watermark: DateTime<Utc>,
    now: DateTime<Utc>,
) -> bool {
    if result_excluded(ev.result) {
        return false;
    }
    if training_target(ev.defender_id) {
        return false;
    }
    if ev.timestamp_ended <= watermark {
        return false;
    }
    // Must be a defense, not an offense
    if ev.defender_faction != Some(faction_id) {
        return false;
    }
    // Stealthed attacker cannot be retaliated against
    if !ev.attacker_known() {
        return false;
    }
    // Zero respect means same-faction or recruit friendly fire
    if ev.respect_gain <= 0.0 {
        return false;
    }
    // Cross-border pokes outside a war are not actionable
    if ev.overseas && !ev.war {
        return false;
    }
    // Still inside the actionable window
    now - ev.timestamp_ended < Duration::seconds(RETALIATION_WINDOW_SECS)
}

/// Whether one event may seed a strength estimate at all. Side-specific
/// rules live in [`resolve_sides`].
pub fn stat_relevant(ev: &CombatEvent, watermark: DateTime<Utc>) -> bool {
    if result_excluded(ev.result) {
        return false;
    }
    if training_target(ev.defender_id) {
        return false;
    }
    // Ambiguous fairness regime: a multiplier inside (1, 3) can overstate
    // the defender's strength
    if ev.fair_fight > 1.0 && ev.fair_fight < 3.0 {
        return false;
    }
    ev.timestamp_ended > watermark
}

/// The entity an ingestion pass runs on behalf of.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestSubject {
    Faction(FactionId),
    Player(PlayerId),
}

/// Attacker/defender resolution relative to the ingest subject.
#[derive(Debug, Clone)]
pub struct ResolvedSides {
    /// The faction member (or key owner) whose score seeds the inversion
    pub self_player: PlayerId,
    pub self_is_defender: bool,
    /// The other side, as a stub ready for upsert
    pub opponent: PlayerStub,
}

/// Decide which side of the event is "us" and which is the opponent.
/// Returns `None` when the event cannot be attributed (stealthed
/// attacker, friendly fire in either direction, or unrelated parties).
pub fn resolve_sides(ev: &CombatEvent, subject: IngestSubject) -> Option<ResolvedSides> {
    // Zero respect marks same-faction or recruit friendly fire,
    // regardless of which side is ours
    if ev.respect_gain <= 0.0 {
        return None;
    }

    let self_is_defender = match subject {
        IngestSubject::Faction(faction_id) => ev.defender_faction == Some(faction_id),
        IngestSubject::Player(player_id) => {
            if ev.attacker_id == Some(player_id) {
                false
            } else if ev.defender_id == player_id {
                true
            } else {
                return None;
            }
        }
    };

    if self_is_defender {
        let attacker_id = ev.attacker_id?;
        Some(ResolvedSides {
            self_player: ev.defender_id,
            self_is_defender: true,
            opponent: PlayerStub {
                id: attacker_id,
                name: ev
                    .attacker_name
                    .clone()
                    .unwrap_or_else(|| format!("Player {attacker_id}")),
                faction_id: ev.attacker_faction,
            },
        })
    } else {
        let attacker_id = ev.attacker_id?;
        Some(ResolvedSides {
            self_player: attacker_id,
            self_is_defender: false,
            opponent: PlayerStub {
                id: ev.defender_id,
                name: ev.defender_name.clone(),
                faction_id: ev.defender_faction,
            },
        })
    }
}
