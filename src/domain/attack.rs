use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FactionId, PlayerId};

/// Outcome of a single combat encounter, as reported by the game API.
///
/// Unknown result strings are surfaced as `Unrecognized` rather than
/// silently dropped, so the classifier can exclude them explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AttackResult {
    Lost,
    Attacked,
    Mugged,
    Hospitalized,
    Stalemate,
    Escape,
    Assist,
    Special,
    Looted,
    Arrested,
    Timeout,
    Interrupted,
    /// Result string not known to this version of the service
    Unrecognized,
}

impl AttackResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttackResult::Lost => "Lost",
            AttackResult::Attacked => "Attacked",
            AttackResult::Mugged => "Mugged",
            AttackResult::Hospitalized => "Hospitalized",
            AttackResult::Stalemate => "Stalemate",
            AttackResult::Escape => "Escape",
            AttackResult::Assist => "Assist",
            AttackResult::Special => "Special",
            AttackResult::Looted => "Looted",
            AttackResult::Arrested => "Arrested",
            AttackResult::Timeout => "Timeout",
            AttackResult::Interrupted => "Interrupted",
            AttackResult::Unrecognized => "Unrecognized",
        }
    }
}

impl From<&str> for AttackResult {
    fn from(s: &str) -> Self {
        match s {
            "Lost" => AttackResult::Lost,
            "Attacked" => AttackResult::Attacked,
            "Mugged" => AttackResult::Mugged,
            "Hospitalized" => AttackResult::Hospitalized,
            "Stalemate" => AttackResult::Stalemate,
            "Escape" => AttackResult::Escape,
            "Assist" => AttackResult::Assist,
            "Special" => AttackResult::Special,
            "Looted" => AttackResult::Looted,
            "Arrested" => AttackResult::Arrested,
            "Timeout" => AttackResult::Timeout,
            "Interrupted" => AttackResult::Interrupted,
            _ => AttackResult::Unrecognized,
        }
    }
}

impl fmt::Display for AttackResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One combat event as received from the game API. Immutable once built;
/// the pipelines only ever read it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CombatEvent {
    /// Vendor identifier of the attack log entry
    pub log_code: String,
    /// None when the attacker stayed stealthed
    pub attacker_id: Option<PlayerId>,
    pub attacker_name: Option<String>,
    /// None when the attacker has no faction
    pub attacker_faction: Option<FactionId>,
    pub attacker_faction_name: Option<String>,
    pub defender_id: PlayerId,
    pub defender_name: String,
    pub defender_faction: Option<FactionId>,
    pub result: AttackResult,
    pub respect_gain: f64,
    pub timestamp_ended: DateTime<Utc>,
    /// Fairness multiplier, nominal range roughly 1..=3
    pub fair_fight: f64,
    /// Fight happened abroad
    pub overseas: bool,
    /// Fight happened under an active war
    pub war: bool,
    /// Attacker faction chain length at the time of the hit
    pub chain: u32,
}

impl CombatEvent {
    /// Whether the attacker is identifiable at all.
    pub fn attacker_known(&self) -> bool {
        self.attacker_id.is_some()
    }

    /// The moment the event stops being actionable for retaliation.
    pub fn retaliation_deadline(&self) -> DateTime<Utc> {
        self.timestamp_ended + Duration::seconds(300)
    }
}
