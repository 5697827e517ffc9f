use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FactionId, PlayerId};

/// One inferred strength observation. The estimate log is append-only;
/// the "current" estimate for a subject is the most recent visible entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrengthEstimate {
    pub subject_id: PlayerId,
    /// Inferred battle score, always positive
    pub score: f64,
    /// Taken from the combat event that produced the estimate
    pub observed_at: DateTime<Utc>,
    /// The faction member whose own score seeded the inversion
    pub source_player: PlayerId,
    pub source_faction: Option<FactionId>,
    /// Visible to every reader, not just the producing faction
    pub global_visible: bool,
}

impl StrengthEstimate {
    /// Whether a reader with the given scope may see this entry.
    pub fn visible_to(&self, scope: &EstimateScope) -> bool {
        if self.global_visible {
            return true;
        }
        match scope {
            EstimateScope::Global => false,
            EstimateScope::Faction(faction_id) => self.source_faction == Some(*faction_id),
        }
    }
}

/// Visibility scope of a reader querying the estimate log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EstimateScope {
    /// Reader without faction context; sees only global entries
    Global,
    /// Reader inside a faction; sees global entries plus their faction's own
    Faction(FactionId),
}
