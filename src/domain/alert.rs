use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FactionId, PlayerId};

/// Actionable retaliation alert, derived from one qualifying defensive
/// loss. Not persisted beyond dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetaliationAlert {
    pub victim_id: PlayerId,
    pub victim_name: String,
    pub aggressor_id: PlayerId,
    pub aggressor_name: String,
    pub aggressor_faction: Option<FactionId>,
    pub aggressor_faction_name: Option<String>,
    /// Vendor log identifier, for the consumer's attack-log link
    pub log_code: String,
    pub result: String,
    pub respect_gain: f64,
    /// Advisory metadata for the consumer; never suppresses the alert
    pub expires_at: DateTime<Utc>,
    pub estimated_aggressor_strength: Option<EstimatedStrength>,
    /// The aggressor's faction is on a long chain
    pub aggressor_chaining: bool,
}

/// Strength figure attached to an alert, with its provenance timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EstimatedStrength {
    pub score: f64,
    pub observed_at: DateTime<Utc>,
}
