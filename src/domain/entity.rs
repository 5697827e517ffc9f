use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ChannelId, FactionId, PlayerId};

/// Self-estimates older than this must not seed estimates for others.
pub const SCORE_FRESHNESS_SECS: i64 = 259_200; // three days

/// Notification channels configured for one faction. A `None` channel
/// disables the corresponding notification family.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotifyTargets {
    pub retaliation: Option<ChannelId>,
    pub mission_delay: Option<ChannelId>,
    pub mission_ready: Option<ChannelId>,
    pub mission_completed: Option<ChannelId>,
}

/// A faction the service polls on behalf of.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionRecord {
    pub id: FactionId,
    pub name: String,
    /// API keys contributed by faction members with API access
    pub api_keys: Vec<String>,
    pub notify: NotifyTargets,
    /// Whether the faction contributes to the strength estimate database
    pub stats_db_enabled: bool,
    /// Whether estimates produced by this faction are globally visible
    pub stats_db_global: bool,
}

/// A player known to the service. May be a fully refreshed record or a
/// stub created on first reference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub name: String,
    pub faction_id: Option<FactionId>,
    /// Composite battle score; 0.0 means unknown
    pub battle_score: f64,
    pub score_updated_at: Option<DateTime<Utc>>,
    /// Personal API key, when the player registered one
    pub api_key: Option<String>,
}

impl PlayerRecord {
    /// The player's own score, only if known, non-zero, and fresh enough
    /// to seed estimates for opponents.
    pub fn fresh_score(&self, now: DateTime<Utc>) -> Option<f64> {
        if self.battle_score == 0.0 {
            return None;
        }
        let updated = self.score_updated_at?;
        if now - updated > Duration::seconds(SCORE_FRESHNESS_SECS) {
            return None;
        }
        Some(self.battle_score)
    }
}

/// Minimal player record created on first sighting so foreign keys stay
/// valid pending a full refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerStub {
    pub id: PlayerId,
    pub name: String,
    pub faction_id: Option<FactionId>,
}

/// The entity a polling cycle runs on behalf of. Watermarks are keyed by
/// this, so faction-level and user-level jobs never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PollEntity {
    Faction(FactionId),
    Player(PlayerId),
}

impl PollEntity {
    /// Stable key for cursor and lock storage.
    pub fn cursor_key(&self) -> String {
        match self {
            PollEntity::Faction(id) => format!("faction:{id}"),
            PollEntity::Player(id) => format!("player:{id}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(score: f64, updated_secs_ago: i64) -> PlayerRecord {
        PlayerRecord {
            id: 1,
            name: "tester".to_string(),
            faction_id: Some(5),
            battle_score: score,
            score_updated_at: Some(Utc::now() - Duration::seconds(updated_secs_ago)),
            api_key: None,
        }
    }

    #[test]
    fn fresh_score_requires_recent_update() {
        let now = Utc::now();
        assert!(player(1000.0, 60).fresh_score(now).is_some());
        assert!(player(1000.0, SCORE_FRESHNESS_SECS + 1).fresh_score(now).is_none());
    }

    #[test]
    fn zero_score_is_never_fresh() {
        assert!(player(0.0, 60).fresh_score(Utc::now()).is_none());
    }

    #[test]
    fn cursor_keys_do_not_collide() {
        assert_ne!(
            PollEntity::Faction(7).cursor_key(),
            PollEntity::Player(7).cursor_key()
        );
    }
}
