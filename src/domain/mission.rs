use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{FactionId, MissionId, PlayerId};

/// Lifecycle phase of an organized mission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MissionPhase {
    /// Scheduled, readiness deadline not reached yet
    Planned,
    /// Readiness deadline passed with participants still unavailable
    Delayed,
    /// All participants available, mission can be initiated
    Ready,
    /// Initiated and finished; terminal
    Completed,
}

impl MissionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            MissionPhase::Planned => "PLANNED",
            MissionPhase::Delayed => "DELAYED",
            MissionPhase::Ready => "READY",
            MissionPhase::Completed => "COMPLETED",
        }
    }

    /// Check if this phase can transition to another phase
    pub fn can_transition_to(&self, target: MissionPhase) -> bool {
        use MissionPhase::*;

        match (self, target) {
            // Planned missions become delayed, ready, or complete directly
            (Planned, Delayed) | (Planned, Ready) | (Planned, Completed) => true,

            // Delayed missions recover or complete; a delayer may also
            // push the deadline out again
            (Delayed, Planned) | (Delayed, Ready) | (Delayed, Completed) => true,

            // Ready missions regress only through a new delay
            (Ready, Delayed) | (Ready, Completed) => true,

            // Completed is terminal
            (Completed, _) => false,

            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MissionPhase::Completed)
    }
}

impl fmt::Display for MissionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One participant slot of a mission
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionParticipant {
    pub player_id: PlayerId,
    pub is_ready: bool,
    /// Human-readable availability description from the API
    pub status: String,
}

/// Mission snapshot as reported by the game API in one poll
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionSnapshot {
    pub mission_id: MissionId,
    pub kind: String,
    pub participants: Vec<MissionParticipant>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_ready: Option<DateTime<Utc>>,
    pub time_completed: Option<DateTime<Utc>>,
    pub initiated_by: Option<PlayerId>,
    pub money_gain: i64,
    pub respect_gain: f64,
}

/// Tracked state of one mission. Created on first sighting, mutated on
/// every subsequent sighting, never deleted while the faction reports it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub mission_id: MissionId,
    pub faction_id: FactionId,
    pub kind: String,
    pub participants: Vec<MissionParticipant>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_ready: Option<DateTime<Utc>>,
    pub time_completed: Option<DateTime<Utc>>,
    pub initiated_by: Option<PlayerId>,
    pub money_gain: i64,
    pub respect_gain: f64,
    /// Participants that have been reported as holding the mission up
    pub delayers: Vec<PlayerId>,
    /// Set when the one "ready" notification has gone out
    pub notified_ready: bool,
    /// Set when the one "completed" notification has gone out
    pub notified_completed: bool,
}

impl Mission {
    /// Fresh tracking record for a mission seen for the first time.
    pub fn from_snapshot(faction_id: FactionId, snap: &MissionSnapshot) -> Self {
        Self {
            mission_id: snap.mission_id,
            faction_id,
            kind: snap.kind.clone(),
            participants: snap.participants.clone(),
            time_started: snap.time_started,
            time_ready: snap.time_ready,
            time_completed: snap.time_completed,
            initiated_by: snap.initiated_by,
            money_gain: snap.money_gain,
            respect_gain: snap.respect_gain,
            delayers: Vec::new(),
            notified_ready: false,
            notified_completed: false,
        }
    }

    /// Last-write-wins update of the snapshot-owned fields. Notification
    /// bookkeeping (`delayers`, `notified_*`) is owned by the tracker and
    /// left untouched.
    pub fn apply_snapshot(&mut self, snap: &MissionSnapshot) {
        self.kind = snap.kind.clone();
        self.participants = snap.participants.clone();
        self.time_started = snap.time_started;
        self.time_ready = snap.time_ready;
        self.time_completed = snap.time_completed;
        self.initiated_by = snap.initiated_by;
        self.money_gain = snap.money_gain;
        self.respect_gain = snap.respect_gain;
    }

    /// Phase as of `now`, derived from timestamps and readiness.
    pub fn phase(&self, now: DateTime<Utc>) -> MissionPhase {
        if self.time_completed.is_some() {
            return MissionPhase::Completed;
        }
        match self.time_ready {
            Some(ready) if ready > now => MissionPhase::Planned,
            _ => {
                if self.all_ready() {
                    MissionPhase::Ready
                } else {
                    MissionPhase::Delayed
                }
            }
        }
    }

    pub fn all_ready(&self) -> bool {
        self.participants.iter().all(|p| p.is_ready)
    }

    pub fn ready_count(&self) -> usize {
        self.participants.iter().filter(|p| p.is_ready).count()
    }

    pub fn not_ready(&self) -> impl Iterator<Item = &MissionParticipant> {
        self.participants.iter().filter(|p| !p.is_ready)
    }

    /// A completed mission succeeded when it produced any gain.
    pub fn succeeded(&self) -> bool {
        self.money_gain != 0 || self.respect_gain != 0.0
    }
}
