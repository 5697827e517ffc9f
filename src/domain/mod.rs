//! Core domain types shared across the polling pipelines.

pub mod alert;
pub mod attack;
pub mod entity;
pub mod estimate;
pub mod mission;

pub use alert::RetaliationAlert;
pub use attack::{AttackResult, CombatEvent};
pub use entity::{FactionRecord, NotifyTargets, PlayerRecord, PlayerStub, PollEntity};
pub use estimate::{EstimateScope, StrengthEstimate};
pub use mission::{Mission, MissionParticipant, MissionPhase, MissionSnapshot};

/// Stable player identifier assigned by the game
pub type PlayerId = u64;

/// Stable faction identifier assigned by the game
pub type FactionId = u64;

/// Stable mission identifier assigned by the game
pub type MissionId = u64;

/// Chat channel identifier used for notification delivery
pub type ChannelId = u64;
