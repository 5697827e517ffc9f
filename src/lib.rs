pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod notify;
pub mod persistence;
pub mod pipeline;

pub use client::{GameApi, HttpGameApi};
pub use config::AppConfig;
pub use domain::{
    AttackResult, CombatEvent, FactionRecord, Mission, MissionPhase, MissionSnapshot,
    PlayerRecord, PollEntity, RetaliationAlert, StrengthEstimate,
};
pub use error::{Result, WardenError};
pub use notify::{Notification, Notifier, WebhookNotifier};
pub use persistence::{CursorStore, MemoryStore, PgCursorStore, PgStore, PollLock};
pub use pipeline::PollContext;
