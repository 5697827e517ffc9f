//! Persistence layer
//!
//! - Poll locks bounding overlapping cycles per job
//! - Per-entity fetch cursors (watermarks)
//! - Idempotent repositories for players, factions, estimates, missions

pub mod cursor;
pub mod memory;
pub mod poll_lock;
pub mod repo;

pub use cursor::{open_window, CursorStore, FetchWindow, MemoryCursorStore, PgCursorStore};
pub use memory::MemoryStore;
pub use poll_lock::PollLock;
pub use repo::{EstimateRepo, FactionRepo, MissionRepo, PgStore, PlayerRepo};
