//! In-memory repositories
//!
//! Back the integration tests and `--dry-run` single-process runs with the
//! same trait surface as the Postgres store.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Mutex;

use crate::domain::{
    EstimateScope, FactionId, FactionRecord, Mission, MissionId, PlayerId, PlayerRecord,
    PlayerStub, StrengthEstimate,
};
use crate::error::Result;

use super::repo::{EstimateRepo, FactionRepo, MissionRepo, PlayerRepo};

#[derive(Default)]
pub struct MemoryStore {
    players: DashMap<PlayerId, PlayerRecord>,
    factions: Mutex<Vec<FactionRecord>>,
    estimates: Mutex<Vec<StrengthEstimate>>,
    missions: DashMap<(FactionId, MissionId), Mission>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_player(&self, record: PlayerRecord) {
        self.players.insert(record.id, record);
    }

    pub fn insert_faction(&self, record: FactionRecord) {
        self.factions.lock().expect("factions lock").push(record);
    }

    /// Snapshot of the estimate log, for assertions.
    pub fn estimates(&self) -> Vec<StrengthEstimate> {
        self.estimates.lock().expect("estimates lock").clone()
    }

    pub fn mission(&self, faction: FactionId, mission: MissionId) -> Option<Mission> {
        self.missions.get(&(faction, mission)).map(|m| m.clone())
    }
}

#[async_trait]
impl PlayerRepo for MemoryStore {
    async fn get(&self, id: PlayerId) -> Result<Option<PlayerRecord>> {
        Ok(self.players.get(&id).map(|r| r.clone()))
    }

    async fn upsert_stub(&self, stub: &PlayerStub) -> Result<()> {
        self.players
            .entry(stub.id)
            .and_modify(|existing| {
                existing.name = stub.name.clone();
                existing.faction_id = stub.faction_id;
            })
            .or_insert_with(|| PlayerRecord {
                id: stub.id,
                name: stub.name.clone(),
                faction_id: stub.faction_id,
                battle_score: 0.0,
                score_updated_at: None,
                api_key: None,
            });
        Ok(())
    }

    async fn update_profile(&self, record: &PlayerRecord) -> Result<()> {
        self.players.insert(record.id, record.clone());
        Ok(())
    }

    async fn with_api_keys(&self) -> Result<Vec<PlayerRecord>> {
        Ok(self
            .players
            .iter()
            .filter(|r| r.api_key.as_deref().is_some_and(|k| !k.is_empty()))
            .map(|r| r.clone())
            .collect())
    }
}

#[async_trait]
impl FactionRepo for MemoryStore {
    async fn all(&self) -> Result<Vec<FactionRecord>> {
        Ok(self.factions.lock().expect("factions lock").clone())
    }
}

#[async_trait]
impl EstimateRepo for MemoryStore {
    async fn append(&self, estimate: &StrengthEstimate) -> Result<()> {
        let mut log = self.estimates.lock().expect("estimates lock");
        // Idempotent on the natural key
        let duplicate = log.iter().any(|e| {
            e.subject_id == estimate.subject_id
                && e.observed_at == estimate.observed_at
                && e.source_player == estimate.source_player
        });
        if !duplicate {
            log.push(estimate.clone());
        }
        Ok(())
    }

    async fn latest_visible(
        &self,
        subject: PlayerId,
        scope: EstimateScope,
    ) -> Result<Option<StrengthEstimate>> {
        let log = self.estimates.lock().expect("estimates lock");
        Ok(log
            .iter()
            .filter(|e| e.subject_id == subject && e.visible_to(&scope))
            .max_by_key(|e| e.observed_at)
            .cloned())
    }
}

#[async_trait]
impl MissionRepo for MemoryStore {
    async fn get(&self, faction: FactionId, mission: MissionId) -> Result<Option<Mission>> {
        Ok(self.missions.get(&(faction, mission)).map(|m| m.clone()))
    }

    async fn upsert(&self, mission: &Mission) -> Result<()> {
        self.missions
            .insert((mission.faction_id, mission.mission_id), mission.clone());
        Ok(())
    }
}
