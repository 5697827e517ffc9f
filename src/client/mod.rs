//! Game API client
//!
//! Read-only contracts over the vendor HTTP API: combat-event batches,
//! mission snapshots, and player profiles. The trait seam keeps the
//! pipelines testable without the network.

pub mod credentials;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::ApiConfig;
use crate::domain::{
    AttackResult, CombatEvent, MissionParticipant, MissionSnapshot, PlayerId, PlayerRecord,
};
use crate::error::{Result, WardenError};

pub use credentials::pick_credential;

/// External game API, one method per consumed contract.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameApi: Send + Sync {
    /// Combat events for the key owner's faction, `since` inclusive,
    /// ordered by `timestamp_ended` ascending.
    async fn faction_attacks(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<CombatEvent>>;

    /// Combat events involving the key owner personally, `since` inclusive.
    async fn player_attacks(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<CombatEvent>>;

    /// Current mission snapshots for the key owner's faction.
    async fn faction_missions(&self, key: &str) -> Result<Vec<MissionSnapshot>>;

    /// Full profile of one player, including battle stats when the key
    /// may see them.
    async fn player_profile(&self, key: &str, player_id: PlayerId) -> Result<PlayerRecord>;
}

/// Reqwest-backed implementation.
pub struct HttpGameApi {
    client: Client,
    base_url: String,
}

impl HttpGameApi {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<serde_json::Value> {
        let url = format!("{}/{}", self.base_url, path);
        debug!(%url, "game api request");

        let body: serde_json::Value = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        // The vendor reports application errors inside a 200 response
        if let Some(err) = body.get("error") {
            let raw: RawApiError = serde_json::from_value(err.clone())?;
            return Err(WardenError::Api {
                code: raw.code,
                message: raw.error,
            });
        }

        Ok(body)
    }

    fn attacks_from(body: serde_json::Value) -> Result<Vec<CombatEvent>> {
        let raw: RawAttacksResponse = serde_json::from_value(body)?;
        let mut events: Vec<CombatEvent> = raw
            .attacks
            .into_values()
            .map(CombatEvent::from)
            .collect();
        events.sort_by_key(|ev| ev.timestamp_ended);
        Ok(events)
    }
}

#[async_trait]
impl GameApi for HttpGameApi {
    async fn faction_attacks(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<CombatEvent>> {
        let body = self
            .get_json(
                "faction",
                &[
                    ("selections", "basic,attacks".to_string()),
                    ("from", since.timestamp().to_string()),
                    ("key", key.to_string()),
                ],
            )
            .await?;
        Self::attacks_from(body)
    }

    async fn player_attacks(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<CombatEvent>> {
        let body = self
            .get_json(
                "user",
                &[
                    ("selections", "basic,attacks".to_string()),
                    ("from", since.timestamp().to_string()),
                    ("key", key.to_string()),
                ],
            )
            .await?;
        Self::attacks_from(body)
    }

    async fn faction_missions(&self, key: &str) -> Result<Vec<MissionSnapshot>> {
        let body = self
            .get_json(
                "faction",
                &[
                    ("selections", "basic,crimes".to_string()),
                    ("key", key.to_string()),
                ],
            )
            .await?;
        let raw: RawMissionsResponse = serde_json::from_value(body)?;
        Ok(raw
            .crimes
            .into_iter()
            .filter_map(|(id, m)| id.parse::<u64>().ok().map(|id| m.into_snapshot(id)))
            .collect())
    }

    async fn player_profile(&self, key: &str, player_id: PlayerId) -> Result<PlayerRecord> {
        let body = self
            .get_json(
                &format!("user/{player_id}"),
                &[
                    ("selections", "profile,battlestats".to_string()),
                    ("key", key.to_string()),
                ],
            )
            .await?;
        let raw: RawProfile = serde_json::from_value(body)?;
        Ok(raw.into_record())
    }
}

#[derive(Debug, Deserialize)]
struct RawApiError {
    code: u16,
    error: String,
}

#[derive(Debug, Deserialize)]
struct RawAttacksResponse {
    #[serde(default)]
    attacks: HashMap<String, RawAttack>,
}

#[derive(Debug, Deserialize)]
struct RawAttack {
    code: String,
    #[serde(default, deserialize_with = "de_lenient_id")]
    attacker_id: Option<u64>,
    #[serde(default)]
    attacker_name: Option<String>,
    #[serde(default)]
    attacker_faction: u64,
    #[serde(default)]
    attacker_factionname: Option<String>,
    defender_id: u64,
    defender_name: String,
    #[serde(default)]
    defender_faction: u64,
    result: String,
    #[serde(default)]
    respect: f64,
    timestamp_ended: i64,
    modifiers: RawModifiers,
    #[serde(default)]
    chain: u32,
}

#[derive(Debug, Deserialize)]
struct RawModifiers {
    #[serde(default = "one")]
    fair_fight: f64,
    #[serde(default = "one")]
    war: f64,
    #[serde(default = "one")]
    overseas: f64,
}

fn one() -> f64 {
    1.0
}

/// Stealthed attackers arrive as `0` or `""` depending on the endpoint.
fn de_lenient_id<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_u64().filter(|id| *id != 0),
        serde_json::Value::String(s) => s.parse::<u64>().ok().filter(|id| *id != 0),
        _ => None,
    })
}

impl From<RawAttack> for CombatEvent {
    fn from(raw: RawAttack) -> Self {
        CombatEvent {
            log_code: raw.code,
            attacker_id: raw.attacker_id,
            attacker_name: raw.attacker_name,
            attacker_faction: (raw.attacker_faction != 0).then_some(raw.attacker_faction),
            attacker_faction_name: raw.attacker_factionname,
            defender_id: raw.defender_id,
            defender_name: raw.defender_name,
            defender_faction: (raw.defender_faction != 0).then_some(raw.defender_faction),
            result: AttackResult::from(raw.result.as_str()),
            respect_gain: raw.respect,
            timestamp_ended: Utc
                .timestamp_opt(raw.timestamp_ended, 0)
                .single()
                .unwrap_or_else(Utc::now),
            fair_fight: raw.modifiers.fair_fight,
            overseas: raw.modifiers.overseas > 1.0,
            war: raw.modifiers.war > 1.0,
            chain: raw.chain,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMissionsResponse {
    #[serde(default)]
    crimes: HashMap<String, RawMission>,
}

#[derive(Debug, Deserialize)]
struct RawMission {
    crime_id: u16,
    /// List of single-entry maps: participant id -> availability
    #[serde(default)]
    participants: Vec<HashMap<String, RawParticipantState>>,
    #[serde(default)]
    time_started: i64,
    #[serde(default)]
    time_ready: i64,
    #[serde(default)]
    time_completed: i64,
    #[serde(default)]
    initiated_by: u64,
    #[serde(default)]
    money_gain: i64,
    #[serde(default)]
    respect_gain: f64,
}

#[derive(Debug, Deserialize)]
struct RawParticipantState {
    #[serde(default)]
    color: String,
    #[serde(default)]
    description: String,
}

fn mission_kind(crime_id: u16) -> String {
    match crime_id {
        1 => "Blackmail".to_string(),
        2 => "Kidnapping".to_string(),
        3 => "Bomb Threat".to_string(),
        4 => "Planned Robbery".to_string(),
        5 => "Money Train Robbery".to_string(),
        6 => "Cruise Liner Takeover".to_string(),
        7 => "Plane Hijacking".to_string(),
        8 => "Political Assassination".to_string(),
        other => format!("Operation #{other}"),
    }
}

fn ts_or_none(ts: i64) -> Option<DateTime<Utc>> {
    (ts != 0).then(|| Utc.timestamp_opt(ts, 0).single()).flatten()
}

impl RawMission {
    fn into_snapshot(self, mission_id: u64) -> MissionSnapshot {
        let participants = self
            .participants
            .into_iter()
            .filter_map(|entry| {
                let (id, state) = entry.into_iter().next()?;
                let player_id = id.parse::<u64>().ok()?;
                Some(MissionParticipant {
                    player_id,
                    is_ready: state.color == "green",
                    status: state.description,
                })
            })
            .collect();

        MissionSnapshot {
            mission_id,
            kind: mission_kind(self.crime_id),
            participants,
            time_started: ts_or_none(self.time_started),
            time_ready: ts_or_none(self.time_ready),
            time_completed: ts_or_none(self.time_completed),
            initiated_by: (self.initiated_by != 0).then_some(self.initiated_by),
            money_gain: self.money_gain,
            respect_gain: self.respect_gain,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawProfile {
    player_id: u64,
    name: String,
    #[serde(default)]
    faction: RawProfileFaction,
    #[serde(default)]
    strength: f64,
    #[serde(default)]
    defense: f64,
    #[serde(default)]
    speed: f64,
    #[serde(default)]
    dexterity: f64,
}

#[derive(Debug, Deserialize, Default)]
struct RawProfileFaction {
    #[serde(default)]
    faction_id: u64,
}

impl RawProfile {
    fn into_record(self) -> PlayerRecord {
        let score = self.strength.sqrt() + self.defense.sqrt() + self.speed.sqrt() + self.dexterity.sqrt();
        let stats_visible = score > 0.0;

        PlayerRecord {
            id: self.player_id,
            name: self.name,
            faction_id: (self.faction.faction_id != 0).then_some(self.faction.faction_id),
            battle_score: score,
            score_updated_at: stats_visible.then(Utc::now),
            api_key: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn raw_attack_maps_stealth_and_factionless_sides() {
        let raw: RawAttack = serde_json::from_value(json!({
            "code": "a1b2",
            "attacker_id": "",
            "attacker_faction": 0,
            "defender_id": 5,
            "defender_name": "victim",
            "defender_faction": 77,
            "result": "Mugged",
            "respect": 1.5,
            "timestamp_ended": 1_700_000_000,
            "modifiers": {"fair_fight": 2.5, "war": 1.0, "overseas": 1.25},
            "chain": 120
        }))
        .unwrap();

        let ev = CombatEvent::from(raw);
        assert!(ev.attacker_id.is_none());
        assert!(ev.attacker_faction.is_none());
        assert_eq!(ev.defender_faction, Some(77));
        assert_eq!(ev.result, AttackResult::Mugged);
        assert!(ev.overseas);
        assert!(!ev.war);
        assert_eq!(ev.chain, 120);
    }

    #[test]
    fn mission_snapshot_maps_participants_and_zero_timestamps() {
        let raw: RawMission = serde_json::from_value(json!({
            "crime_id": 4,
            "participants": [
                {"11": {"color": "green", "description": "Okay"}},
                {"12": {"color": "red", "description": "In hospital"}}
            ],
            "time_started": 1_700_000_000,
            "time_ready": 1_700_090_000,
            "time_completed": 0,
            "initiated_by": 0,
            "money_gain": 0,
            "respect_gain": 0.0
        }))
        .unwrap();

        let snap = raw.into_snapshot(42);
        assert_eq!(snap.mission_id, 42);
        assert_eq!(snap.kind, "Planned Robbery");
        assert_eq!(snap.participants.len(), 2);
        assert!(snap.participants[0].is_ready);
        assert!(!snap.participants[1].is_ready);
        assert!(snap.time_completed.is_none());
        assert!(snap.initiated_by.is_none());
    }

    #[test]
    fn profile_computes_composite_score() {
        let raw: RawProfile = serde_json::from_value(json!({
            "player_id": 9,
            "name": "scout",
            "faction": {"faction_id": 3},
            "strength": 100.0,
            "defense": 400.0,
            "speed": 900.0,
            "dexterity": 1600.0
        }))
        .unwrap();

        let rec = raw.into_record();
        // sqrt sums: 10 + 20 + 30 + 40
        assert_eq!(rec.battle_score, 100.0);
        assert_eq!(rec.faction_id, Some(3));
        assert!(rec.score_updated_at.is_some());
    }

    #[test]
    fn hidden_stats_leave_score_unknown() {
        let raw: RawProfile = serde_json::from_value(json!({
            "player_id": 9,
            "name": "scout"
        }))
        .unwrap();

        let rec = raw.into_record();
        assert_eq!(rec.battle_score, 0.0);
        assert!(rec.score_updated_at.is_none());
    }
}
