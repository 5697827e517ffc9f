//! End-to-end pipeline tests over the in-memory stores and a stub API.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::{Arc, Mutex};

use warden::client::GameApi;
use warden::domain::{
    AttackResult, CombatEvent, FactionRecord, MissionParticipant, MissionSnapshot, NotifyTargets,
    PlayerRecord, PollEntity,
};
use warden::error::{Result, WardenError};
use warden::notify::{Notification, Notifier};
use warden::persistence::{CursorStore, MemoryCursorStore, MemoryStore, PollLock};
use warden::pipeline::{attacks, missions, PollContext};

struct StubApi {
    attacks: Mutex<Vec<CombatEvent>>,
    missions: Mutex<Vec<MissionSnapshot>>,
}

impl StubApi {
    fn new() -> Self {
        Self {
            attacks: Mutex::new(Vec::new()),
            missions: Mutex::new(Vec::new()),
        }
    }

    fn set_attacks(&self, events: Vec<CombatEvent>) {
        *self.attacks.lock().unwrap() = events;
    }

    fn set_missions(&self, snapshots: Vec<MissionSnapshot>) {
        *self.missions.lock().unwrap() = snapshots;
    }
}

#[async_trait]
impl GameApi for StubApi {
    async fn faction_attacks(&self, _key: &str, since: DateTime<Utc>) -> Result<Vec<CombatEvent>> {
        Ok(self
            .attacks
            .lock()
            .unwrap()
            .iter()
            .filter(|ev| ev.timestamp_ended >= since)
            .cloned()
            .collect())
    }

    async fn player_attacks(&self, key: &str, since: DateTime<Utc>) -> Result<Vec<CombatEvent>> {
        self.faction_attacks(key, since).await
    }

    async fn faction_missions(&self, _key: &str) -> Result<Vec<MissionSnapshot>> {
        Ok(self.missions.lock().unwrap().clone())
    }

    async fn player_profile(&self, _key: &str, _player_id: u64) -> Result<PlayerRecord> {
        Err(WardenError::Api {
            code: 6,
            message: "incorrect ID".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<(u64, Notification)>>,
    dms: Mutex<Vec<(u64, Notification)>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<(u64, Notification)> {
        self.sent.lock().unwrap().clone()
    }

    fn dms(&self) -> Vec<(u64, Notification)> {
        self.dms.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, channel: u64, note: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push((channel, note.clone()));
        Ok(())
    }

    async fn direct_message(&self, player: u64, note: &Notification) -> Result<()> {
        self.dms.lock().unwrap().push((player, note.clone()));
        Ok(())
    }
}

struct Harness {
    api: Arc<StubApi>,
    store: Arc<MemoryStore>,
    cursors: Arc<MemoryCursorStore>,
    notifier: Arc<RecordingNotifier>,
}

impl Harness {
    fn new() -> Self {
        Self {
            api: Arc::new(StubApi::new()),
            store: Arc::new(MemoryStore::new()),
            cursors: Arc::new(MemoryCursorStore::new()),
            notifier: Arc::new(RecordingNotifier::default()),
        }
    }

    /// Fresh context per run; the lock is per-context, mirroring one
    /// scheduler process per invocation.
    fn ctx(&self) -> PollContext {
        PollContext {
            api: self.api.clone(),
            players: self.store.clone(),
            factions: self.store.clone(),
            estimates: self.store.clone(),
            missions: self.store.clone(),
            cursors: self.cursors.clone(),
            notifier: self.notifier.clone(),
            lock: Arc::new(PollLock::new()),
            lock_ttl: std::time::Duration::from_secs(30),
        }
    }
}

const FACTION: u64 = 9;
const VICTIM: u64 = 60;
const AGGRESSOR: u64 = 50;

fn faction(notify: NotifyTargets) -> FactionRecord {
    FactionRecord {
        id: FACTION,
        name: "Homeland".to_string(),
        api_keys: vec!["key-a".to_string()],
        notify,
        stats_db_enabled: true,
        stats_db_global: true,
    }
}

fn victim_record() -> PlayerRecord {
    PlayerRecord {
        id: VICTIM,
        name: "homie".to_string(),
        faction_id: Some(FACTION),
        battle_score: 100.0,
        score_updated_at: Some(Utc::now()),
        api_key: None,
    }
}

fn defensive_loss(ended: DateTime<Utc>) -> CombatEvent {
    CombatEvent {
        log_code: "abc123".to_string(),
        attacker_id: Some(AGGRESSOR),
        attacker_name: Some("raider".to_string()),
        attacker_faction: Some(7),
        attacker_faction_name: Some("Raiders".to_string()),
        defender_id: VICTIM,
        defender_name: "homie".to_string(),
        defender_faction: Some(FACTION),
        result: AttackResult::Hospitalized,
        respect_gain: 2.4,
        timestamp_ended: ended,
        fair_fight: 3.0,
        overseas: false,
        war: false,
        chain: 0,
    }
}

fn snapshot(ready: &[bool], time_ready_offset_secs: i64) -> MissionSnapshot {
    MissionSnapshot {
        mission_id: 100,
        kind: "Planned Robbery".to_string(),
        participants: ready
            .iter()
            .enumerate()
            .map(|(i, r)| MissionParticipant {
                player_id: i as u64 + 1,
                is_ready: *r,
                status: if *r { "Okay" } else { "Traveling" }.to_string(),
            })
            .collect(),
        time_started: Some(Utc::now() - Duration::hours(20)),
        time_ready: Some(Utc::now() + Duration::seconds(time_ready_offset_secs)),
        time_completed: None,
        initiated_by: None,
        money_gain: 0,
        respect_gain: 0.0,
    }
}

#[tokio::test]
async fn first_poll_bootstraps_without_fetching() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        retaliation: Some(111),
        ..Default::default()
    }));
    h.api.set_attacks(vec![defensive_loss(Utc::now())]);

    attacks::run_faction_attacks(&h.ctx()).await.unwrap();

    assert!(h.notifier.sent().is_empty());
    assert!(h.store.estimates().is_empty());
    // Watermark now exists, so the next cycle fetches incrementally
    let wm = h
        .cursors
        .watermark(&PollEntity::Faction(FACTION))
        .await
        .unwrap();
    assert!(wm.is_some());
}

#[tokio::test]
async fn full_cycle_emits_alert_estimate_and_watermark() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        retaliation: Some(111),
        ..Default::default()
    }));
    h.store.insert_player(victim_record());

    let now = Utc::now();
    let entity = PollEntity::Faction(FACTION);
    h.cursors
        .advance(&entity, now - Duration::seconds(600))
        .await
        .unwrap();

    let latest = now - Duration::seconds(30);
    h.api.set_attacks(vec![
        defensive_loss(now - Duration::seconds(90)),
        defensive_loss(latest),
    ]);

    attacks::run_faction_attacks(&h.ctx()).await.unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent
        .iter()
        .all(|(channel, note)| *channel == 111 && matches!(note, Notification::Retaliation(_))));

    // Two events, two estimates of the aggressor, all globally visible
    let estimates = h.store.estimates();
    assert_eq!(estimates.len(), 2);
    assert!(estimates
        .iter()
        .all(|e| e.subject_id == AGGRESSOR && e.global_visible));

    assert_eq!(h.cursors.watermark(&entity).await.unwrap(), Some(latest));
}

#[tokio::test]
async fn redelivered_batch_produces_nothing_new() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        retaliation: Some(111),
        ..Default::default()
    }));
    h.store.insert_player(victim_record());

    let now = Utc::now();
    let entity = PollEntity::Faction(FACTION);
    h.cursors
        .advance(&entity, now - Duration::seconds(600))
        .await
        .unwrap();
    h.api
        .set_attacks(vec![defensive_loss(now - Duration::seconds(30))]);

    attacks::run_faction_attacks(&h.ctx()).await.unwrap();
    attacks::run_faction_attacks(&h.ctx()).await.unwrap();

    assert_eq!(h.notifier.sent().len(), 1);
    assert_eq!(h.store.estimates().len(), 1);
}

#[tokio::test]
async fn lost_attack_is_invisible_to_both_passes() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        retaliation: Some(111),
        ..Default::default()
    }));
    h.store.insert_player(victim_record());

    let now = Utc::now();
    h.cursors
        .advance(&PollEntity::Faction(FACTION), now - Duration::seconds(600))
        .await
        .unwrap();

    let mut ev = defensive_loss(now - Duration::seconds(30));
    ev.result = AttackResult::Lost;
    h.api.set_attacks(vec![ev]);

    attacks::run_faction_attacks(&h.ctx()).await.unwrap();

    assert!(h.notifier.sent().is_empty());
    assert!(h.store.estimates().is_empty());
}

#[tokio::test]
async fn overlapping_runs_are_rejected_by_the_lock() {
    let h = Harness::new();
    let ctx = h.ctx();

    attacks::run_faction_attacks(&ctx).await.unwrap();
    let second = attacks::run_faction_attacks(&ctx).await;

    assert!(matches!(
        second,
        Err(WardenError::AlreadyRunning { ref job, .. }) if job == "fetch-attacks"
    ));
}

#[tokio::test]
async fn user_cycle_produces_faction_scoped_estimates() {
    let h = Harness::new();
    let mut keyed = victim_record();
    keyed.api_key = Some("personal-key".to_string());
    h.store.insert_player(keyed);

    let now = Utc::now();
    let entity = PollEntity::Player(VICTIM);
    h.cursors
        .advance(&entity, now - Duration::seconds(600))
        .await
        .unwrap();
    h.api
        .set_attacks(vec![defensive_loss(now - Duration::seconds(30))]);

    attacks::run_user_attacks(&h.ctx()).await.unwrap();

    let estimates = h.store.estimates();
    assert_eq!(estimates.len(), 1);
    assert!(!estimates[0].global_visible);
    assert_eq!(estimates[0].source_faction, Some(FACTION));
    assert!(h.cursors.watermark(&entity).await.unwrap().is_some());
}

#[tokio::test]
async fn delayed_mission_is_announced_once_with_nudges() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        mission_delay: Some(222),
        ..Default::default()
    }));
    h.store.insert_player(PlayerRecord {
        id: 2,
        name: "slacker".to_string(),
        faction_id: Some(FACTION),
        battle_score: 0.0,
        score_updated_at: None,
        api_key: None,
    });
    // Deadline passed, participant 2 unavailable; participant 1 unresolved
    h.api.set_missions(vec![snapshot(&[false, true], -60)]);

    missions::run_missions(&h.ctx()).await.unwrap();
    missions::run_missions(&h.ctx()).await.unwrap();

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    match &sent[0].1 {
        Notification::MissionDelayed {
            ready_count,
            total,
            delayers,
            ..
        } => {
            assert_eq!((*ready_count, *total), (1, 2));
            assert_eq!(delayers.len(), 1);
            assert_eq!(delayers[0].player_id, 1);
            // Participant 1 has no player record
            assert!(delayers[0].name.is_none());
        }
        other => panic!("unexpected notification: {other:?}"),
    }

    let dms = h.dms_for_mission();
    assert_eq!(dms, vec![1]);

    let tracked = h.store.mission(FACTION, 100).unwrap();
    assert_eq!(tracked.delayers, vec![1]);
    assert!(!tracked.notified_ready);
}

impl Harness {
    fn dms_for_mission(&self) -> Vec<u64> {
        self.notifier
            .dms()
            .into_iter()
            .filter(|(_, note)| matches!(note, Notification::DelayerNudge { .. }))
            .map(|(player, _)| player)
            .collect()
    }
}

#[tokio::test]
async fn recovered_mission_announces_ready_once() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        mission_delay: Some(222),
        mission_ready: Some(333),
        ..Default::default()
    }));

    h.api.set_missions(vec![snapshot(&[false, true], -60)]);
    missions::run_missions(&h.ctx()).await.unwrap();

    h.api.set_missions(vec![snapshot(&[true, true], -60)]);
    missions::run_missions(&h.ctx()).await.unwrap();
    missions::run_missions(&h.ctx()).await.unwrap();

    let ready: Vec<_> = h
        .notifier
        .sent()
        .into_iter()
        .filter(|(channel, note)| {
            *channel == 333 && matches!(note, Notification::MissionReady { .. })
        })
        .collect();
    assert_eq!(ready.len(), 1);
    assert!(h.store.mission(FACTION, 100).unwrap().notified_ready);
}

#[tokio::test]
async fn delay_without_a_delay_channel_leaves_the_tracker_alone() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        mission_ready: Some(333),
        ..Default::default()
    }));

    h.api.set_missions(vec![snapshot(&[true, true], -60)]);
    missions::run_missions(&h.ctx()).await.unwrap();

    // A delay sighting must not touch delayers or notified_ready when no
    // delay channel is configured
    h.api.set_missions(vec![snapshot(&[false, true], -60)]);
    missions::run_missions(&h.ctx()).await.unwrap();

    let tracked = h.store.mission(FACTION, 100).unwrap();
    assert!(tracked.delayers.is_empty());
    assert!(tracked.notified_ready);
    assert!(h.notifier.dms().is_empty());

    // Recovery therefore does not re-announce readiness
    h.api.set_missions(vec![snapshot(&[true, true], -60)]);
    missions::run_missions(&h.ctx()).await.unwrap();

    let ready: Vec<_> = h
        .notifier
        .sent()
        .into_iter()
        .filter(|(_, note)| matches!(note, Notification::MissionReady { .. }))
        .collect();
    assert_eq!(ready.len(), 1);
}

#[tokio::test]
async fn missions_are_tracked_for_factions_without_channels() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets::default()));

    let mut snap = snapshot(&[true, true], -3_600);
    snap.time_completed = Some(Utc::now() - Duration::seconds(60));
    snap.money_gain = 500_000;
    h.api.set_missions(vec![snap]);

    missions::run_missions(&h.ctx()).await.unwrap();

    assert!(h.notifier.sent().is_empty());
    let tracked = h.store.mission(FACTION, 100).unwrap();
    assert!(tracked.time_completed.is_some());
    assert_eq!(tracked.money_gain, 500_000);
}

#[tokio::test]
async fn planned_mission_stays_silent() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        mission_delay: Some(222),
        mission_ready: Some(333),
        ..Default::default()
    }));
    // Deadline 30 minutes out, nobody ready yet
    h.api.set_missions(vec![snapshot(&[false, false], 1_800)]);

    missions::run_missions(&h.ctx()).await.unwrap();

    assert!(h.notifier.sent().is_empty());
    assert!(h.store.mission(FACTION, 100).is_some());
}

#[tokio::test]
async fn fresh_completion_is_announced_exactly_once() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        mission_completed: Some(444),
        ..Default::default()
    }));

    let mut snap = snapshot(&[true, true], -3_600);
    snap.time_completed = Some(Utc::now() - Duration::seconds(60));
    snap.money_gain = 1_000_000;
    snap.initiated_by = Some(2);
    h.api.set_missions(vec![snap]);

    missions::run_missions(&h.ctx()).await.unwrap();
    missions::run_missions(&h.ctx()).await.unwrap();

    let completed: Vec<_> = h
        .notifier
        .sent()
        .into_iter()
        .filter(|(_, note)| matches!(note, Notification::MissionCompleted { .. }))
        .collect();
    assert_eq!(completed.len(), 1);
    match &completed[0].1 {
        Notification::MissionCompleted { succeeded, .. } => assert!(*succeeded),
        _ => unreachable!(),
    }
    assert!(h.store.mission(FACTION, 100).unwrap().notified_completed);
}

#[tokio::test]
async fn old_completion_is_tracked_silently() {
    let h = Harness::new();
    h.store.insert_faction(faction(NotifyTargets {
        mission_completed: Some(444),
        ..Default::default()
    }));

    let mut snap = snapshot(&[true, true], -3_600);
    snap.time_completed = Some(Utc::now() - Duration::seconds(600));
    h.api.set_missions(vec![snap]);

    missions::run_missions(&h.ctx()).await.unwrap();

    assert!(h.notifier.sent().is_empty());
    let tracked = h.store.mission(FACTION, 100).unwrap();
    assert!(tracked.time_completed.is_some());
    assert!(!tracked.notified_completed);
}
