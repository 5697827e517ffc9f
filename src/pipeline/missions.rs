//! Mission lifecycle tracking
//!
//! Each refresh reconciles the API's mission snapshots against the
//! tracked records and emits at most one notification per lifecycle
//! edge: delay, readiness, completion. The tracker owns the `delayers`
//! list and the `notified_*` flags; everything else is snapshot-owned.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, warn};

use crate::domain::{FactionRecord, Mission, MissionSnapshot};
use crate::error::Result;
use crate::notify::{DelayerLine, Notification};

use super::{acquire_or_bail, PollContext};

const MISSION_JOB_KEY: &str = "refresh-missions";

/// Completion notifications are suppressed once the completion is older
/// than this, so a long outage does not replay stale announcements.
pub const COMPLETED_NOTIFY_WINDOW_SECS: i64 = 299;

/// Refresh missions for every registered faction.
pub async fn run_missions(ctx: &PollContext) -> Result<()> {
    acquire_or_bail(ctx, MISSION_JOB_KEY)?;

    for faction in ctx.factions.all().await? {
        if let Err(e) = refresh_one_faction(ctx, &faction).await {
            error!(faction = faction.id, error = %e, "mission refresh failed");
        }
    }

    Ok(())
}

// Mission state is tracked for every faction; the channel configuration
// only gates what gets announced.
async fn refresh_one_faction(ctx: &PollContext, faction: &FactionRecord) -> Result<()> {
    let Some(key) = crate::client::pick_credential(&faction.api_keys) else {
        debug!(faction = faction.id, "no usable credential, skipping missions");
        return Ok(());
    };

    let snapshots = ctx.api.faction_missions(key).await?;
    let now = Utc::now();

    for snap in &snapshots {
        if let Err(e) = process_mission(ctx, faction, snap, now).await {
            error!(
                faction = faction.id,
                mission = snap.mission_id,
                error = %e,
                "mission processing failed"
            );
        }
    }

    Ok(())
}

/// Reconcile one snapshot against the tracked record and emit whatever
/// notifications the transition warrants.
pub async fn process_mission(
    ctx: &PollContext,
    faction: &FactionRecord,
    snap: &MissionSnapshot,
    now: DateTime<Utc>,
) -> Result<()> {
    let mut mission = match ctx.missions.get(faction.id, snap.mission_id).await? {
        Some(mut existing) => {
            existing.apply_snapshot(snap);
            existing
        }
        None => Mission::from_snapshot(faction.id, snap),
    };

    if let Some(completed_at) = mission.time_completed {
        handle_completed(ctx, faction, &mut mission, completed_at, now).await?;
        ctx.missions.upsert(&mission).await?;
        return Ok(());
    }

    // Readiness deadline still ahead; nothing to announce yet
    if matches!(mission.time_ready, Some(ready) if ready > now) {
        ctx.missions.upsert(&mission).await?;
        return Ok(());
    }

    if !mission.all_ready() {
        // Only the first sighting of a delay is announced; the delayers
        // list stays until the mission completes. Without a configured
        // delay channel the tracker state is left alone entirely.
        if faction.notify.mission_delay.is_some() && mission.delayers.is_empty() {
            handle_delayed(ctx, faction, &mut mission).await?;
        }
    } else if !mission.notified_ready {
        handle_ready(ctx, faction, &mut mission).await?;
    }

    ctx.missions.upsert(&mission).await?;
    Ok(())
}

async fn handle_completed(
    ctx: &PollContext,
    faction: &FactionRecord,
    mission: &mut Mission,
    completed_at: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<()> {
    if mission.notified_completed {
        return Ok(());
    }
    // Older completions are tracked silently
    if now - completed_at >= Duration::seconds(COMPLETED_NOTIFY_WINDOW_SECS) {
        return Ok(());
    }
    let Some(channel) = faction.notify.mission_completed else {
        return Ok(());
    };

    let initiator = match mission.initiated_by {
        Some(id) => ctx.players.get(id).await?.map(|p| p.name),
        None => None,
    };

    let note = Notification::MissionCompleted {
        faction_name: faction.name.clone(),
        kind: mission.kind.clone(),
        mission_id: mission.mission_id,
        initiator,
        succeeded: mission.succeeded(),
        money_gain: mission.money_gain,
        respect_gain: mission.respect_gain,
    };

    match ctx.notifier.send(channel, &note).await {
        Ok(()) => mission.notified_completed = true,
        Err(e) => {
            // Flag stays unset so the next refresh retries, still inside
            // the notify window
            warn!(
                faction = faction.id,
                mission = mission.mission_id,
                error = %e,
                "completed notification delivery failed"
            );
        }
    }
    Ok(())
}

async fn handle_delayed(
    ctx: &PollContext,
    faction: &FactionRecord,
    mission: &mut Mission,
) -> Result<()> {
    // Tracker state may only change once the announcement is possible
    let Some(channel) = faction.notify.mission_delay else {
        return Ok(());
    };

    // A delay invalidates any earlier readiness announcement
    mission.notified_ready = false;

    let blocked: Vec<_> = mission.not_ready().cloned().collect();
    mission.delayers = blocked.iter().map(|p| p.player_id).collect();

    let mut lines = Vec::with_capacity(blocked.len());
    for p in &blocked {
        let name = ctx.players.get(p.player_id).await?.map(|r| r.name);
        lines.push(DelayerLine {
            player_id: p.player_id,
            name,
            status: p.status.clone(),
        });
    }

    let note = Notification::MissionDelayed {
        faction_name: faction.name.clone(),
        kind: mission.kind.clone(),
        mission_id: mission.mission_id,
        ready_count: mission.ready_count(),
        total: mission.participants.len(),
        delayers: lines,
    };

    if let Err(e) = ctx.notifier.send(channel, &note).await {
        warn!(
            faction = faction.id,
            mission = mission.mission_id,
            error = %e,
            "delay notification delivery failed"
        );
    }

    let nudge = Notification::DelayerNudge {
        kind: mission.kind.clone(),
        mission_id: mission.mission_id,
    };
    for p in &blocked {
        if let Err(e) = ctx.notifier.direct_message(p.player_id, &nudge).await {
            debug!(player = p.player_id, error = %e, "delayer nudge delivery failed");
        }
    }

    Ok(())
}

async fn handle_ready(
    ctx: &PollContext,
    faction: &FactionRecord,
    mission: &mut Mission,
) -> Result<()> {
    let Some(channel) = faction.notify.mission_ready else {
        return Ok(());
    };

    let note = Notification::MissionReady {
        faction_name: faction.name.clone(),
        kind: mission.kind.clone(),
        mission_id: mission.mission_id,
    };

    match ctx.notifier.send(channel, &note).await {
        Ok(()) => mission.notified_ready = true,
        Err(e) => {
            warn!(
                faction = faction.id,
                mission = mission.mission_id,
                error = %e,
                "ready notification delivery failed"
            );
        }
    }
    Ok(())
}
