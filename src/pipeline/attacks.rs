//! Attack polling cycles
//!
//! One cycle per entity: advisory lock, credential pick, cursor gate,
//! batch fetch, then the retaliation and stat passes run concurrently
//! over the immutable batch. The watermark advances only after both
//! passes complete, so an abandoned cycle is safely re-polled.

use chrono::Utc;
use tracing::{debug, error, info};

use crate::domain::{FactionRecord, PlayerRecord, PollEntity};
use crate::error::Result;
use crate::persistence::{open_window, FetchWindow};

use super::classifier::IngestSubject;
use super::stats::StatIngest;
use super::{acquire_or_bail, retaliation, PollContext};

const FACTION_JOB_KEY: &str = "fetch-attacks";
const USER_JOB_KEY: &str = "fetch-attacks-user";

/// Poll combat events for every registered faction.
pub async fn run_faction_attacks(ctx: &PollContext) -> Result<()> {
    acquire_or_bail(ctx, FACTION_JOB_KEY)?;

    for faction in ctx.factions.all().await? {
        if let Err(e) = poll_one_faction(ctx, &faction).await {
            // One entity's failure never blocks the others; the scheduler
            // re-polls it at the next tick
            error!(faction = faction.id, error = %e, "faction attack cycle failed");
        }
    }

    Ok(())
}

/// Poll combat events for every player with a registered API key.
pub async fn run_user_attacks(ctx: &PollContext) -> Result<()> {
    acquire_or_bail(ctx, USER_JOB_KEY)?;

    for player in ctx.players.with_api_keys().await? {
        if let Err(e) = poll_one_player(ctx, &player).await {
            error!(player = player.id, error = %e, "user attack cycle failed");
        }
    }

    Ok(())
}

async fn poll_one_faction(ctx: &PollContext, faction: &FactionRecord) -> Result<()> {
    let Some(key) = crate::client::pick_credential(&faction.api_keys) else {
        debug!(faction = faction.id, "no usable credential, skipping");
        return Ok(());
    };

    let entity = PollEntity::Faction(faction.id);
    let now = Utc::now();
    let since = match open_window(ctx.cursors.as_ref(), &entity, now).await? {
        FetchWindow::Skip => return Ok(()),
        FetchWindow::Since(since) => since,
    };
    let watermark = since - chrono::Duration::seconds(1);

    // Batch fetch failure aborts this entity's cycle and is surfaced
    let events = ctx.api.faction_attacks(key, since).await?;
    if events.is_empty() {
        return Ok(());
    }

    let ingest = StatIngest {
        api: ctx.api.clone(),
        players: ctx.players.clone(),
        estimates: ctx.estimates.clone(),
    };

    let retal_pass = retaliation::process(
        faction,
        ctx.players.as_ref(),
        ctx.estimates.as_ref(),
        ctx.notifier.as_ref(),
        &events,
        watermark,
        now,
    );
    let stat_pass = async {
        if faction.stats_db_enabled {
            ingest
                .process(
                    IngestSubject::Faction(faction.id),
                    faction.stats_db_global,
                    key,
                    &events,
                    watermark,
                    now,
                )
                .await
        } else {
            Ok(())
        }
    };

    // Both passes complete or the cycle is abandoned wholesale
    tokio::try_join!(retal_pass, stat_pass)?;

    // Advance to the latest event seen, not to now: events landing between
    // this advance and the next tick must still be fetched
    let latest = events
        .iter()
        .map(|ev| ev.timestamp_ended)
        .max()
        .unwrap_or(watermark);
    ctx.cursors.advance(&entity, latest).await?;

    info!(
        faction = faction.id,
        events = events.len(),
        new_watermark = %latest,
        "faction attack cycle complete"
    );
    Ok(())
}

async fn poll_one_player(ctx: &PollContext, player: &PlayerRecord) -> Result<()> {
    let Some(key) = player.api_key.as_deref().filter(|k| !k.is_empty()) else {
        return Ok(());
    };

    let entity = PollEntity::Player(player.id);
    let now = Utc::now();
    let since = match open_window(ctx.cursors.as_ref(), &entity, now).await? {
        FetchWindow::Skip => return Ok(()),
        FetchWindow::Since(since) => since,
    };
    let watermark = since - chrono::Duration::seconds(1);

    let events = ctx.api.player_attacks(key, since).await?;
    if events.is_empty() {
        return Ok(());
    }

    let ingest = StatIngest {
        api: ctx.api.clone(),
        players: ctx.players.clone(),
        estimates: ctx.estimates.clone(),
    };

    // User-contributed estimates stay scoped to the contributor's faction
    ingest
        .process(
            IngestSubject::Player(player.id),
            false,
            key,
            &events,
            watermark,
            now,
        )
        .await?;

    let latest = events
        .iter()
        .map(|ev| ev.timestamp_ended)
        .max()
        .unwrap_or(watermark);
    ctx.cursors.advance(&entity, latest).await?;

    debug!(
        player = player.id,
        events = events.len(),
        new_watermark = %latest,
        "user attack cycle complete"
    );
    Ok(())
}
