use clap::{Parser, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tokio::signal;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use warden::client::HttpGameApi;
use warden::config::AppConfig;
use warden::error::{Result, WardenError};
use warden::notify::WebhookNotifier;
use warden::persistence::{PgCursorStore, PgStore, PollLock};
use warden::pipeline::{attacks, missions, PollContext};

#[derive(Parser)]
#[command(name = "warden", about = "Combat-event ingestion and inference service")]
struct Cli {
    /// Directory containing default.toml and environment overlays
    #[arg(long, default_value = "config", env = "WARDEN_CONFIG_DIR")]
    config_dir: String,

    /// Run each selected job once and exit instead of scheduling
    #[arg(long)]
    once: bool,

    /// Restrict the scheduler to a single job
    #[arg(long, value_enum)]
    job: Option<Job>,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Job {
    Attacks,
    UserAttacks,
    Missions,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load_from(&cli.config_dir)?;
    init_logging(&config);

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!("config: {e}");
        }
        return Err(WardenError::InvalidState(format!(
            "{} configuration error(s)",
            errors.len()
        )));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .connect(&config.database.url)
        .await?;
    PgStore::ensure_schema(&pool).await?;
    PgCursorStore::ensure_schema(&pool).await?;

    let store = Arc::new(PgStore::new(pool.clone()));
    let ctx = Arc::new(PollContext {
        api: Arc::new(HttpGameApi::new(&config.api)?),
        players: store.clone(),
        factions: store.clone(),
        estimates: store.clone(),
        missions: store,
        cursors: Arc::new(PgCursorStore::new(pool)),
        notifier: Arc::new(WebhookNotifier::new(&config.notify)),
        lock: Arc::new(PollLock::new()),
        lock_ttl: Duration::from_secs(config.polling.lock_ttl_secs),
    });

    let wants = |job: Job| cli.job.map_or(true, |selected| selected == job);

    if cli.once {
        if wants(Job::Attacks) {
            report("fetch-attacks", attacks::run_faction_attacks(&ctx).await);
        }
        if wants(Job::UserAttacks) {
            report("fetch-attacks-user", attacks::run_user_attacks(&ctx).await);
        }
        if wants(Job::Missions) {
            report("refresh-missions", missions::run_missions(&ctx).await);
        }
        return Ok(());
    }

    info!("warden starting");

    let mut tasks = Vec::new();
    if wants(Job::Attacks) {
        let ctx = ctx.clone();
        let period = Duration::from_secs(config.polling.attack_interval_secs);
        tasks.push(tokio::spawn(async move {
            run_on_interval("fetch-attacks", period, move || {
                let ctx = ctx.clone();
                async move { attacks::run_faction_attacks(&ctx).await }
            })
            .await;
        }));
    }
    if wants(Job::UserAttacks) {
        let ctx = ctx.clone();
        let period = Duration::from_secs(config.polling.user_attack_interval_secs);
        tasks.push(tokio::spawn(async move {
            run_on_interval("fetch-attacks-user", period, move || {
                let ctx = ctx.clone();
                async move { attacks::run_user_attacks(&ctx).await }
            })
            .await;
        }));
    }
    if wants(Job::Missions) {
        let ctx = ctx.clone();
        let period = Duration::from_secs(config.polling.mission_interval_secs);
        tasks.push(tokio::spawn(async move {
            run_on_interval("refresh-missions", period, move || {
                let ctx = ctx.clone();
                async move { missions::run_missions(&ctx).await }
            })
            .await;
        }));
    }

    shutdown_signal().await;
    info!("shutdown signal received");
    for task in tasks {
        task.abort();
    }

    Ok(())
}

async fn run_on_interval<F, Fut>(job: &str, period: Duration, mut run: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<()>>,
{
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        report(job, run().await);
    }
}

fn report(job: &str, outcome: Result<()>) {
    match outcome {
        Ok(()) => {}
        // Normal under overlapping ticks
        Err(e @ WardenError::AlreadyRunning { .. }) => info!(job, "{e}"),
        Err(e) => warn!(job, error = %e, "job failed"),
    }
}

fn init_logging(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{},sqlx=warn", config.logging.level))
    });

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
