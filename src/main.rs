//! # RepoWatch
//!
//! Polls GitHub repository activity on per-monitor cron schedules and
//! posts new events to a DingTalk robot.
//!
//! Usage:
//!   repowatch serve                 # Scheduler + REST API
//!   repowatch run-once <ID>         # One cycle for one monitor, then exit
//!   repowatch config show           # Print effective config (secrets masked)

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use repowatch_channels::DingTalkSink;
use repowatch_core::config::RepoWatchConfig;
use repowatch_gateway::AppState;
use repowatch_github::GithubEventSource;
use repowatch_scheduler::{
    MonitorService, RateLimitGuard, Scheduler, SchedulerDb, TaskRunner, spawn_scheduler,
};

#[derive(Parser)]
#[command(
    name = "repowatch",
    version,
    about = "👀 RepoWatch: GitHub activity to DingTalk"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the scheduler and the HTTP API
    Serve {
        /// Override the gateway port
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Run one monitor cycle immediately and print the execution record
    RunOnce {
        /// Monitor id
        id: String,
    },
    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "repowatch=debug,repowatch_scheduler=debug,repowatch_github=debug,repowatch_channels=debug,repowatch_gateway=debug,tower_http=debug"
    } else {
        "repowatch=info,repowatch_scheduler=info,repowatch_github=info,repowatch_channels=info,repowatch_gateway=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_target(false)
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Serve { port } => {
            let mut config = config;
            if let Some(port) = port {
                config.gateway.port = port;
            }
            serve(config).await
        }
        Commands::RunOnce { id } => run_once(config, &id).await,
        Commands::Config { action } => match action {
            ConfigAction::Show => {
                println!("{}", config.masked().to_toml()?);
                Ok(())
            }
        },
    }
}

fn load_config(path: Option<&str>) -> Result<RepoWatchConfig> {
    let config = match path {
        Some(p) => {
            let path = PathBuf::from(shellexpand::tilde(p).to_string());
            let mut config = RepoWatchConfig::load_from(&path)
                .with_context(|| format!("loading {}", path.display()))?;
            config.apply_env();
            config
        }
        None => RepoWatchConfig::load()?,
    };
    Ok(config)
}

fn open_db(config: &RepoWatchConfig) -> Result<Arc<SchedulerDb>> {
    let path = config.db_path();
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let db = SchedulerDb::open(&path)?;
    tracing::info!("📦 Database: {}", path.display());
    Ok(Arc::new(db))
}

fn build_runner(config: &RepoWatchConfig, db: Arc<SchedulerDb>) -> Result<Arc<TaskRunner>> {
    let source = Arc::new(GithubEventSource::new(config.github.clone())?);
    let sink = Arc::new(DingTalkSink::new(config.notify.clone())?);
    let guard = Arc::new(RateLimitGuard::new(config.scheduler.rate_limit_reserve));

    // Every page request carries the client timeout; leave headroom for the whole walk.
    let fetch_timeout = Duration::from_secs(
        config.github.timeout_secs * u64::from(source.max_requests()) + 5,
    );
    let notify_timeout = Duration::from_secs(config.notify.timeout_secs + 5);

    let runner = TaskRunner::new(source, db, sink, guard).with_timeouts(fetch_timeout, notify_timeout);
    Ok(Arc::new(runner))
}

async fn serve(config: RepoWatchConfig) -> Result<()> {
    if config.github.token.is_empty() {
        tracing::warn!("⚠️ GITHUB_TOKEN is not set, every fetch will fail");
    }
    if config.notify.webhook_url.is_empty() {
        tracing::warn!("⚠️ DingTalk webhook URL is not set, every notification will fail");
    }

    let db = open_db(&config)?;
    let runner = build_runner(&config, db.clone())?;
    let scheduler = Arc::new(Scheduler::new(runner));
    let monitors = Arc::new(MonitorService::new(
        db,
        config.scheduler.default_event_types.clone(),
    ));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(spawn_scheduler(
        scheduler,
        config.scheduler.tick_secs,
        shutdown_rx,
    ));

    let mut gateway_shutdown = shutdown_tx.subscribe();
    let signal_tx = shutdown_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("🛑 Shutdown requested");
        }
        let _ = signal_tx.send(true);
    });

    let state = AppState::new(config.gateway.clone(), monitors);
    let served = repowatch_gateway::start(state, async move {
        let _ = gateway_shutdown.changed().await;
    })
    .await;

    // Stop the scheduler even when the listener failed to bind.
    let _ = shutdown_tx.send(true);
    scheduler_task.await.context("scheduler task failed")?;
    tracing::info!("👋 RepoWatch stopped");
    served
}

async fn run_once(config: RepoWatchConfig, id: &str) -> Result<()> {
    let db = open_db(&config)?;
    let monitors = MonitorService::new(db.clone(), config.scheduler.default_event_types.clone());
    let monitor = monitors.get_monitor(id)?;
    let runner = build_runner(&config, db)?;

    let execution = runner.run(&monitor, chrono::Utc::now()).await;
    println!("{}", serde_json::to_string_pretty(&execution)?);
    Ok(())
}
