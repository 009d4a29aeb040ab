use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::EnvFilter;

use tankwatch::config::AppConfig;
use tankwatch::snapshots::{no_snapshot_hint, SnapshotReader};
use tankwatch::views;
use tankwatch_broker::CredentialProvider;
use tankwatch_monitor::{JsonFileStore, Monitor};
use tankwatch_types::EventKind;

#[derive(Parser, Debug)]
#[command(name = "tankwatch")]
#[command(about = "Liveness monitor for remote water-level sensors")]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "tankwatch.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the monitor daemon
    Run,
    /// Show the current status of every device with a reading
    Status,
    /// Show the historical per-device summary
    Summary,
    /// List recorded events (most recent 20 by default)
    Events {
        /// Only events for this device
        #[arg(short, long)]
        device: Option<String>,

        /// Only events of this kind
        #[arg(short, long)]
        kind: Option<KindArg>,

        /// Only online/offline connectivity transitions
        #[arg(short, long)]
        transitions: bool,

        /// Keep only the most recent N matches
        #[arg(short, long, default_value = "20", conflicts_with = "all")]
        limit: usize,

        /// Show every retained event
        #[arg(short, long)]
        all: bool,
    },
    /// Show per-device uptime over the retained window
    Uptime,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum KindArg {
    Online,
    Offline,
    Stale,
    Startup,
    System,
}

impl From<KindArg> for EventKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Online => EventKind::Online,
            KindArg::Offline => EventKind::Offline,
            KindArg::Stale => EventKind::Stale,
            KindArg::Startup => EventKind::Startup,
            KindArg::System => EventKind::System,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = AppConfig::load(Some(&args.config))?;

    match args.command {
        Command::Run => run_daemon(config).await,
        Command::Status => {
            let reader = SnapshotReader::new(&config.state_dir);
            match reader.readings()? {
                Some(snapshot) => print!("{}", views::render_status(&snapshot, Utc::now())),
                None => println!("{}", no_snapshot_hint(&config.state_dir)),
            }
            Ok(())
        }
        Command::Summary => {
            let reader = SnapshotReader::new(&config.state_dir);
            match reader.events()? {
                Some(snapshot) => print!("{}", views::render_summary(&snapshot, Utc::now())),
                None => println!("{}", no_snapshot_hint(&config.state_dir)),
            }
            Ok(())
        }
        Command::Events {
            device,
            kind,
            transitions,
            limit,
            all,
        } => {
            let reader = SnapshotReader::new(&config.state_dir);
            match reader.events()? {
                Some(snapshot) => {
                    let limit = if all { None } else { Some(limit) };
                    let events = views::filter_events(
                        &snapshot,
                        device.as_deref(),
                        kind.map(EventKind::from),
                        transitions,
                        limit,
                    );
                    print!("{}", views::render_events(&events));
                }
                None => println!("{}", no_snapshot_hint(&config.state_dir)),
            }
            Ok(())
        }
        Command::Uptime => {
            let reader = SnapshotReader::new(&config.state_dir);
            match reader.timeline()? {
                Some(snapshot) => print!("{}", views::render_uptime(&snapshot)),
                None => println!("{}", no_snapshot_hint(&config.state_dir)),
            }
            Ok(())
        }
    }
}

async fn run_daemon(config: AppConfig) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!(
        state_dir = %config.state_dir.display(),
        broker = %config.broker.host,
        namespace = %config.broker.namespace,
        "starting tankwatch"
    );

    let credentials = Arc::new(
        CredentialProvider::builder()
            .token_url(&config.auth.token_url)
            .credentials(&config.auth.client_id, &config.auth.client_secret)
            .safety_margin(std::time::Duration::from_secs(config.auth.safety_margin_secs))
            .timeout(std::time::Duration::from_secs(config.auth.timeout_secs))
            .build(),
    );

    let store = Arc::new(JsonFileStore::new(&config.state_dir));
    let monitor = Arc::new(
        Monitor::builder()
            .thresholds(config.thresholds()?)
            .sweep_interval(std::time::Duration::from_secs(config.monitor.sweep_interval_secs))
            .retention_hours(config.monitor.retention_hours)
            .max_events(config.monitor.max_events)
            .store(store)
            .build(),
    );

    let handle = monitor.start(config.session(), credentials);

    shutdown_signal().await?;
    info!("shutdown requested");

    handle.shutdown().await;
    Ok(())
}

/// Wait for ctrl-c or SIGTERM. Either one leads to the same orderly
/// shutdown: final snapshot flush, "listener stopped" event, transport
/// close.
#[cfg(unix)]
async fn shutdown_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate =
        signal(SignalKind::terminate()).context("installing SIGTERM handler")?;

    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("waiting for ctrl-c")?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("waiting for ctrl-c")?;
    Ok(())
}
