//! OnAir Queue Scheduler (onair-qs) - Main entry point
//!
//! `run` starts the dispatch loop and the history purge job against the
//! station database. The other subcommands are one-shot operator actions
//! on the same database.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use onair_common::config::TomlConfig;
use onair_common::db::init_database;
use onair_common::time;
use onair_qs::config::Config;
use onair_qs::jobs::{shutdown_channel, DispatchLoop, PurgeJob};
use onair_qs::queue::{DispatchOutcome, LoggingNotifier, NewQueueEntry, QueueSource};
use onair_qs::station::{BackendAdapter, ConfigChange, FrontendAdapter, NewStation};
use onair_qs::SharedState;
use serde::Serialize;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for onair-qs
#[derive(Parser, Debug)]
#[command(name = "onair-qs")]
#[command(about = "Station broadcast queue scheduler")]
#[command(version)]
struct Args {
    /// Root folder holding the station database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Database file (defaults to <root>/onair.db)
    #[arg(short, long, env = "ONAIR_DATABASE")]
    database: Option<PathBuf>,

    /// Alternative config.toml
    #[arg(short, long, env = "ONAIR_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the dispatch loop and history purge until interrupted
    Run,
    /// Cue an entry on a station
    Cue(CueArgs),
    /// Dispatch the next entry of a station now
    Next { station: i64 },
    /// Record that AutoDJ picked up an entry
    Dispatched { entry: i64 },
    /// Record that an entry played
    Confirm { entry: i64 },
    /// Remove an upcoming entry
    Remove { entry: i64 },
    /// Move an entry to another playlist
    Reassign { entry: i64, playlist: i64 },
    /// List upcoming entries
    Upcoming {
        station: i64,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// List played entries, newest first
    History {
        station: i64,
        #[arg(short, long, default_value = "20")]
        limit: u32,
    },
    /// Purge played history older than the retention window
    Purge {
        #[arg(short, long)]
        station: Option<i64>,
    },
    /// Station management
    #[command(subcommand)]
    Station(StationCommand),
}

#[derive(ClapArgs, Debug)]
struct CueArgs {
    station: i64,
    #[arg(long)]
    playlist: Option<i64>,
    #[arg(long)]
    media: Option<i64>,
    #[arg(long)]
    request: Option<i64>,
    #[arg(long)]
    uri: Option<String>,
}

#[derive(Subcommand, Debug)]
enum StationCommand {
    /// Create a station
    Create {
        name: String,
        short_name: String,
        #[arg(long, default_value = "icecast")]
        frontend: String,
        #[arg(long, default_value = "liquidsoap")]
        backend: String,
    },
    /// List stations
    List,
    /// Change the maximum bitrate
    SetBitrate { station: i64, bitrate: i64 },
    /// Change the public URL
    SetUrl { station: i64, url: Option<String> },
    /// Enable or disable streamer (DJ) connections
    SetStreamers {
        station: i64,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Enable or disable the station
    SetEnabled {
        station: i64,
        #[arg(action = ArgAction::Set)]
        enabled: bool,
    },
    /// Record that the station's services started
    Started { station: i64 },
    /// Record that the station's services stopped
    Stopped { station: i64 },
    /// Flag the station for restart
    RequestRestart { station: i64 },
    /// Clear the restart flag after a restart
    Restarted { station: i64 },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let toml = match &args.config {
        Some(path) => TomlConfig::load(path)
            .with_context(|| format!("Failed to load config file {}", path.display()))?,
        None => TomlConfig::load_default(),
    };
    let config = Config::resolve(args.root_folder.as_deref(), args.database.as_deref(), &toml);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_filter.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Root folder: {}", config.root_folder.display());
    info!("Database: {}", config.db_path.display());

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db = init_database(&config.db_path)
        .await
        .context("Failed to initialize database")?;

    let state = SharedState::load(db, Arc::new(LoggingNotifier))
        .await
        .context("Failed to load scheduler settings")?;

    match args.command {
        Command::Run => run(state).await?,
        Command::Cue(cue) => {
            let source = QueueSource::from_parts(cue.playlist, cue.media, cue.request, cue.uri)?;
            let entry = state
                .scheduler
                .cue(NewQueueEntry::new(cue.station, source))
                .await?;
            print_json(&entry)?;
        }
        Command::Next { station } => match state.scheduler.dispatch_next(station).await? {
            DispatchOutcome::Dispatched(entry) => print_json(&entry)?,
            DispatchOutcome::InFlight(entry) => {
                println!("Entry {} is still playing", entry.id)
            }
            DispatchOutcome::Idle => println!("Nothing queued"),
        },
        Command::Dispatched { entry } => {
            print_json(&state.scheduler.on_dispatched(entry).await?)?
        }
        Command::Confirm { entry } => print_json(
            &state
                .scheduler
                .on_playback_confirmed(entry, time::now())
                .await?,
        )?,
        Command::Remove { entry } => print_json(&state.scheduler.remove(entry).await?)?,
        Command::Reassign { entry, playlist } => print_json(
            &state
                .scheduler
                .on_playlist_reassigned(entry, playlist)
                .await?,
        )?,
        Command::Upcoming { station, limit } => {
            print_json(&state.scheduler.store().list_upcoming(station, limit).await?)?
        }
        Command::History { station, limit } => {
            print_json(&state.scheduler.store().list_history(station, limit).await?)?
        }
        Command::Purge { station } => {
            let removed = match station {
                Some(station) => state.scheduler.purge_history(station, time::now()).await?,
                None => state.scheduler.purge_all_history(time::now()).await?,
            };
            println!("Purged {} entries", removed);
        }
        Command::Station(cmd) => station_command(&state, cmd).await?,
    }

    Ok(())
}

async fn run(state: SharedState) -> Result<()> {
    info!(
        "Starting queue scheduler (retention {} days, poll {}ms)",
        state.settings.history_retention_days,
        state.settings.poll_interval.as_millis()
    );

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let dispatch = DispatchLoop::new(state.scheduler.clone(), state.settings.poll_interval)
        .spawn(shutdown_rx.clone());
    let purge =
        PurgeJob::new(state.scheduler.clone(), state.settings.purge_interval).spawn(shutdown_rx);

    shutdown_signal().await;

    let _ = shutdown_tx.send(true);
    let (dispatch, purge) = tokio::join!(dispatch, purge);
    dispatch.context("Dispatch loop panicked")?;
    purge.context("Purge job panicked")?;

    state.db.close().await;
    info!("Queue scheduler shutdown complete");
    Ok(())
}

async fn station_command(state: &SharedState, cmd: StationCommand) -> Result<()> {
    let stations = &state.stations;
    let restart = stations.restart_tracker();

    match cmd {
        StationCommand::Create {
            name,
            short_name,
            frontend,
            backend,
        } => {
            let frontend: FrontendAdapter = frontend.parse()?;
            let backend: BackendAdapter = backend.parse()?;
            let station = stations
                .create(NewStation::new(name, short_name).adapters(frontend, backend))
                .await?;
            print_json(&station)?;
        }
        StationCommand::List => print_json(&stations.list().await?)?,
        StationCommand::SetBitrate { station, bitrate } => print_json(
            &stations
                .apply(station, ConfigChange::MaxBitrate(bitrate))
                .await?,
        )?,
        StationCommand::SetUrl { station, url } => {
            print_json(&stations.apply(station, ConfigChange::Url(url)).await?)?
        }
        StationCommand::SetStreamers { station, enabled } => print_json(
            &stations
                .apply(station, ConfigChange::EnableStreamers(enabled))
                .await?,
        )?,
        StationCommand::SetEnabled { station, enabled } => print_json(
            &stations
                .apply(station, ConfigChange::Enabled(enabled))
                .await?,
        )?,
        StationCommand::Started { station } => {
            restart.mark_started(station).await?;
            print_json(&stations.require(station).await?)?;
        }
        StationCommand::Stopped { station } => {
            restart.mark_stopped(station).await?;
            print_json(&stations.require(station).await?)?;
        }
        StationCommand::RequestRestart { station } => {
            let flagged = restart
                .request_restart(station, onair_common::events::RestartReason::Manual)
                .await?;
            println!("needs_restart: {}", flagged);
        }
        StationCommand::Restarted { station } => {
            restart.clear_restart(station).await?;
            print_json(&stations.require(station).await?)?;
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
