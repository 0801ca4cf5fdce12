//! CLI commands

use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::Settings;
use crate::core::{AppState, Outcome};

/// Bound on settled changes waiting for the engine
const CHANGE_QUEUE: usize = 256;

#[derive(Parser)]
#[command(name = "clawsync")]
#[command(about = "Sync agent session logs and config files into the platform store", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (default: ~/.clawsync/config.yml)
    #[arg(long)]
    config: Option<String>,

    /// Agent state directory, overriding the settings file
    #[arg(long)]
    state_dir: Option<String>,

    /// Database path, overriding the settings file
    #[arg(long)]
    database: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch the state directory and sync changes until interrupted
    Run,

    /// Sync every existing file once, then exit
    Scan,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load(cli.config.as_deref())?;
    if let Some(state_dir) = cli.state_dir {
        settings.state_dir = state_dir;
    }
    if let Some(database) = cli.database {
        settings.database_path = database;
    }

    let state = AppState::open(settings)?;

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        match cli.command {
            Commands::Run => watch(state).await,
            Commands::Scan => scan(state).await,
        }
    })
}

async fn watch(state: AppState) -> Result<()> {
    let engine = Arc::new(state.engine()?);
    let watcher = state.watcher()?;
    let token = CancellationToken::new();
    let (tx, rx) = mpsc::channel(CHANGE_QUEUE);

    let watcher_task = watcher.spawn(tx, token.clone());
    let engine_task = tokio::spawn(Arc::clone(&engine).run(rx, token.clone()));

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    token.cancel();

    watcher_task.await?;
    engine_task.await?;
    Ok(())
}

async fn scan(state: AppState) -> Result<()> {
    let engine = state.engine()?;
    let watcher = state.watcher()?;

    if !watcher.root().is_dir() {
        warn!("State directory {:?} does not exist, nothing to scan", watcher.root());
        return Ok(());
    }

    let mut synced = 0;
    let mut failed = 0;
    for change in watcher.snapshot().await {
        match engine.process(change).await {
            Outcome::Synced(_) => synced += 1,
            Outcome::Failed(_) => failed += 1,
            _ => {}
        }
    }

    println!("Synced {} file(s), {} failed", synced, failed);
    Ok(())
}
