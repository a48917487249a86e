// SPDX-License-Identifier: MIT OR Apache-2.0
//! CuePlay engine process.
//!
//! Reads JSON requests from stdin, one per line, and writes responses and
//! debounced change batches to stdout, one JSON document per line. Logs go
//! to stderr.

use clap::Parser;
use cueplay_engine::{
    dispatch, spawn_pump, Broadcaster, Engine, EngineConfig, MemoryStorage, Request, Response,
    SystemClock, TimelineOutput,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// How often scheduled groups are re-checked
const TICK_INTERVAL: Duration = Duration::from_millis(250);

/// Playout scheduling engine for broadcast rundowns
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Engine configuration (RON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Project file to load and save, overriding the configuration
    #[arg(short = 'p', long = "project", value_name = "FILE")]
    project: Option<PathBuf>,

    /// Write the effective configuration to FILE and exit
    #[arg(long = "write-config", value_name = "FILE")]
    write_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => match EngineConfig::load(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {e}", path.display());
                std::process::exit(1);
            }
        },
        None => EngineConfig::default(),
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Some(path) = &args.write_config {
        if let Err(e) = config.save(path) {
            tracing::error!("Failed to write {}: {e}", path.display());
            std::process::exit(1);
        }
        tracing::info!("Wrote configuration to {}", path.display());
        return;
    }

    tracing::info!("Starting CuePlay v{}", env!("CARGO_PKG_VERSION"));
    if let Err(e) = run(args, config).await {
        tracing::error!("Engine stopped: {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args, config: EngineConfig) -> cueplay_engine::Result<()> {
    let project_file = args.project.or_else(|| config.project_file.clone());
    let storage = match &project_file {
        Some(path) if path.exists() => MemoryStorage::load(path)?,
        _ => MemoryStorage::default(),
    };
    let storage = Arc::new(storage);

    let window = Duration::from_millis(config.notify_debounce_ms);
    let broadcaster = Arc::new(Broadcaster::new(window, 64));
    let pump = spawn_pump(broadcaster.clone(), window);

    let engine = Arc::new(Mutex::new(Engine::new(
        storage.clone(),
        broadcaster.clone(),
        Arc::new(TimelineOutput::new()),
        Arc::new(SystemClock),
        config,
    )));

    // Single writer for stdout
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = out_rx.recv().await {
            if stdout.write_all(line.as_bytes()).await.is_err()
                || stdout.write_all(b"\n").await.is_err()
                || stdout.flush().await.is_err()
            {
                break;
            }
        }
    });

    let mut changes = broadcaster.subscribe();
    let events_tx = out_tx.clone();
    let events = tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(batch) => {
                    let event = serde_json::json!({ "event": "changes", "changes": batch });
                    if events_tx.send(event.to_string()).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Dropped {skipped} change batches");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    let ticker_engine = engine.clone();
    let ticker = tokio::spawn(async move {
        let mut interval = tokio::time::interval(TICK_INTERVAL);
        loop {
            interval.tick().await;
            let ticked = ticker_engine.lock().tick();
            if let Err(e) = ticked {
                tracing::warn!("Schedule tick failed: {e}");
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<Request>(&line) {
            Ok(request) => {
                let outcome = dispatch(&mut engine.lock(), &request.command, request.args.clone());
                if let Err(e) = &outcome {
                    tracing::warn!("{} failed: {e}", request.command);
                }
                Response::new(&request, outcome)
            }
            Err(e) => Response {
                id: serde_json::Value::Null,
                result: None,
                error: Some(format!("Malformed request: {e}")),
            },
        };
        if out_tx.send(serde_json::to_string(&response)?).is_err() {
            break;
        }
    }

    tracing::info!("Input closed, shutting down");
    ticker.abort();
    pump.abort();
    let _ = ticker.await;
    let _ = pump.await;
    broadcaster.flush();
    drop(out_tx);
    drop(broadcaster);
    drop(engine);
    let _ = events.await;
    let _ = writer.await;

    if let Some(path) = project_file {
        storage.save(&path)?;
    }
    Ok(())
}
