//! Area Composer
//!
//! Runs the command engine on the headless backend behind a Unix socket.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use area_composer::server::{spawn_engine, ComposerServer};
use area_composer::{ComposerCommandEngine, ComposerConfig, ComposerResources, HeadlessHal, ResourceCache};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn config_arg() -> Option<PathBuf> {
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" || arg == "-c" {
            return args.next().map(PathBuf::from);
        }
    }
    None
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = match config_arg() {
        Some(path) => ComposerConfig::load_from(&path),
        None => ComposerConfig::load(),
    }
    .context("Failed to load configuration")?;

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.logging.filter.clone()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Area Composer with {} display(s)", config.displays.len());

    let mut resources = ResourceCache::new();
    for display in &config.displays {
        resources
            .add_display(display.id, display.client_target_slots, display.is_virtual)
            .with_context(|| format!("Failed to register display {}", display.id))?;
    }
    let engine = ComposerCommandEngine::new(HeadlessHal::new(&config.displays), resources);

    let server = ComposerServer::bind(&config.socket_path(), config.server.max_message_bytes)?;
    let (handle, worker) = spawn_engine(engine, config.server.queue_depth);

    // Setup signal handlers for graceful shutdown
    let (shutdown_tx, mut shutdown_rx) = tokio::sync::mpsc::channel::<()>(1);

    // Handle SIGTERM and SIGINT
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let tx = shutdown_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    let _ = tx.send(()).await;
                }
            }
        });
    }

    let result = server
        .run(handle, async move {
            shutdown_rx.recv().await;
        })
        .await;
    if let Err(e) = &result {
        error!("Server error: {}", e);
    }

    // Clients still connected keep the worker alive, so only wait briefly
    match tokio::time::timeout(Duration::from_millis(100), worker).await {
        Ok(joined) => {
            let engine = joined.context("Engine worker panicked")?;
            info!("Executed {} batch(es)", engine.batches_executed());
        }
        Err(_) => info!("Engine worker still busy, exiting anyway"),
    }

    info!("Area Composer stopped");
    result
}
