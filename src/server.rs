//! Socket front-end for the command engine
//!
//! Clients connect over a Unix socket and exchange length-prefixed JSON frames.
//! Every connection forwards its requests to a single engine worker, so batches
//! from different clients never interleave.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use composer_ipc::{read_frame, write_frame, ComposerReply, ComposerRequest, FramedMessage};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::engine::ComposerCommandEngine;
use crate::hal::{ComposerHal, HwcError};
use crate::resources::ComposerResources;

type Job = (ComposerRequest, oneshot::Sender<ComposerReply>);

/// Run one request against the engine
pub fn handle_request<H, R>(engine: &mut ComposerCommandEngine<H, R>, request: ComposerRequest) -> ComposerReply
where
    H: ComposerHal,
    R: ComposerResources,
{
    match request {
        ComposerRequest::ExecuteCommands { commands } => ComposerReply::CommandResults {
            results: engine.execute(&commands),
        },
        ComposerRequest::CreateLayer {
            display,
            buffer_slot_count,
        } => match engine.create_layer(display, buffer_slot_count) {
            Ok(layer) => ComposerReply::LayerCreated { layer },
            Err(err) => error_reply(err),
        },
        ComposerRequest::DestroyLayer { display, layer } => match engine.destroy_layer(display, layer) {
            Ok(()) => ComposerReply::Ok,
            Err(err) => error_reply(err),
        },
        ComposerRequest::Refresh { display } => {
            engine.refresh(display);
            ComposerReply::Ok
        }
    }
}

fn error_reply(err: HwcError) -> ComposerReply {
    ComposerReply::Error {
        code: err.code(),
        message: err.to_string(),
    }
}

/// Cloneable handle to the engine worker
#[derive(Debug, Clone)]
pub struct EngineHandle {
    jobs: mpsc::Sender<Job>,
}

impl EngineHandle {
    pub async fn call(&self, request: ComposerRequest) -> Result<ComposerReply> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.jobs
            .send((request, reply_tx))
            .await
            .map_err(|_| anyhow::anyhow!("Engine worker has stopped"))?;
        reply_rx.await.context("Engine worker dropped the request")
    }
}

/// Move the engine onto a blocking worker thread. The worker hands the engine
/// back once every [`EngineHandle`] is dropped.
pub fn spawn_engine<H, R>(
    mut engine: ComposerCommandEngine<H, R>,
    queue_depth: usize,
) -> (EngineHandle, JoinHandle<ComposerCommandEngine<H, R>>)
where
    H: ComposerHal + Send + 'static,
    R: ComposerResources + Send + 'static,
{
    let (jobs_tx, mut jobs_rx) = mpsc::channel::<Job>(queue_depth.max(1));

    let worker = tokio::task::spawn_blocking(move || {
        while let Some((request, reply)) = jobs_rx.blocking_recv() {
            let response = handle_request(&mut engine, request);
            if reply.send(response).is_err() {
                debug!("Client went away before its reply was ready");
            }
        }
        info!("Engine worker stopped after {} batch(es)", engine.batches_executed());
        engine
    });

    (EngineHandle { jobs: jobs_tx }, worker)
}

/// Listening socket for composer clients
pub struct ComposerServer {
    listener: UnixListener,
    path: PathBuf,
    max_message_bytes: usize,
}

impl ComposerServer {
    pub fn bind(path: &Path, max_message_bytes: usize) -> Result<Self> {
        // Remove existing socket if present
        if path.exists() {
            std::fs::remove_file(path).with_context(|| format!("Failed to remove stale socket {:?}", path))?;
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let listener = UnixListener::bind(path).with_context(|| format!("Failed to bind {:?}", path))?;
        info!("Composer listening on {:?}", path);

        Ok(Self {
            listener,
            path: path.to_path_buf(),
            max_message_bytes,
        })
    }

    /// Accept clients until `shutdown` resolves, then remove the socket file
    pub async fn run<F>(self, engine: EngineHandle, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        info!("Client connected");
                        tokio::spawn(handle_client(stream, engine.clone(), self.max_message_bytes));
                    }
                    Err(e) => {
                        error!("Accept error: {}", e);
                    }
                },
                _ = &mut shutdown => break,
            }
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!("Failed to remove socket {:?}: {}", self.path, e);
        }
        Ok(())
    }
}

/// Serve one client: each request frame gets exactly one reply frame, in order
async fn handle_client(stream: UnixStream, engine: EngineHandle, max_message_bytes: usize) {
    let (mut reader, mut writer) = stream.into_split();

    loop {
        let frame = match read_frame(&mut reader, max_message_bytes).await {
            Ok(Some(frame)) => frame,
            Ok(None) => break,
            Err(e) => {
                warn!("Dropping client: {}", e);
                break;
            }
        };

        let reply = match FramedMessage::decode_request(&frame) {
            Ok(request) => {
                debug!("Received request: {:?}", request);
                match engine.call(request).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        error!("{}", e);
                        break;
                    }
                }
            }
            Err(e) => {
                warn!("Failed to decode request: {}", e);
                ComposerReply::Error {
                    code: HwcError::BadParameter.code(),
                    message: e.to_string(),
                }
            }
        };

        if let Err(e) = write_frame(&mut writer, &reply).await {
            debug!("Failed to write reply: {}", e);
            break;
        }
    }

    info!("Client disconnected");
}
