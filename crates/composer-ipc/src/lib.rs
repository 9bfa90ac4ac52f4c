//! Area Composer IPC Protocol
//!
//! Wire types shared by `area-composer` and its clients: command batches going in,
//! per-command results coming out, framed as length-prefixed JSON over a Unix socket.

pub mod commands;
pub mod results;

pub use commands::*;
pub use results::*;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame accepted unless configured otherwise
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 4 * 1024 * 1024;

/// Socket path for IPC communication
pub fn socket_path() -> std::path::PathBuf {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR")
        .unwrap_or_else(|_| format!("/run/user/{}", unsafe { libc::getuid() }));
    std::path::PathBuf::from(runtime_dir).join("area-composer.sock")
}

// ============================================================================
// Client → Composer Requests
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ComposerRequest {
    /// Execute one frame's worth of display commands
    ExecuteCommands { commands: Vec<DisplayCommand> },

    /// Create a layer on a display, with `buffer_slot_count` cache slots
    CreateLayer { display: DisplayId, buffer_slot_count: u32 },

    /// Destroy a layer and release its cached buffers
    DestroyLayer { display: DisplayId, layer: LayerId },

    /// Force the next present-or-validate on `display` through validate
    Refresh { display: DisplayId },
}

// ============================================================================
// Composer → Client Replies
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ComposerReply {
    CommandResults { results: Vec<CommandResult> },
    LayerCreated { layer: LayerId },
    Ok,
    Error { code: i32, message: String },
}

// ============================================================================
// Message Framing
// ============================================================================

/// A framed message with length prefix for reliable socket reads
#[derive(Debug)]
pub struct FramedMessage {
    pub data: Vec<u8>,
}

impl FramedMessage {
    /// Create a new framed message from serializable data
    pub fn new<T: Serialize>(msg: &T) -> Result<Self> {
        let data = serde_json::to_vec(msg)?;
        Ok(Self { data })
    }

    /// Encode message with length prefix (4 bytes, big-endian)
    pub fn encode(&self) -> Vec<u8> {
        let len = self.data.len() as u32;
        let mut buf = Vec::with_capacity(4 + self.data.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(&self.data);
        buf
    }

    pub fn decode_request(data: &[u8]) -> Result<ComposerRequest> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn decode_reply(data: &[u8]) -> Result<ComposerReply> {
        Ok(serde_json::from_slice(data)?)
    }
}

/// Read one frame body. Returns `None` when the stream ends cleanly between
/// frames; ending inside a header or body is an error.
pub async fn read_frame<R>(reader: &mut R, max_len: usize) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    let mut filled = 0;
    while filled < len_buf.len() {
        let n = reader.read(&mut len_buf[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            bail!("Stream ended inside a frame header ({} of 4 bytes)", filled);
        }
        filled += n;
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > max_len {
        bail!("Message too large: {} bytes (limit {})", len, max_len);
    }

    let mut msg_buf = vec![0u8; len];
    reader.read_exact(&mut msg_buf).await?;
    Ok(Some(msg_buf))
}

/// Serialize `msg` and write it as one frame
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let encoded = FramedMessage::new(msg)?.encode();
    writer.write_all(&encoded).await?;
    writer.flush().await?;
    Ok(())
}
