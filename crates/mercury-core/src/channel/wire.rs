//! Wire protocol between the broker and a kernel harness process.
//!
//! Length-prefixed JSON over stdin/stdout. Format: 4-byte length (u32 LE)
//! followed by a JSON-encoded message. JSON keeps the protocol neutral for
//! kernel harnesses written in other languages.

use std::io::{Read, Write};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::event::{Completion, StreamKind};
use crate::namespace::NamespaceBinding;

/// Upper bound on a single frame. Display payloads can be large (inline
/// images) but anything past this indicates a broken peer.
pub const MAX_FRAME_LEN: usize = 32 * 1024 * 1024;

/// Request sent from the broker to the kernel harness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelRequest {
    /// Execute a code fragment in the persistent interpreter state.
    Execute { code: String },

    /// List currently bound top-level names with coarse type tags.
    ListNamespace,

    /// Liveness probe.
    Ping,

    /// Shut down the kernel gracefully.
    Shutdown,
}

/// Reply sent from the kernel harness to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KernelReply {
    /// A chunk of stdout/stderr produced by the running submission.
    Stream { stream: StreamKind, text: String },

    /// A rich display artifact produced by the running submission.
    Display { mime: String, data: String },

    /// Terminal event for the current submission.
    Completed { completion: Completion },

    /// Response to `ListNamespace`.
    Namespace { bindings: Vec<NamespaceBinding> },

    /// Response to `Ping`.
    Pong,

    /// Acknowledgement of `Shutdown`.
    ShuttingDown,
}

/// Write a message using length-prefixed JSON encoding.
pub fn write_frame<W: Write>(writer: &mut W, message: &impl Serialize) -> Result<()> {
    let bytes = serde_json::to_vec(message)
        .map_err(|e| Error::Serialization(format!("failed to encode wire frame: {}", e)))?;

    let len = bytes.len() as u32;
    writer
        .write_all(&len.to_le_bytes())
        .map_err(|e| Error::Ipc(format!("failed to write frame length: {}", e)))?;
    writer
        .write_all(&bytes)
        .map_err(|e| Error::Ipc(format!("failed to write frame body: {}", e)))?;
    writer
        .flush()
        .map_err(|e| Error::Ipc(format!("failed to flush wire stream: {}", e)))?;

    Ok(())
}

/// Read a message using length-prefixed JSON encoding.
pub fn read_frame<R: Read, T: DeserializeOwned>(reader: &mut R) -> Result<T> {
    let mut len_bytes = [0u8; 4];
    reader
        .read_exact(&mut len_bytes)
        .map_err(|e| Error::Ipc(format!("failed to read frame length: {}", e)))?;
    let len = u32::from_le_bytes(len_bytes) as usize;

    if len > MAX_FRAME_LEN {
        return Err(Error::Ipc(format!("wire frame too large: {} bytes", len)));
    }

    let mut bytes = vec![0u8; len];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| Error::Ipc(format!("failed to read frame body: {}", e)))?;

    serde_json::from_slice(&bytes)
        .map_err(|e| Error::Serialization(format!("failed to decode wire frame: {}", e)))
}
