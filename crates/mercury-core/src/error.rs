//! Error types for mercury-core.

use thiserror::Error;

/// Result type for mercury-core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in mercury-core.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to spawn the kernel harness process.
    #[error("failed to spawn kernel: {0}")]
    Spawn(String),

    /// IPC communication error with the kernel process.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// Serialization error on the kernel wire protocol.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The kernel sent a reply that violates the protocol state machine.
    #[error("kernel protocol violation: {0}")]
    Protocol(String),

    /// The channel has been shut down and can no longer be used.
    #[error("channel is closed")]
    ChannelClosed,

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
