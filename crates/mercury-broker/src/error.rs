//! Error types for the Mercury broker.
//!
//! Session-management failures only. Execution-time failures are not broker
//! errors: they travel inside the response envelope as classified errors.

/// Broker error type.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// No session is registered under the requested identifier.
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// The session's execution channel could not be started.
    #[error("failed to initialize session '{id}': {source}")]
    SessionInit {
        id: String,
        #[source]
        source: mercury_core::Error,
    },

    /// The session already has a submission in flight.
    #[error("session '{0}' has a submission in flight")]
    SessionBusy(String),
}

/// Result type for broker operations.
pub type BrokerResult<T> = Result<T, BrokerError>;
