//! Core engine for the Mercury execution broker.
//!
//! This crate provides:
//! - Result-event model for interpreter submissions
//! - Execution channel trait and the process-backed kernel adapter
//! - Failure classification with static remediation tables
//! - Incremental namespace tracking
//! - Guidance composition into the response envelope

pub mod channel;
pub mod classify;
pub mod envelope;
pub mod error;
pub mod event;
pub mod guidance;
pub mod namespace;

pub use channel::{
    ChannelFactory, ExecutionChannel, InterruptHandle, ProcessChannel, ProcessChannelFactory,
};
pub use classify::{ClassifiedError, ErrorCategory, classify, installable_package};
pub use envelope::{OutputItem, ResponseEnvelope, ResponseStatus, collect_outputs};
pub use error::{Error, Result};
pub use event::{
    Completion, DisplayArtifact, RawTrace, ResultEvent, StreamKind, TraceFrame, completion_of,
};
pub use guidance::compose;
pub use namespace::{
    NamespaceBinding, NamespaceDelta, NamespaceEntry, NamespaceSummary, NamespaceTracker,
    ValueKind,
};
