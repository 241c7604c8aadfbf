//! Result events produced by an execution channel.
//!
//! One submission yields zero or more stream/display events followed by
//! exactly one completion event, in the order the interpreter produced them.

use serde::{Deserialize, Serialize};

/// Which output stream a chunk came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// A rich display artifact produced during execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayArtifact {
    /// MIME type of the payload (e.g. `image/png`, `text/html`).
    pub mime: String,
    /// Payload as delivered by the provider; base64 for binary MIME types.
    pub data: String,
}

/// One frame of a traceback, innermost last.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    pub file: String,
    pub line: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<String>,
    /// Source line the frame points at, if the provider captured it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Raw failure trace from the execution provider.
///
/// `kind` and `message` carry the structured exception metadata when the
/// provider can supply it. `rendered` is the provider's formatted traceback,
/// kept verbatim for audit and never mutated downstream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub frames: Vec<TraceFrame>,
    pub rendered: String,
}

impl RawTrace {
    /// A trace with rendered text only; structured fields are absent.
    pub fn from_text(rendered: impl Into<String>) -> Self {
        Self {
            kind: None,
            message: None,
            frames: Vec::new(),
            rendered: rendered.into(),
        }
    }

    /// A trace with structured exception metadata.
    pub fn structured(
        kind: impl Into<String>,
        message: impl Into<String>,
        rendered: impl Into<String>,
    ) -> Self {
        Self {
            kind: Some(kind.into()),
            message: Some(message.into()),
            frames: Vec::new(),
            rendered: rendered.into(),
        }
    }
}

/// Terminal outcome of one submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Completion {
    /// The submission ran to completion.
    Success {
        /// Textual repr of the final expression value, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        value: Option<String>,
        /// Provider-side execution counter.
        execution_count: u64,
    },
    /// The submission raised, was interrupted, or the kernel died.
    Failure { trace: RawTrace },
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Completion::Success { .. })
    }
}

/// One event in a submission's result sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ResultEvent {
    /// A chunk of stdout/stderr output.
    Stream { stream: StreamKind, text: String },

    /// A rich display artifact.
    Display { artifact: DisplayArtifact },

    /// The single terminal event of the sequence.
    Completed { completion: Completion },
}

impl ResultEvent {
    /// Whether this event terminates the sequence.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ResultEvent::Completed { .. })
    }
}

/// Find the terminal completion in an event sequence.
///
/// A well-formed sequence carries exactly one, as its last element.
pub fn completion_of(events: &[ResultEvent]) -> Option<&Completion> {
    events.iter().rev().find_map(|event| match event {
        ResultEvent::Completed { completion } => Some(completion),
        _ => None,
    })
}
