//! Response envelope returned to the broker's caller.
//!
//! One tagged shape for every submission result, success or failure; the
//! status enum is closed and the error payload is structured, never a bare
//! string keyed ad hoc.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classify::ClassifiedError;
use crate::event::{ResultEvent, StreamKind};

/// Closed status set for a submission response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Ok,
    Error,
}

/// One collected output, in the order the interpreter produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputItem {
    Stream { stream: StreamKind, text: String },
    Display { mime: String, data: String },
}

/// Structured response for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    /// Unique id for this submission.
    pub execution_id: Uuid,
    /// Session the submission ran in.
    pub session_id: String,
    pub status: ResponseStatus,
    /// Stream chunks and display artifacts, original order preserved.
    pub outputs: Vec<OutputItem>,
    /// Textual repr of the final expression value, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Present exactly when `status` is `error`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ClassifiedError>,
    /// Suggested next step derived from the session's namespace.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_step: Option<String>,
    /// Wall-clock duration of the submission.
    pub duration_ms: u64,
}

/// Collect the non-terminal events of a submission into envelope outputs.
pub fn collect_outputs(events: &[ResultEvent]) -> Vec<OutputItem> {
    events
        .iter()
        .filter_map(|event| match event {
            ResultEvent::Stream { stream, text } => Some(OutputItem::Stream {
                stream: *stream,
                text: text.clone(),
            }),
            ResultEvent::Display { artifact } => Some(OutputItem::Display {
                mime: artifact.mime.clone(),
                data: artifact.data.clone(),
            }),
            ResultEvent::Completed { .. } => None,
        })
        .collect()
}
