//! Guidance composition: classifier output + namespace summary -> envelope.
//!
//! A pure merge with no channel access, so every combination is unit
//! testable. Next-step hints come from a static rule table keyed on the
//! kinds present in the namespace; the first matching rule wins.

use std::time::Duration;

use rustc_hash::FxHashSet;
use uuid::Uuid;

use crate::classify::ClassifiedError;
use crate::envelope::{ResponseEnvelope, ResponseStatus, collect_outputs};
use crate::event::{Completion, ResultEvent, completion_of};
use crate::namespace::{NamespaceSummary, ValueKind};

struct HintContext<'a> {
    kinds: FxHashSet<ValueKind>,
    tabular_names: Vec<&'a str>,
    produced_display: bool,
}

struct HintRule {
    applies: fn(&HintContext) -> bool,
    render: fn(&HintContext) -> String,
}

/// Static hint table, checked in order.
static HINT_RULES: &[HintRule] = &[
    // Tabular data loaded and nothing visual produced this turn: nudge
    // toward a summary before plotting or modeling.
    HintRule {
        applies: |ctx| ctx.kinds.contains(&ValueKind::Tabular) && !ctx.produced_display,
        render: |ctx| {
            format!(
                "Tabular data is loaded ({}); consider summarizing it next.",
                ctx.tabular_names.join(", ")
            )
        },
    },
    HintRule {
        applies: |ctx| ctx.produced_display,
        render: |_| "A display artifact was produced; review or save it before moving on.".to_string(),
    },
    HintRule {
        applies: |ctx| {
            !ctx.kinds.is_empty() && ctx.kinds.iter().all(|kind| *kind == ValueKind::Callable)
        },
        render: |_| "Only callables are defined so far; invoke one to produce data.".to_string(),
    },
    HintRule {
        applies: |ctx| ctx.kinds.is_empty(),
        render: |_| "The namespace is empty; define variables to build on in later turns.".to_string(),
    },
];

/// Derive a next-step hint from the namespace and this turn's events.
fn next_step_hint(namespace: &NamespaceSummary, events: &[ResultEvent]) -> Option<String> {
    let mut tabular_names: Vec<&str> = namespace
        .iter()
        .filter(|(_, entry)| entry.kind == ValueKind::Tabular)
        .map(|(name, _)| name.as_str())
        .collect();
    tabular_names.truncate(3);

    let ctx = HintContext {
        kinds: namespace.values().map(|entry| entry.kind).collect(),
        tabular_names,
        produced_display: events
            .iter()
            .any(|event| matches!(event, ResultEvent::Display { .. })),
    };

    HINT_RULES
        .iter()
        .find(|rule| (rule.applies)(&ctx))
        .map(|rule| (rule.render)(&ctx))
}

/// Merge a submission's events, its classified error (if any), and the
/// session's namespace summary into the response envelope.
pub fn compose(
    execution_id: Uuid,
    session_id: &str,
    events: &[ResultEvent],
    error: Option<ClassifiedError>,
    namespace: &NamespaceSummary,
    duration: Duration,
) -> ResponseEnvelope {
    let value = match completion_of(events) {
        Some(Completion::Success { value, .. }) => value.clone(),
        _ => None,
    };

    let next_step = if error.is_none() {
        next_step_hint(namespace, events)
    } else {
        None
    };

    ResponseEnvelope {
        execution_id,
        session_id: session_id.to_string(),
        status: if error.is_some() {
            ResponseStatus::Error
        } else {
            ResponseStatus::Ok
        },
        outputs: collect_outputs(events),
        value,
        error,
        next_step,
        duration_ms: duration.as_millis() as u64,
    }
}
