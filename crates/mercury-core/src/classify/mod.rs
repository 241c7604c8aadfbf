//! Result classification: raw failure traces into actionable categories.
//!
//! Structured exception metadata from the provider is always preferred; the
//! regex fallback over rendered text runs only when the provider could not
//! supply it. Classification never fails: a lookup miss degrades to
//! `Unclassified` with the raw trace carried verbatim.

mod rules;

use std::sync::LazyLock;

use regex::Regex;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::event::{RawTrace, TraceFrame};

pub use rules::installable_package;

/// Closed set of failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Import/module resolution failure.
    MissingDependency,
    /// A name was used before being defined.
    UndefinedName,
    /// A filesystem path could not be used.
    MissingPath,
    /// Wrong type or shape in an operation.
    TypeMismatch,
    /// The submission was cancelled.
    Interrupted,
    /// The submission exceeded its deadline.
    Timeout,
    /// No rule matched; always a valid outcome.
    Unclassified,
}

/// A failure enriched with a category and optional remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    /// One-sentence explanation of what went wrong.
    pub explanation: String,
    /// Suggested remediation command or step, when a rule provides one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    /// The originating trace, untouched.
    pub trace: RawTrace,
}

impl ClassifiedError {
    /// Recast an interrupt as a timeout.
    ///
    /// A deadline watchdog cancels through the same interrupt path a user
    /// does; the caller knows which one fired and upgrades accordingly.
    pub fn promote_to_timeout(mut self) -> Self {
        if self.category == ErrorCategory::Interrupted {
            self.category = ErrorCategory::Timeout;
            self.explanation =
                "Execution exceeded the submission timeout and was interrupted.".to_string();
            self.remediation =
                Some("Increase the timeout or simplify the computation.".to_string());
        }
        self
    }
}

static MODULE_NOT_FOUND_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"No module named ['"]?([A-Za-z0-9_.]+)['"]?"#).unwrap());
static IMPORT_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"cannot import name ['"]?([^'"]+)['"]?(?: from ['"]?([^'"]+)['"]?)?"#).unwrap()
});
static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"name ['"]?([^'"]+)['"]? is not defined"#).unwrap());
static PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"No such file or directory: ['"]?([^'"]+)['"]?"#).unwrap());
static PERMISSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"Permission denied: ['"]?([^'"]+)['"]?"#).unwrap());
static ATTRIBUTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"'([^']+)' object has no attribute '([^']+)'"#).unwrap());
static FRAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"File "([^"]+)", line (\d+)(?:, in (\S+))?"#).unwrap());

/// Classify a raw failure trace.
pub fn classify(trace: &RawTrace) -> ClassifiedError {
    let (kind, message, frames) = match &trace.kind {
        Some(kind) => (
            kind.clone(),
            trace.message.clone().unwrap_or_default(),
            trace.frames.clone(),
        ),
        None => parse_rendered(&trace.rendered),
    };

    let vars = extract_values(&kind, &message);
    let rule = rules::lookup_rule(&kind);

    let fallback_explanation = || {
        let location = frames
            .last()
            .map(|frame| format!(" at {}:{}", frame.file, frame.line))
            .unwrap_or_default();
        if message.is_empty() {
            format!("{}{}", kind, location)
        } else {
            format!("{}{}: {}", kind, location, message)
        }
    };

    match rule {
        Some(rule) => ClassifiedError {
            category: rule.category,
            explanation: fill(rule.explanation, &vars).unwrap_or_else(fallback_explanation),
            remediation: rule.action.and_then(|action| fill(action, &vars)),
            trace: trace.clone(),
        },
        None => ClassifiedError {
            category: ErrorCategory::Unclassified,
            explanation: fallback_explanation(),
            remediation: None,
            trace: trace.clone(),
        },
    }
}

/// Fallback parse of a rendered traceback when structured metadata is absent.
///
/// Mirrors the shape of an interpreter traceback: frame lines first, the
/// terminal `Kind: message` line last.
fn parse_rendered(rendered: &str) -> (String, String, Vec<TraceFrame>) {
    let lines: Vec<&str> = rendered.lines().collect();

    let mut kind = String::from("UnknownError");
    let mut message = String::new();
    for line in lines.iter().rev() {
        if line.starts_with(char::is_whitespace) {
            continue;
        }
        if let Some((head, tail)) = line.split_once(": ") {
            if is_exception_kind(head) {
                kind = head.trim().to_string();
                message = tail.trim().to_string();
                break;
            }
        } else if !line.is_empty() && is_exception_kind(line.trim()) {
            // Bare terminal line, e.g. `KeyboardInterrupt`.
            kind = line.trim().to_string();
            message.clear();
            break;
        }
    }

    let mut frames = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(caps) = FRAME_RE.captures(line) {
            let context = lines
                .get(i + 1)
                .filter(|next| next.starts_with("    "))
                .map(|next| next.trim().to_string());
            frames.push(TraceFrame {
                file: caps[1].to_string(),
                line: caps[2].parse().unwrap_or(0),
                function: caps.get(3).map(|m| m.as_str().to_string()),
                context,
            });
        }
    }

    (kind, message, frames)
}

fn is_exception_kind(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
        && !candidate.starts_with(|c: char| c.is_ascii_digit())
}

/// Extract template values from the error message, per exception kind.
fn extract_values(kind: &str, message: &str) -> FxHashMap<&'static str, String> {
    let mut vars = FxHashMap::default();

    match kind {
        "ModuleNotFoundError" => {
            if let Some(caps) = MODULE_NOT_FOUND_RE.captures(message) {
                let module = caps[1].to_string();
                vars.insert("package", installable_package(&module).to_string());
                vars.insert("module", module);
            }
        }
        "ImportError" => {
            if let Some(caps) = IMPORT_NAME_RE.captures(message) {
                vars.insert("name", caps[1].to_string());
                if let Some(module) = caps.get(2) {
                    vars.insert(
                        "package",
                        installable_package(module.as_str()).to_string(),
                    );
                    vars.insert("module", module.as_str().to_string());
                }
            } else if let Some(caps) = MODULE_NOT_FOUND_RE.captures(message) {
                // Some providers raise plain ImportError for missing modules.
                let module = caps[1].to_string();
                vars.insert("name", module.clone());
                vars.insert("package", installable_package(&module).to_string());
                vars.insert("module", module);
            }
        }
        "NameError" | "UnboundLocalError" => {
            if let Some(caps) = NAME_RE.captures(message) {
                vars.insert("name", caps[1].to_string());
            }
        }
        "FileNotFoundError" => {
            if let Some(caps) = PATH_RE.captures(message) {
                vars.insert("path", caps[1].to_string());
            }
        }
        "PermissionError" => {
            if let Some(caps) = PERMISSION_RE.captures(message) {
                vars.insert("path", caps[1].to_string());
            }
        }
        "AttributeError" => {
            if let Some(caps) = ATTRIBUTE_RE.captures(message) {
                vars.insert("type", caps[1].to_string());
                vars.insert("attribute", caps[2].to_string());
            }
        }
        "KeyError" => {
            if !message.is_empty() {
                // KeyError messages are the repr of the key.
                vars.insert("key", message.to_string());
            }
        }
        _ => {}
    }

    vars
}

/// Substitute `{placeholder}` slots; `None` if any slot has no value.
fn fill(template: &str, vars: &FxHashMap<&'static str, String>) -> Option<String> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let (head, tail) = rest.split_at(start);
        out.push_str(head);
        let end = tail.find('}')?;
        out.push_str(vars.get(&tail[1..end])?);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn structured(kind: &str, message: &str) -> RawTrace {
        RawTrace::structured(kind, message, format!("{}: {}", kind, message))
    }

    #[test]
    fn test_missing_dependency_uses_alias_table() {
        let trace = structured("ModuleNotFoundError", "No module named 'cv2'");
        let classified = classify(&trace);

        assert_eq!(classified.category, ErrorCategory::MissingDependency);
        assert_eq!(classified.explanation, "Module 'cv2' is not installed.");
        assert_eq!(
            classified.remediation.as_deref(),
            Some("pip install opencv-python")
        );
        assert_eq!(classified.trace, trace);
    }

    #[test]
    fn test_sklearn_maps_to_scikit_learn() {
        let trace = structured("ModuleNotFoundError", "No module named 'sklearn.cluster'");
        let classified = classify(&trace);
        assert_eq!(
            classified.remediation.as_deref(),
            Some("pip install scikit-learn")
        );
    }

    #[test]
    fn test_unaliased_module_passes_through() {
        let trace = structured("ModuleNotFoundError", "No module named 'numpyy'");
        let classified = classify(&trace);
        assert_eq!(classified.remediation.as_deref(), Some("pip install numpyy"));
    }

    #[test]
    fn test_exact_kind_beats_base_kind() {
        // ModuleNotFoundError subclasses ImportError; the exact rule must win.
        let classified = classify(&structured(
            "ModuleNotFoundError",
            "No module named 'yaml'",
        ));
        assert_eq!(classified.explanation, "Module 'yaml' is not installed.");
        assert_eq!(classified.remediation.as_deref(), Some("pip install pyyaml"));
    }

    #[test]
    fn test_undefined_name_extraction() {
        let classified = classify(&structured("NameError", "name 'df' is not defined"));
        assert_eq!(classified.category, ErrorCategory::UndefinedName);
        assert_eq!(classified.explanation, "Name 'df' is not defined.");
        assert!(classified.remediation.unwrap().contains("'df'"));
    }

    #[test]
    fn test_missing_path_extraction() {
        let classified = classify(&structured(
            "FileNotFoundError",
            "[Errno 2] No such file or directory: 'data.csv'",
        ));
        assert_eq!(classified.category, ErrorCategory::MissingPath);
        assert_eq!(
            classified.explanation,
            "File or directory not found: 'data.csv'."
        );
    }

    #[test]
    fn test_attribute_error_fills_both_slots() {
        let classified = classify(&structured(
            "AttributeError",
            "'NoneType' object has no attribute 'head'",
        ));
        assert_eq!(classified.category, ErrorCategory::TypeMismatch);
        assert_eq!(
            classified.explanation,
            "'NoneType' object has no attribute 'head'."
        );
    }

    #[test]
    fn test_unknown_kind_is_unclassified_with_verbatim_trace() {
        let trace = structured("FrobnicationError", "the frobnicator jammed");
        let classified = classify(&trace);

        assert_eq!(classified.category, ErrorCategory::Unclassified);
        assert!(classified.remediation.is_none());
        assert_eq!(
            classified.explanation,
            "FrobnicationError: the frobnicator jammed"
        );
        assert_eq!(classified.trace.rendered, trace.rendered);
    }

    #[test]
    fn test_fix_hint_tier_stays_unclassified() {
        let classified = classify(&structured("ZeroDivisionError", "division by zero"));
        assert_eq!(classified.category, ErrorCategory::Unclassified);
        assert_eq!(classified.explanation, "Division by zero.");
        assert!(classified.remediation.is_some());
    }

    #[test]
    fn test_text_fallback_parses_rendered_traceback() {
        let rendered = "Traceback (most recent call last):\n  File \"cell.py\", line 3, in <module>\n    import cv2\nModuleNotFoundError: No module named 'cv2'";
        let trace = RawTrace::from_text(rendered);
        let classified = classify(&trace);

        assert_eq!(classified.category, ErrorCategory::MissingDependency);
        assert_eq!(
            classified.remediation.as_deref(),
            Some("pip install opencv-python")
        );
    }

    #[test]
    fn test_text_fallback_bare_interrupt_line() {
        let rendered = "Traceback (most recent call last):\n  File \"cell.py\", line 1, in <module>\nKeyboardInterrupt";
        let classified = classify(&RawTrace::from_text(rendered));
        assert_eq!(classified.category, ErrorCategory::Interrupted);
    }

    #[test]
    fn test_text_fallback_location_in_default_explanation() {
        let rendered = "Traceback (most recent call last):\n  File \"cell.py\", line 7, in compute\n    x = frob()\nWeirdError: novel failure";
        let classified = classify(&RawTrace::from_text(rendered));
        assert_eq!(classified.category, ErrorCategory::Unclassified);
        assert_eq!(
            classified.explanation,
            "WeirdError at cell.py:7: novel failure"
        );
    }

    #[test]
    fn test_unfilled_action_template_drops_remediation() {
        // NameError rule's action needs {name}; a message that does not
        // match the pattern must not produce a half-filled suggestion.
        let classified = classify(&structured("NameError", "free variable referenced"));
        assert_eq!(classified.category, ErrorCategory::UndefinedName);
        assert!(classified.remediation.is_none());
    }

    #[test]
    fn test_promote_to_timeout() {
        let classified = classify(&structured("KeyboardInterrupt", ""));
        assert_eq!(classified.category, ErrorCategory::Interrupted);

        let promoted = classified.promote_to_timeout();
        assert_eq!(promoted.category, ErrorCategory::Timeout);
        assert!(promoted.remediation.is_some());

        // Non-interrupts are left alone.
        let other = classify(&structured("ValueError", "bad value")).promote_to_timeout();
        assert_eq!(other.category, ErrorCategory::Unclassified);
    }

    #[test]
    fn test_import_error_with_source_module() {
        let classified = classify(&structured(
            "ImportError",
            "cannot import name 'frob' from 'sklearn.utils'",
        ));
        assert_eq!(classified.category, ErrorCategory::MissingDependency);
        assert_eq!(
            classified.remediation.as_deref(),
            Some("pip install scikit-learn")
        );
    }
}
