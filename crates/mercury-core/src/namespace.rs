//! Namespace tracking for execution sessions.
//!
//! Maintains a coarse-grained summary of the names bound in a session's
//! interpreter, reconciled against a shallow listing after every successful
//! execution. The summary is a live projection of the interpreter namespace,
//! never stale beyond one execution's latency.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Coarse kind of a bound value, derived from the provider's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    /// DataFrame-shaped data.
    Tabular,
    /// Figure or image objects.
    Plot,
    /// Primitive values: numbers, strings, booleans.
    Scalar,
    /// Functions, methods, classes.
    Callable,
    /// Built-in containers and arrays.
    Collection,
    /// Anything we cannot place.
    Unknown,
}

impl ValueKind {
    /// Map a provider type tag to a coarse kind.
    pub fn from_type_tag(tag: &str) -> Self {
        match tag {
            "DataFrame" | "Series" => Self::Tabular,
            "Figure" | "Axes" | "AxesSubplot" | "Image" => Self::Plot,
            "int" | "float" | "str" | "bool" | "complex" | "NoneType" => Self::Scalar,
            "function" | "builtin_function_or_method" | "method" | "type" => Self::Callable,
            "list" | "dict" | "tuple" | "set" | "frozenset" | "ndarray" => Self::Collection,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tabular => "tabular",
            Self::Plot => "plot",
            Self::Scalar => "scalar",
            Self::Callable => "callable",
            Self::Collection => "collection",
            Self::Unknown => "unknown",
        }
    }
}

/// One top-level binding reported by the namespace inspector.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceBinding {
    pub name: String,
    /// Provider type tag, e.g. `int` or `DataFrame`.
    pub type_tag: String,
}

impl NamespaceBinding {
    pub fn new(name: impl Into<String>, type_tag: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_tag: type_tag.into(),
        }
    }
}

/// Summary entry for one bound name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceEntry {
    pub kind: ValueKind,
    pub type_tag: String,
}

/// Name -> entry map; ordered for deterministic listings.
pub type NamespaceSummary = BTreeMap<String, NamespaceEntry>;

/// Changes observed in one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceDelta {
    pub added: Vec<String>,
    pub changed: Vec<String>,
    pub removed: Vec<String>,
}

impl NamespaceDelta {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.changed.is_empty() && self.removed.is_empty()
    }
}

/// Per-session namespace tracker.
///
/// State machine: empty -> populated -> empty (on restart). Reconciliation
/// runs only after successful completions; a failed execution leaves the
/// summary untouched.
#[derive(Debug, Default)]
pub struct NamespaceTracker {
    summary: NamespaceSummary,
}

impl NamespaceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current summary snapshot.
    pub fn summary(&self) -> &NamespaceSummary {
        &self.summary
    }

    /// Clear all tracked names. Called on session restart.
    pub fn clear(&mut self) {
        self.summary.clear();
    }

    /// Reconcile the summary against a fresh shallow listing.
    ///
    /// New and retagged names are upserted, vanished names are removed, and
    /// the observed delta is returned. Dunder names are ignored: they are
    /// interpreter plumbing, not user state.
    pub fn apply_listing(&mut self, bindings: Vec<NamespaceBinding>) -> NamespaceDelta {
        let mut next = NamespaceSummary::new();
        for binding in bindings {
            if binding.name.starts_with("__") {
                continue;
            }
            let kind = ValueKind::from_type_tag(&binding.type_tag);
            next.insert(
                binding.name,
                NamespaceEntry {
                    kind,
                    type_tag: binding.type_tag,
                },
            );
        }

        let mut delta = NamespaceDelta::default();
        for (name, entry) in &next {
            match self.summary.get(name) {
                None => delta.added.push(name.clone()),
                Some(previous) if previous != entry => delta.changed.push(name.clone()),
                Some(_) => {}
            }
        }
        for name in self.summary.keys() {
            if !next.contains_key(name) {
                delta.removed.push(name.clone());
            }
        }

        self.summary = next;
        delta
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ValueKind::from_type_tag("DataFrame"), ValueKind::Tabular);
        assert_eq!(ValueKind::from_type_tag("Figure"), ValueKind::Plot);
        assert_eq!(ValueKind::from_type_tag("int"), ValueKind::Scalar);
        assert_eq!(ValueKind::from_type_tag("function"), ValueKind::Callable);
        assert_eq!(ValueKind::from_type_tag("dict"), ValueKind::Collection);
        assert_eq!(ValueKind::from_type_tag("MyThing"), ValueKind::Unknown);
    }

    #[test]
    fn test_apply_listing_tracks_added_and_removed() {
        let mut tracker = NamespaceTracker::new();

        let delta = tracker.apply_listing(vec![
            NamespaceBinding::new("x", "int"),
            NamespaceBinding::new("df", "DataFrame"),
        ]);
        assert_eq!(delta.added, vec!["df".to_string(), "x".to_string()]);
        assert!(delta.changed.is_empty());
        assert!(delta.removed.is_empty());
        assert_eq!(tracker.summary().len(), 2);

        // x deleted, df retagged, y appears
        let delta = tracker.apply_listing(vec![
            NamespaceBinding::new("df", "Series"),
            NamespaceBinding::new("y", "list"),
        ]);
        assert_eq!(delta.added, vec!["y".to_string()]);
        assert_eq!(delta.changed, vec!["df".to_string()]);
        assert_eq!(delta.removed, vec!["x".to_string()]);
        assert!(!tracker.summary().contains_key("x"));
        assert_eq!(tracker.summary()["y"].kind, ValueKind::Collection);
    }

    #[test]
    fn test_dunder_names_are_ignored() {
        let mut tracker = NamespaceTracker::new();
        let delta = tracker.apply_listing(vec![
            NamespaceBinding::new("__builtins__", "module"),
            NamespaceBinding::new("__name__", "str"),
            NamespaceBinding::new("_private", "int"),
        ]);
        assert_eq!(delta.added, vec!["_private".to_string()]);
        assert_eq!(tracker.summary().len(), 1);
    }

    #[test]
    fn test_clear_empties_summary() {
        let mut tracker = NamespaceTracker::new();
        tracker.apply_listing(vec![NamespaceBinding::new("x", "int")]);
        assert!(!tracker.summary().is_empty());

        tracker.clear();
        assert!(tracker.summary().is_empty());
    }

    #[test]
    fn test_identical_listing_yields_empty_delta() {
        let mut tracker = NamespaceTracker::new();
        tracker.apply_listing(vec![NamespaceBinding::new("x", "int")]);
        let delta = tracker.apply_listing(vec![NamespaceBinding::new("x", "int")]);
        assert!(delta.is_empty());
    }
}
