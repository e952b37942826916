//! Field diff engine.
//!
//! # Invariants
//! - A key of the desired view is reported iff it is absent from the existing
//!   view or its value differs structurally.
//! - `diff(x, x)` is empty for every normalized `x`.
//! - An empty result means "nothing to write"; callers must not persist or
//!   re-fetch in that case.

use crate::model::schema::EntityKind;
use crate::model::Record;
use crate::reconcile::filter::filter_for;
use crate::reconcile::normalize::normalize_for;
use serde::Serialize;
use serde_json::Value;

/// Changed fields mapped to their new normalized value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DiffResult {
    changes: Record,
}

impl DiffResult {
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.changes.get(field)
    }

    pub fn changes(&self) -> &Record {
        &self.changes
    }

    /// Changed field names in key order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }
}

/// Computes the minimal changed-field set between two normalized snapshots.
pub fn diff(existing: &Record, desired: &Record) -> DiffResult {
    let changes = desired
        .iter()
        .filter(|(key, value)| existing.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    DiffResult { changes }
}

/// Runs the full scalar pipeline for one entity: allowlist filter,
/// normalization of both sides, then diff.
pub fn diff_editable(kind: EntityKind, existing: &Record, payload: &Record) -> DiffResult {
    let desired = normalize_for(kind, &filter_for(kind, payload));
    let current = normalize_for(kind, existing);
    diff(&current, &desired)
}
