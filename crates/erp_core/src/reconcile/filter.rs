//! Editable field filter.
//!
//! Dropping non-allowlisted keys is a mass-assignment control, not a
//! validation failure: unknown or protected keys vanish silently.

use crate::model::schema::{editable_allowlist, EntityKind};
use crate::model::Record;
use log::debug;
use std::collections::BTreeSet;

/// Keeps only allowlisted keys that are present in `payload`.
pub fn filter_editable(payload: &Record, allowlist: &BTreeSet<&'static str>) -> Record {
    payload
        .iter()
        .filter(|(key, _)| allowlist.contains(key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

/// Applies the registry allowlist of `kind` to `payload`.
pub fn filter_for(kind: EntityKind, payload: &Record) -> Record {
    let filtered = filter_editable(payload, editable_allowlist(kind));
    let dropped = payload.len() - filtered.len();
    if dropped > 0 {
        debug!(
            "event=field_filter module=reconcile status=ok entity={} kept={} dropped={}",
            kind,
            filtered.len(),
            dropped
        );
    }
    filtered
}
