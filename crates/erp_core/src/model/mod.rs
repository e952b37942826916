//! Domain model shared by the reconciliation engine, repositories and services.
//!
//! # Responsibility
//! - Define identities and the dynamic `Record` shape every entity travels in.
//! - Hold the static entity schema registry (tables, allowlists, decimals).
//! - Define client intents and aggregate read models.
//!
//! # Invariants
//! - `id` is assigned by storage on insert and never rewritten.
//! - Records carry scalar values only (string, number, bool, null).

pub mod aggregate;
pub mod intent;
pub mod schema;

use serde_json::{Map, Value};

/// Storage-assigned numeric identity.
pub type EntityId = i64;

/// Entity-shaped object keyed by column name.
pub type Record = Map<String, Value>;

/// Column holding the storage identity in every table.
pub const ID_FIELD: &str = "id";

/// Reads the storage identity out of a record, if present and integral.
pub fn record_id(record: &Record) -> Option<EntityId> {
    record.get(ID_FIELD).and_then(Value::as_i64)
}
