//! Aggregate reconciliation engine.
//!
//! # Responsibility
//! - Compute the real delta between a persisted entity and a desired state.
//! - Restrict client-writable fields to the schema allowlist.
//! - Turn per-collection `{added, updated, deleted}` intents into ordered,
//!   constraint-safe plans.
//!
//! # Invariants
//! - Everything in this module is pure: no storage access, no clock.
//! - Both sides of every comparison go through the same normalization.
//! - `diff(normalize(x), normalize(x))` is always empty.

pub mod diff;
pub mod filter;
pub mod normalize;
pub mod plan;

use crate::model::schema::EntityKind;
use crate::model::EntityId;
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use diff::{diff, diff_editable, DiffResult};
pub use filter::{filter_editable, filter_for};
pub use normalize::{decimal_value, normalize, normalize_for};
pub use plan::{reconcile, CollectionPlan, UpdateOp};

/// Business-rule failure detected while planning, before any write.
#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileError {
    /// Referenced child does not exist or belongs to another parent.
    NotFound { entity: EntityKind, id: EntityId },
    /// Projected collection state would hold a duplicate value.
    Conflict {
        entity: EntityKind,
        field: &'static str,
        value: Value,
    },
    /// Identity listed more than once across `updated` / `deleted`.
    InvalidIntent { entity: EntityKind, id: EntityId },
    /// Entity type has no parent key and cannot be reconciled as a collection.
    NotACollection(EntityKind),
}

impl Display for ReconcileError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict {
                entity,
                field,
                value,
            } => write!(f, "{entity}.{field} already holds value {value}"),
            Self::InvalidIntent { entity, id } => write!(
                f,
                "{entity} {id} appears more than once in the reconciliation intent"
            ),
            Self::NotACollection(entity) => {
                write!(f, "{entity} is not a child collection")
            }
        }
    }
}

impl Error for ReconcileError {}
