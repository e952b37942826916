//! Client-declared change intents.
//!
//! # Responsibility
//! - Describe the validated payloads handed to aggregate services.
//! - Model per-collection `{added, updated, deleted}` reconciliation intents.
//!
//! # Invariants
//! - Payloads are already shape-checked upstream; only business rules
//!   (ownership, uniqueness, references) are enforced by the core.
//! - An identity may appear in at most one of `updated` / `deleted`.

use crate::model::{EntityId, Record};
use serde::{Deserialize, Serialize};

/// Partial update for one existing child row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdatedItem {
    pub id: EntityId,
    #[serde(flatten)]
    pub fields: Record,
}

/// Reference to an existing child row slated for removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRef {
    pub id: EntityId,
}

impl From<EntityId> for IdRef {
    fn from(id: EntityId) -> Self {
        Self { id }
    }
}

/// Desired changes for one child collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationIntent<A> {
    /// New rows, without identity.
    #[serde(default = "Vec::new")]
    pub added: Vec<A>,
    /// Partial payloads keyed by existing identity.
    #[serde(default)]
    pub updated: Vec<UpdatedItem>,
    /// Existing identities to remove.
    #[serde(default)]
    pub deleted: Vec<IdRef>,
}

impl<A> Default for ReconciliationIntent<A> {
    fn default() -> Self {
        Self {
            added: Vec::new(),
            updated: Vec::new(),
            deleted: Vec::new(),
        }
    }
}

impl<A> ReconciliationIntent<A> {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty()
    }
}

/// How a new process step points at its process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessRef {
    /// Reuse an existing process row.
    ByReference { id: EntityId },
    /// Create the process inside the same transaction.
    ByInlineDefinition {
        name: String,
        #[serde(default)]
        description: Option<String>,
    },
}

/// New process step row plus its process reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStepDraft {
    pub process: ProcessRef,
    #[serde(flatten)]
    pub fields: Record,
}

/// New child rows whose scalar part is planned like any other record.
pub trait ChildDraft {
    fn fields(&self) -> &Record;
    fn fields_mut(&mut self) -> &mut Record;
}

impl ChildDraft for Record {
    fn fields(&self) -> &Record {
        self
    }

    fn fields_mut(&mut self) -> &mut Record {
        self
    }
}

impl ChildDraft for ProcessStepDraft {
    fn fields(&self) -> &Record {
        &self.fields
    }

    fn fields_mut(&mut self) -> &mut Record {
        &mut self.fields
    }
}

/// Validated product payload: scalar fields plus one intent per collection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductPayload {
    #[serde(flatten)]
    pub fields: Record,
    #[serde(default)]
    pub inputs_manager: ReconciliationIntent<Record>,
    #[serde(default)]
    pub processes_manager: ReconciliationIntent<ProcessStepDraft>,
    #[serde(default)]
    pub discount_ranges_manager: ReconciliationIntent<Record>,
}

/// Validated client payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClientPayload {
    #[serde(flatten)]
    pub fields: Record,
    #[serde(default)]
    pub discounts_manager: ReconciliationIntent<Record>,
}
