//! Collection reconciler.
//!
//! # Responsibility
//! - Validate a child-collection intent against the rows currently owned by
//!   the parent.
//! - Produce a plan of deletes, effective updates and creates.
//! - Reject plans whose projected state breaks per-parent uniqueness.
//!
//! # Invariants
//! - Ids in `updated` / `deleted` must be owned by the parent being mutated.
//! - No-op updates are dropped, so an unchanged collection yields an empty plan.
//! - Execution order is delete -> update -> create. Updates that move a
//!   per-parent unique value (ordering key or unique assignment) are applied
//!   in two phases through [`temporary_value`].

use crate::model::intent::{ChildDraft, ReconciliationIntent};
use crate::model::schema::{EntityKind, EntitySchema};
use crate::model::{record_id, EntityId, Record};
use crate::reconcile::diff::{diff_editable, DiffResult};
use crate::reconcile::filter::filter_for;
use crate::reconcile::normalize::normalize_for;
use crate::reconcile::ReconcileError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// One effective update of an existing child row.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateOp {
    pub id: EntityId,
    pub changes: DiffResult,
}

impl UpdateOp {
    pub fn touches(&self, field: &str) -> bool {
        self.changes.contains(field)
    }
}

/// Ordered storage operations for one child collection of one parent.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionPlan<A> {
    pub kind: EntityKind,
    pub parent_id: EntityId,
    pub to_delete: Vec<EntityId>,
    pub to_update: Vec<UpdateOp>,
    /// New rows with the parent key already injected.
    pub to_create: Vec<A>,
    /// Upper bound (exclusive) of the temporary values parked during
    /// two-phase updates. Below every guarded value held before or after
    /// the plan runs.
    pub parking_base: i64,
}

impl<A> CollectionPlan<A> {
    pub fn empty(kind: EntityKind, parent_id: EntityId) -> Self {
        Self {
            kind,
            parent_id,
            to_delete: Vec::new(),
            to_update: Vec::new(),
            to_create: Vec::new(),
            parking_base: 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.to_delete.is_empty() && self.to_update.is_empty() && self.to_create.is_empty()
    }

    /// Whether some update moves a per-parent unique value.
    pub fn requires_two_phase(&self) -> bool {
        let guarded = self.kind.schema().guarded_fields();
        self.to_update
            .iter()
            .any(|op| guarded.iter().any(|field| op.touches(field)))
    }

    /// Converts pending creates, e.g. once inline references are resolved.
    pub fn try_map_creates<B, E>(
        self,
        mut convert: impl FnMut(A) -> Result<B, E>,
    ) -> Result<CollectionPlan<B>, E> {
        let mut to_create = Vec::with_capacity(self.to_create.len());
        for draft in self.to_create {
            to_create.push(convert(draft)?);
        }
        Ok(CollectionPlan {
            kind: self.kind,
            parent_id: self.parent_id,
            to_delete: self.to_delete,
            to_update: self.to_update,
            to_create,
            parking_base: self.parking_base,
        })
    }
}

/// Value parked on the `slot`-th moving row between the two update phases.
///
/// Strictly below `parking_base`, so it collides neither with another slot
/// nor with any value the collection holds before or after the plan.
pub fn temporary_value(parking_base: i64, slot: usize) -> i64 {
    let slot = i64::try_from(slot).unwrap_or(i64::MAX);
    parking_base.saturating_sub(1).saturating_sub(slot)
}

/// Plans the reconciliation of one child collection.
///
/// `existing` must be the rows currently stored for `parent_id`.
pub fn reconcile<A: ChildDraft>(
    kind: EntityKind,
    parent_id: EntityId,
    existing: &[Record],
    intent: ReconciliationIntent<A>,
) -> Result<CollectionPlan<A>, ReconcileError> {
    let schema = kind.schema();
    let parent_key = schema
        .parent_key
        .ok_or(ReconcileError::NotACollection(kind))?;

    let owned: BTreeMap<EntityId, &Record> = existing
        .iter()
        .filter(|row| row.get(parent_key).and_then(Value::as_i64) == Some(parent_id))
        .filter_map(|row| record_id(row).map(|id| (id, row)))
        .collect();

    let mut seen = BTreeSet::new();
    for id in intent
        .updated
        .iter()
        .map(|item| item.id)
        .chain(intent.deleted.iter().map(|item| item.id))
    {
        if !seen.insert(id) {
            return Err(ReconcileError::InvalidIntent { entity: kind, id });
        }
    }

    let mut plan = CollectionPlan::empty(kind, parent_id);

    for reference in &intent.deleted {
        if !owned.contains_key(&reference.id) {
            return Err(ReconcileError::NotFound {
                entity: kind,
                id: reference.id,
            });
        }
        plan.to_delete.push(reference.id);
    }

    for item in &intent.updated {
        let current = owned.get(&item.id).ok_or(ReconcileError::NotFound {
            entity: kind,
            id: item.id,
        })?;
        let changes = diff_editable(kind, current, &item.fields);
        if !changes.is_empty() {
            plan.to_update.push(UpdateOp {
                id: item.id,
                changes,
            });
        }
    }

    for mut draft in intent.added {
        let mut fields = normalize_for(kind, &filter_for(kind, draft.fields()));
        fields.insert(parent_key.to_string(), Value::from(parent_id));
        *draft.fields_mut() = fields;
        plan.to_create.push(draft);
    }

    check_projected_state(schema, &owned, &plan)?;
    plan.parking_base = parking_base(schema, &owned, &plan);
    Ok(plan)
}

/// Smallest guarded integer value seen in the stored rows, the updates and
/// the creates, capped at zero.
fn parking_base<A: ChildDraft>(
    schema: &EntitySchema,
    owned: &BTreeMap<EntityId, &Record>,
    plan: &CollectionPlan<A>,
) -> i64 {
    let guarded = schema.guarded_fields();
    let stored = owned.values().copied();
    let updated = plan.to_update.iter().map(|op| op.changes.changes());
    let created = plan.to_create.iter().map(|draft| draft.fields());

    stored
        .chain(updated)
        .chain(created)
        .flat_map(|row| guarded.iter().filter_map(move |field| row.get(*field)))
        .filter_map(Value::as_i64)
        .fold(0, i64::min)
}

/// Rejects plans whose final collection would hold a duplicate ordering key
/// or a duplicate per-parent assignment.
fn check_projected_state<A: ChildDraft>(
    schema: &EntitySchema,
    owned: &BTreeMap<EntityId, &Record>,
    plan: &CollectionPlan<A>,
) -> Result<(), ReconcileError> {
    let guarded = schema.guarded_fields();
    if guarded.is_empty() {
        return Ok(());
    }

    let deleted: BTreeSet<EntityId> = plan.to_delete.iter().copied().collect();
    let updates: BTreeMap<EntityId, &DiffResult> = plan
        .to_update
        .iter()
        .map(|op| (op.id, &op.changes))
        .collect();

    for field in guarded {
        let mut taken = BTreeSet::new();
        let kept_values = owned
            .iter()
            .filter(|(id, _)| !deleted.contains(*id))
            .map(|(id, row)| {
                updates
                    .get(id)
                    .and_then(|changes| changes.get(field))
                    .or_else(|| row.get(field))
            });
        let created_values = plan.to_create.iter().map(|draft| draft.fields().get(field));

        for value in kept_values.chain(created_values).flatten() {
            if value.is_null() {
                continue;
            }
            if !taken.insert(value.to_string()) {
                return Err(ReconcileError::Conflict {
                    entity: schema.kind,
                    field,
                    value: value.clone(),
                });
            }
        }
    }

    Ok(())
}
