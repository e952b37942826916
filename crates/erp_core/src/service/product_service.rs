//! Product aggregate use-case service.
//!
//! # Responsibility
//! - Create, update, delete and load a product together with its inputs,
//!   process steps and discount ranges.
//! - Resolve process references of new steps, creating inline processes in
//!   the same transaction.
//!
//! # Invariants
//! - One use case runs in exactly one transaction; any failure rolls back
//!   every write it made, inline processes included.
//! - An update whose scalar diff and collection plans are all empty writes
//!   nothing and returns the current aggregate.
//! - Discount ranges of one product never overlap after commit.

use crate::model::aggregate::ProductAggregate;
use crate::model::intent::{ProcessRef, ProcessStepDraft, ProductPayload};
use crate::model::schema::EntityKind;
use crate::model::{record_id, EntityId, Record};
use crate::reconcile::diff::{diff_editable, DiffResult};
use crate::reconcile::plan::{reconcile, CollectionPlan};
use crate::repo::record_repo::RecordRepository;
use crate::service::aggregate::{
    apply_plan, apply_scalar_diff, begin, delete_children, delete_error, ensure_plan_references,
    insert_root, load_children, repository, require_record, OperationLog, PlanStats,
    WriteOutcome,
};
use crate::service::{ServiceError, ServiceResult};
use log::debug;
use rusqlite::Connection;
use serde_json::Value;

const CHILD_KINDS: [EntityKind; 3] = [
    EntityKind::ProductInput,
    EntityKind::ProcessStep,
    EntityKind::DiscountRange,
];

/// Product aggregate service over one SQLite connection.
pub struct ProductService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> ProductService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    /// Loads one product aggregate.
    pub fn get(&self, id: EntityId) -> ServiceResult<ProductAggregate> {
        load_product(self.conn, id)
    }

    /// Creates a product and its initial child rows in one transaction.
    ///
    /// Collection intents may only carry `added` items; `updated` / `deleted`
    /// ids cannot be owned by a product that does not exist yet and fail with
    /// `NotFound`.
    pub fn create(&mut self, payload: ProductPayload) -> ServiceResult<ProductAggregate> {
        let log = OperationLog::start("product_create", EntityKind::Product, None);
        let result = self.create_inner(payload);
        log.finish(result)
    }

    /// Applies a product payload to an existing aggregate.
    pub fn update(
        &mut self,
        id: EntityId,
        payload: ProductPayload,
    ) -> ServiceResult<ProductAggregate> {
        let log = OperationLog::start("product_update", EntityKind::Product, Some(id));
        let result = self.update_inner(id, payload);
        log.finish(result)
    }

    /// Deletes a product and every row it owns.
    pub fn delete(&mut self, id: EntityId) -> ServiceResult<()> {
        let log = OperationLog::start("product_delete", EntityKind::Product, Some(id));
        let result = self.delete_inner(id);
        log.finish(result)
    }

    fn create_inner(
        &mut self,
        payload: ProductPayload,
    ) -> ServiceResult<(ProductAggregate, WriteOutcome)> {
        let tx = begin(self.conn)?;
        let root = insert_root(&tx, EntityKind::Product, &payload.fields)?;
        let id = record_id(&root)
            .ok_or_else(|| ServiceError::Internal("created product has no id".to_string()))?;

        let existing = ProductAggregate {
            product: root,
            inputs: Vec::new(),
            process_steps: Vec::new(),
            discount_ranges: Vec::new(),
        };
        let mut changes = plan_product(id, &existing, payload)?;
        changes.root = DiffResult::default();
        apply_product_changes(&tx, id, changes)?;

        let saved = load_product(&tx, id)?;
        ensure_ranges_disjoint(&saved.discount_ranges)?;
        tx.commit()?;
        Ok((saved, WriteOutcome::Applied))
    }

    fn update_inner(
        &mut self,
        id: EntityId,
        payload: ProductPayload,
    ) -> ServiceResult<(ProductAggregate, WriteOutcome)> {
        let tx = begin(self.conn)?;
        let current = load_product(&tx, id)?;
        let changes = plan_product(id, &current, payload)?;
        if changes.is_empty() {
            return Ok((current, WriteOutcome::Unchanged));
        }

        apply_product_changes(&tx, id, changes)?;
        let saved = load_product(&tx, id)?;
        ensure_ranges_disjoint(&saved.discount_ranges)?;
        tx.commit()?;
        Ok((saved, WriteOutcome::Applied))
    }

    fn delete_inner(&mut self, id: EntityId) -> ServiceResult<((), WriteOutcome)> {
        let tx = begin(self.conn)?;
        require_record(&tx, EntityKind::Product, id)?;
        for kind in CHILD_KINDS {
            delete_children(&tx, kind, id)?;
        }
        repository(&tx, EntityKind::Product)?
            .delete(id)
            .map_err(|err| delete_error(EntityKind::Product, id, err))?;
        tx.commit()?;
        Ok(((), WriteOutcome::Applied))
    }
}

/// Reads a product root and its collections in storage order.
pub(crate) fn load_product(conn: &Connection, id: EntityId) -> ServiceResult<ProductAggregate> {
    let product = require_record(conn, EntityKind::Product, id)?;
    Ok(ProductAggregate {
        product,
        inputs: load_children(conn, EntityKind::ProductInput, id)?,
        process_steps: load_children(conn, EntityKind::ProcessStep, id)?,
        discount_ranges: load_children(conn, EntityKind::DiscountRange, id)?,
    })
}

struct ProductChanges {
    root: DiffResult,
    inputs: CollectionPlan<Record>,
    steps: CollectionPlan<ProcessStepDraft>,
    ranges: CollectionPlan<Record>,
}

impl ProductChanges {
    fn is_empty(&self) -> bool {
        self.root.is_empty()
            && self.inputs.is_empty()
            && self.steps.is_empty()
            && self.ranges.is_empty()
    }
}

fn plan_product(
    id: EntityId,
    current: &ProductAggregate,
    payload: ProductPayload,
) -> ServiceResult<ProductChanges> {
    let root = diff_editable(EntityKind::Product, &current.product, &payload.fields);
    let inputs = reconcile(
        EntityKind::ProductInput,
        id,
        &current.inputs,
        payload.inputs_manager,
    )?;
    let steps = reconcile(
        EntityKind::ProcessStep,
        id,
        &current.process_steps,
        payload.processes_manager,
    )?;
    let ranges = reconcile(
        EntityKind::DiscountRange,
        id,
        &current.discount_ranges,
        payload.discount_ranges_manager,
    )?;

    debug!(
        "event=product_plan module=service id={} root_changes={} inputs_empty={} steps_empty={} ranges_empty={}",
        id,
        root.len(),
        inputs.is_empty(),
        steps.is_empty(),
        ranges.is_empty()
    );
    Ok(ProductChanges {
        root,
        inputs,
        steps,
        ranges,
    })
}

fn apply_product_changes(
    conn: &Connection,
    id: EntityId,
    changes: ProductChanges,
) -> ServiceResult<PlanStats> {
    apply_scalar_diff(conn, EntityKind::Product, id, &changes.root)?;

    let steps = changes
        .steps
        .try_map_creates(|draft| resolve_process_step(conn, draft))?;

    let mut stats = PlanStats::default();
    for plan in [&changes.inputs, &steps, &changes.ranges] {
        ensure_plan_references(conn, plan)?;
        stats = stats.merge(apply_plan(conn, plan)?);
    }
    Ok(stats)
}

/// Turns a new step draft into a storable row by resolving its process.
fn resolve_process_step(conn: &Connection, draft: ProcessStepDraft) -> ServiceResult<Record> {
    let ProcessStepDraft {
        process,
        mut fields,
    } = draft;

    let process_id = match process {
        ProcessRef::ByReference { id } => {
            require_record(conn, EntityKind::Process, id)?;
            id
        }
        ProcessRef::ByInlineDefinition { name, description } => {
            let mut values = Record::new();
            values.insert("name".to_string(), Value::String(name));
            values.insert(
                "description".to_string(),
                description.map_or(Value::Null, Value::String),
            );
            let created = insert_root(conn, EntityKind::Process, &values)?;
            record_id(&created)
                .ok_or_else(|| ServiceError::Internal("created process has no id".to_string()))?
        }
    };

    fields.insert("process_id".to_string(), Value::from(process_id));
    Ok(fields)
}

/// Rejects inverted or overlapping quantity ranges.
///
/// Bounds are inclusive; a missing `max_quantity` leaves the range open.
fn ensure_ranges_disjoint(ranges: &[Record]) -> ServiceResult<()> {
    let mut bounds = Vec::with_capacity(ranges.len());
    for range in ranges {
        let min = range
            .get("min_quantity")
            .and_then(Value::as_i64)
            .unwrap_or(0);
        let max = range.get("max_quantity").and_then(Value::as_i64);
        if let Some(max) = max.filter(|max| *max < min) {
            return Err(ServiceError::Conflict {
                entity: EntityKind::DiscountRange,
                field: "max_quantity",
                value: Value::from(max),
            });
        }
        bounds.push((min, max));
    }

    bounds.sort_by_key(|(min, _)| *min);
    for pair in bounds.windows(2) {
        let (_, previous_max) = pair[0];
        let (next_min, _) = pair[1];
        if previous_max.map_or(true, |max| max >= next_min) {
            return Err(ServiceError::Conflict {
                entity: EntityKind::DiscountRange,
                field: "min_quantity",
                value: Value::from(next_min),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::ensure_ranges_disjoint;
    use crate::model::Record;
    use crate::service::ServiceError;
    use serde_json::{json, Value};

    fn range(min: i64, max: Value) -> Record {
        match json!({ "min_quantity": min, "max_quantity": max, "unit_price": 1.0 }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn adjacent_ranges_are_accepted() {
        let ranges = vec![range(11, json!(null)), range(1, json!(10))];
        assert!(ensure_ranges_disjoint(&ranges).is_ok());
    }

    #[test]
    fn shared_bound_is_an_overlap() {
        let ranges = vec![range(1, json!(10)), range(10, json!(20))];
        let err = ensure_ranges_disjoint(&ranges).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict {
                field: "min_quantity",
                ..
            }
        ));
    }

    #[test]
    fn open_ended_range_must_be_last() {
        let ranges = vec![range(1, json!(null)), range(50, json!(60))];
        assert!(ensure_ranges_disjoint(&ranges).is_err());
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = ensure_ranges_disjoint(&[range(20, json!(5))]).unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Conflict {
                field: "max_quantity",
                ..
            }
        ));
    }
}
