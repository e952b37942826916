//! Aggregate orchestration steps shared by every write use case.
//!
//! # Responsibility
//! - Open the single transaction a use case runs in.
//! - Run uniqueness and reference checks for the values about to be written.
//! - Apply scalar diffs and collection plans through borrowed repositories.
//! - Emit one start/finish log pair per use case, tagged with an `op_id`.
//!
//! # Invariants
//! - Helpers here take `&Connection`; callers pass their open transaction, so
//!   no helper ever begins or commits on its own.
//! - A use case that finds nothing to change drops its transaction before
//!   the first write.
//! - Plans are applied delete -> update -> create; updates that move an
//!   ordering key go through a temporary negative value first.

use crate::model::aggregate::{ClientAggregate, ProductAggregate};
use crate::model::schema::EntityKind;
use crate::model::{record_id, EntityId, Record};
use crate::reconcile::diff::DiffResult;
use crate::reconcile::filter::filter_for;
use crate::reconcile::normalize::normalize_for;
use crate::reconcile::plan::{temporary_value, CollectionPlan, UpdateOp};
use crate::repo::record_repo::{
    ConstraintKind, RecordRepository, RepoError, SqliteRecordRepository,
};
use crate::service::{ServiceError, ServiceResult};
use log::{debug, error, info};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde_json::Value;
use std::time::Instant;
use uuid::Uuid;

/// Whether a write use case touched storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Nothing differed; the transaction was dropped without a write.
    Unchanged,
    Applied,
}

/// Row counts written by one collection plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PlanStats {
    pub deleted: usize,
    pub updated: usize,
    pub created: usize,
}

impl PlanStats {
    pub fn merge(self, other: PlanStats) -> PlanStats {
        PlanStats {
            deleted: self.deleted + other.deleted,
            updated: self.updated + other.updated,
            created: self.created + other.created,
        }
    }
}

/// Values that can report the identity of the row a use case produced.
pub trait Identified {
    fn entity_id(&self) -> Option<EntityId>;
}

impl Identified for Record {
    fn entity_id(&self) -> Option<EntityId> {
        record_id(self)
    }
}

impl Identified for ProductAggregate {
    fn entity_id(&self) -> Option<EntityId> {
        record_id(&self.product)
    }
}

impl Identified for ClientAggregate {
    fn entity_id(&self) -> Option<EntityId> {
        record_id(&self.client)
    }
}

impl Identified for () {
    fn entity_id(&self) -> Option<EntityId> {
        None
    }
}

/// Start/finish logging for one use case invocation.
pub(crate) struct OperationLog {
    event: &'static str,
    entity: EntityKind,
    id: Option<EntityId>,
    op_id: Uuid,
    started_at: Instant,
}

impl OperationLog {
    pub(crate) fn start(event: &'static str, entity: EntityKind, id: Option<EntityId>) -> Self {
        let op_id = Uuid::new_v4();
        info!(
            "event={} module=service status=start op_id={} entity={} id={}",
            event,
            op_id,
            entity,
            display_id(id)
        );
        Self {
            event,
            entity,
            id,
            op_id,
            started_at: Instant::now(),
        }
    }

    /// Logs the result and strips the outcome marker.
    pub(crate) fn finish<T: Identified>(
        self,
        result: ServiceResult<(T, WriteOutcome)>,
    ) -> ServiceResult<T> {
        let duration_ms = self.started_at.elapsed().as_millis();
        match result {
            Ok((value, outcome)) => {
                let status = match outcome {
                    WriteOutcome::Unchanged => "noop",
                    WriteOutcome::Applied => "ok",
                };
                info!(
                    "event={} module=service status={} op_id={} entity={} id={} duration_ms={}",
                    self.event,
                    status,
                    self.op_id,
                    self.entity,
                    display_id(value.entity_id().or(self.id)),
                    duration_ms
                );
                Ok(value)
            }
            Err(err) => {
                error!(
                    "event={} module=service status=error op_id={} entity={} id={} duration_ms={} error_code={} status_code={}",
                    self.event,
                    self.op_id,
                    self.entity,
                    display_id(self.id),
                    duration_ms,
                    err.code(),
                    err.status_code()
                );
                Err(err)
            }
        }
    }
}

fn display_id(id: Option<EntityId>) -> String {
    id.map_or_else(|| "-".to_string(), |id| id.to_string())
}

/// Opens the use-case transaction. Dropping it without commit rolls back.
pub(crate) fn begin(conn: &mut Connection) -> ServiceResult<Transaction<'_>> {
    Ok(conn.transaction_with_behavior(TransactionBehavior::Immediate)?)
}

pub(crate) fn repository(
    conn: &Connection,
    kind: EntityKind,
) -> ServiceResult<SqliteRecordRepository<'_>> {
    Ok(SqliteRecordRepository::try_new(conn, kind)?)
}

/// Loads one row, failing with `NotFound` when it does not exist.
pub(crate) fn require_record(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
) -> ServiceResult<Record> {
    repository(conn, kind)?
        .find_by_id(id)?
        .ok_or(ServiceError::NotFound { entity: kind, id })
}

pub(crate) fn load_children(
    conn: &Connection,
    kind: EntityKind,
    parent_id: EntityId,
) -> ServiceResult<Vec<Record>> {
    Ok(repository(conn, kind)?.find_all_by_parent(parent_id)?)
}

/// Checks every unique column present in `values` against storage.
///
/// `own_id` is the row being written, whose current values never conflict.
pub(crate) fn ensure_unique_fields(
    conn: &Connection,
    kind: EntityKind,
    own_id: Option<EntityId>,
    values: &Record,
) -> ServiceResult<()> {
    let repo = repository(conn, kind)?;
    for &field in kind.schema().unique_fields {
        let Some(value) = values.get(field).filter(|value| !value.is_null()) else {
            continue;
        };
        if let Some(holder) = repo.find_by_unique_field(field, value)? {
            if own_id.is_none() || record_id(&holder) != own_id {
                return Err(ServiceError::Conflict {
                    entity: kind,
                    field,
                    value: value.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Checks that every reference column present in `values` points at an
/// existing row.
pub(crate) fn ensure_references(
    conn: &Connection,
    kind: EntityKind,
    values: &Record,
) -> ServiceResult<()> {
    for reference in kind.schema().references {
        let Some(target_id) = values.get(reference.field).and_then(Value::as_i64) else {
            continue;
        };
        require_record(conn, reference.target, target_id)?;
    }
    Ok(())
}

/// Runs reference checks for every row a plan is about to write.
pub(crate) fn ensure_plan_references(
    conn: &Connection,
    plan: &CollectionPlan<Record>,
) -> ServiceResult<()> {
    for op in &plan.to_update {
        ensure_references(conn, plan.kind, op.changes.changes())?;
    }
    for row in &plan.to_create {
        ensure_references(conn, plan.kind, row)?;
    }
    Ok(())
}

/// Filters, normalizes, checks and inserts a root row.
pub(crate) fn insert_root(
    conn: &Connection,
    kind: EntityKind,
    payload: &Record,
) -> ServiceResult<Record> {
    let values = normalize_for(kind, &filter_for(kind, payload));
    ensure_unique_fields(conn, kind, None, &values)?;
    ensure_references(conn, kind, &values)?;
    repository(conn, kind)?
        .create(&values)
        .map_err(|err| write_error(kind, err))
}

/// Checks and writes a non-empty scalar diff onto an existing root.
pub(crate) fn apply_scalar_diff(
    conn: &Connection,
    kind: EntityKind,
    id: EntityId,
    diff: &DiffResult,
) -> ServiceResult<()> {
    if diff.is_empty() {
        return Ok(());
    }
    ensure_unique_fields(conn, kind, Some(id), diff.changes())?;
    ensure_references(conn, kind, diff.changes())?;
    repository(conn, kind)?
        .update(id, diff.changes())
        .map_err(|err| write_error(kind, err))?;
    Ok(())
}

/// Applies one collection plan: delete, then update, then create.
pub(crate) fn apply_plan(
    conn: &Connection,
    plan: &CollectionPlan<Record>,
) -> ServiceResult<PlanStats> {
    let repo = repository(conn, plan.kind)?;
    let write = |err| write_error(plan.kind, err);

    for id in &plan.to_delete {
        repo.delete(*id)
            .map_err(|err| delete_error(plan.kind, *id, err))?;
    }

    if plan.requires_two_phase() {
        defer_parked_references(conn, plan)?;
        apply_updates_two_phase(&repo, plan).map_err(write)?;
    } else {
        for op in &plan.to_update {
            repo.update(op.id, op.changes.changes()).map_err(write)?;
        }
    }

    for row in &plan.to_create {
        repo.create(row).map_err(write)?;
    }

    let stats = PlanStats {
        deleted: plan.to_delete.len(),
        updated: plan.to_update.len(),
        created: plan.to_create.len(),
    };
    debug!(
        "event=collection_apply module=service entity={} parent_id={} deleted={} updated={} created={} two_phase={}",
        plan.kind,
        plan.parent_id,
        stats.deleted,
        stats.updated,
        stats.created,
        plan.requires_two_phase()
    );
    Ok(stats)
}

/// Parked values of reference columns point at no row; their foreign-key
/// checks move to commit time, when every final value is in place.
fn defer_parked_references(
    conn: &Connection,
    plan: &CollectionPlan<Record>,
) -> ServiceResult<()> {
    let schema = plan.kind.schema();
    let parks_reference = schema.guarded_fields().iter().any(|field| {
        schema.references.iter().any(|reference| reference.field == *field)
            && plan.to_update.iter().any(|op| op.touches(field))
    });
    if parks_reference {
        conn.execute_batch("PRAGMA defer_foreign_keys = ON;")?;
    }
    Ok(())
}

/// Phase one parks every row that moves a per-parent unique value on
/// temporary values (together with its other changes); phase two writes
/// the final values once every target slot is free.
fn apply_updates_two_phase(
    repo: &SqliteRecordRepository<'_>,
    plan: &CollectionPlan<Record>,
) -> Result<(), RepoError> {
    let guarded = plan.kind.schema().guarded_fields();
    let (moving, direct): (Vec<&UpdateOp>, Vec<&UpdateOp>) = plan
        .to_update
        .iter()
        .partition(|op| guarded.iter().any(|field| op.touches(field)));

    for op in direct {
        repo.update(op.id, op.changes.changes())?;
    }

    for (slot, op) in moving.iter().enumerate() {
        let mut parked = op.changes.changes().clone();
        for field in guarded.iter().filter(|field| op.touches(field)) {
            let value = temporary_value(plan.parking_base, slot);
            parked.insert(field.to_string(), Value::from(value));
        }
        repo.update(op.id, &parked)?;
    }

    for op in &moving {
        let mut settled = Record::new();
        for &field in &guarded {
            if let Some(value) = op.changes.get(field) {
                settled.insert(field.to_string(), value.clone());
            }
        }
        repo.update(op.id, &settled)?;
    }

    Ok(())
}

/// Deletes every child row of `kind` owned by `parent_id`.
pub(crate) fn delete_children(
    conn: &Connection,
    kind: EntityKind,
    parent_id: EntityId,
) -> ServiceResult<usize> {
    let repo = repository(conn, kind)?;
    let children = repo.find_all_by_parent(parent_id)?;
    for child in &children {
        let id = record_id(child)
            .ok_or_else(|| ServiceError::Internal(format!("{kind} row without id")))?;
        repo.delete(id).map_err(|err| delete_error(kind, id, err))?;
    }
    Ok(children.len())
}

/// Maps storage write failures to the service taxonomy.
///
/// A unique violation that slipped past the pre-checks stays a storage
/// error, reported as 409.
pub(crate) fn write_error(kind: EntityKind, err: RepoError) -> ServiceError {
    if err.constraint_kind() == Some(ConstraintKind::Unique) {
        error!(
            "event=constraint_violation module=service status=error entity={} constraint=unique",
            kind
        );
    }
    ServiceError::from(err)
}

/// Maps a failed delete; a foreign-key violation means the row is still
/// referenced by another entity.
pub(crate) fn delete_error(kind: EntityKind, id: EntityId, err: RepoError) -> ServiceError {
    match err.constraint_kind() {
        Some(ConstraintKind::ForeignKey) => ServiceError::StillReferenced { entity: kind, id },
        _ => write_error(kind, err),
    }
}
