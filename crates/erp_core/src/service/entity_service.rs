//! Flat entity use-case service.
//!
//! # Responsibility
//! - Create, update, delete and load catalog entities that own no child
//!   collections: inputs, processes, locations and production lines.
//!
//! # Invariants
//! - Writes go through the same allowlist filter, decimal normalization and
//!   uniqueness checks as aggregate roots.
//! - An update with an empty diff writes nothing.
//! - Deleting a row still referenced by a product fails with
//!   `StillReferenced`.

use crate::model::schema::EntityKind;
use crate::model::{EntityId, Record};
use crate::reconcile::diff::diff_editable;
use crate::repo::record_repo::RecordRepository;
use crate::service::aggregate::{
    apply_scalar_diff, begin, delete_error, insert_root, repository, require_record,
    OperationLog, WriteOutcome,
};
use crate::service::{ServiceError, ServiceResult};
use rusqlite::Connection;

/// Entity types served by [`EntityService`].
pub const FLAT_ENTITY_KINDS: [EntityKind; 4] = [
    EntityKind::Input,
    EntityKind::Process,
    EntityKind::Location,
    EntityKind::ProductionLine,
];

/// Single-table service for one flat entity type.
pub struct EntityService<'conn> {
    conn: &'conn mut Connection,
    kind: EntityKind,
}

impl<'conn> EntityService<'conn> {
    /// Creates a service for `kind`, rejecting aggregate roots and children.
    pub fn new(conn: &'conn mut Connection, kind: EntityKind) -> ServiceResult<Self> {
        if !FLAT_ENTITY_KINDS.contains(&kind) {
            return Err(ServiceError::UnsupportedEntity(kind));
        }
        Ok(Self { conn, kind })
    }

    pub fn kind(&self) -> EntityKind {
        self.kind
    }

    pub fn get(&self, id: EntityId) -> ServiceResult<Record> {
        require_record(self.conn, self.kind, id)
    }

    pub fn create(&mut self, payload: &Record) -> ServiceResult<Record> {
        let log = OperationLog::start("entity_create", self.kind, None);
        let result = self.create_inner(payload);
        log.finish(result)
    }

    pub fn update(&mut self, id: EntityId, payload: &Record) -> ServiceResult<Record> {
        let log = OperationLog::start("entity_update", self.kind, Some(id));
        let result = self.update_inner(id, payload);
        log.finish(result)
    }

    pub fn delete(&mut self, id: EntityId) -> ServiceResult<()> {
        let log = OperationLog::start("entity_delete", self.kind, Some(id));
        let result = self.delete_inner(id);
        log.finish(result)
    }

    fn create_inner(&mut self, payload: &Record) -> ServiceResult<(Record, WriteOutcome)> {
        let kind = self.kind;
        let tx = begin(self.conn)?;
        let created = insert_root(&tx, kind, payload)?;
        tx.commit()?;
        Ok((created, WriteOutcome::Applied))
    }

    fn update_inner(
        &mut self,
        id: EntityId,
        payload: &Record,
    ) -> ServiceResult<(Record, WriteOutcome)> {
        let kind = self.kind;
        let tx = begin(self.conn)?;
        let current = require_record(&tx, kind, id)?;
        let changes = diff_editable(kind, &current, payload);
        if changes.is_empty() {
            return Ok((current, WriteOutcome::Unchanged));
        }

        apply_scalar_diff(&tx, kind, id, &changes)?;
        let saved = require_record(&tx, kind, id)?;
        tx.commit()?;
        Ok((saved, WriteOutcome::Applied))
    }

    fn delete_inner(&mut self, id: EntityId) -> ServiceResult<((), WriteOutcome)> {
        let kind = self.kind;
        let tx = begin(self.conn)?;
        require_record(&tx, kind, id)?;
        repository(&tx, kind)?
            .delete(id)
            .map_err(|err| delete_error(kind, id, err))?;
        tx.commit()?;
        Ok(((), WriteOutcome::Applied))
    }
}
