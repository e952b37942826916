//! Client aggregate use-case service.
//!
//! # Responsibility
//! - Create, update, delete and load a client with its per-product discounts.
//!
//! # Invariants
//! - A client holds at most one discount row per product; duplicates in the
//!   projected collection fail with `Conflict` before any write.
//! - Every discount must point at an existing product.

use crate::model::aggregate::ClientAggregate;
use crate::model::intent::ClientPayload;
use crate::model::schema::EntityKind;
use crate::model::{record_id, EntityId};
use crate::reconcile::diff::diff_editable;
use crate::reconcile::plan::reconcile;
use crate::repo::record_repo::RecordRepository;
use crate::service::aggregate::{
    apply_plan, apply_scalar_diff, begin, delete_children, delete_error, ensure_plan_references,
    insert_root, load_children, repository, require_record, OperationLog, WriteOutcome,
};
use crate::service::{ServiceError, ServiceResult};
use rusqlite::Connection;

/// Client aggregate service over one SQLite connection.
pub struct ClientService<'conn> {
    conn: &'conn mut Connection,
}

impl<'conn> ClientService<'conn> {
    pub fn new(conn: &'conn mut Connection) -> Self {
        Self { conn }
    }

    pub fn get(&self, id: EntityId) -> ServiceResult<ClientAggregate> {
        load_client(self.conn, id)
    }

    pub fn create(&mut self, payload: ClientPayload) -> ServiceResult<ClientAggregate> {
        let log = OperationLog::start("client_create", EntityKind::Client, None);
        let result = self.create_inner(payload);
        log.finish(result)
    }

    pub fn update(
        &mut self,
        id: EntityId,
        payload: ClientPayload,
    ) -> ServiceResult<ClientAggregate> {
        let log = OperationLog::start("client_update", EntityKind::Client, Some(id));
        let result = self.update_inner(id, payload);
        log.finish(result)
    }

    pub fn delete(&mut self, id: EntityId) -> ServiceResult<()> {
        let log = OperationLog::start("client_delete", EntityKind::Client, Some(id));
        let result = self.delete_inner(id);
        log.finish(result)
    }

    fn create_inner(
        &mut self,
        payload: ClientPayload,
    ) -> ServiceResult<(ClientAggregate, WriteOutcome)> {
        let tx = begin(self.conn)?;
        let root = insert_root(&tx, EntityKind::Client, &payload.fields)?;
        let id = record_id(&root)
            .ok_or_else(|| ServiceError::Internal("created client has no id".to_string()))?;

        let discounts = reconcile(
            EntityKind::ClientProductDiscount,
            id,
            &[],
            payload.discounts_manager,
        )?;
        ensure_plan_references(&tx, &discounts)?;
        apply_plan(&tx, &discounts)?;

        let saved = load_client(&tx, id)?;
        tx.commit()?;
        Ok((saved, WriteOutcome::Applied))
    }

    fn update_inner(
        &mut self,
        id: EntityId,
        payload: ClientPayload,
    ) -> ServiceResult<(ClientAggregate, WriteOutcome)> {
        let tx = begin(self.conn)?;
        let current = load_client(&tx, id)?;
        let root = diff_editable(EntityKind::Client, &current.client, &payload.fields);
        let discounts = reconcile(
            EntityKind::ClientProductDiscount,
            id,
            &current.product_discounts,
            payload.discounts_manager,
        )?;
        if root.is_empty() && discounts.is_empty() {
            return Ok((current, WriteOutcome::Unchanged));
        }

        apply_scalar_diff(&tx, EntityKind::Client, id, &root)?;
        ensure_plan_references(&tx, &discounts)?;
        apply_plan(&tx, &discounts)?;

        let saved = load_client(&tx, id)?;
        tx.commit()?;
        Ok((saved, WriteOutcome::Applied))
    }

    fn delete_inner(&mut self, id: EntityId) -> ServiceResult<((), WriteOutcome)> {
        let tx = begin(self.conn)?;
        require_record(&tx, EntityKind::Client, id)?;
        delete_children(&tx, EntityKind::ClientProductDiscount, id)?;
        repository(&tx, EntityKind::Client)?
            .delete(id)
            .map_err(|err| delete_error(EntityKind::Client, id, err))?;
        tx.commit()?;
        Ok(((), WriteOutcome::Applied))
    }
}

fn load_client(conn: &Connection, id: EntityId) -> ServiceResult<ClientAggregate> {
    let client = require_record(conn, EntityKind::Client, id)?;
    Ok(ClientAggregate {
        client,
        product_discounts: load_children(conn, EntityKind::ClientProductDiscount, id)?,
    })
}
