//! Core domain logic for the ERP backend.
//! Reconciles client-declared aggregate changes against SQLite storage.

pub mod db;
pub mod logging;
pub mod model;
pub mod reconcile;
pub mod repo;
pub mod service;

pub use db::{open_db, open_db_in_memory, DbError, DbResult};
pub use logging::{
    default_log_level, init_logging, logging_status, LogTarget, LoggingConfig, LoggingError,
};
pub use model::aggregate::{ClientAggregate, ProductAggregate};
pub use model::intent::{
    ClientPayload, IdRef, ProcessRef, ProcessStepDraft, ProductPayload, ReconciliationIntent,
    UpdatedItem,
};
pub use model::schema::{editable_allowlist, EntityKind};
pub use model::{EntityId, Record};
pub use reconcile::{diff, filter_editable, normalize, reconcile, DiffResult, ReconcileError};
pub use repo::record_repo::{RecordRepository, RepoError, RepoResult, SqliteRecordRepository};
pub use service::client_service::ClientService;
pub use service::entity_service::EntityService;
pub use service::product_service::ProductService;
pub use service::{ServiceError, ServiceResult};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
