//! Core use-case services.
//!
//! # Responsibility
//! - Orchestrate reconciliation and repository calls into create/update/
//!   delete/get use cases.
//! - Own the transaction of every write use case and hand it to repositories.
//! - Surface one typed error taxonomy that callers map to status codes.
//!
//! # Invariants
//! - Every business-rule failure is raised before commit; a failed use case
//!   leaves storage exactly as it was.
//! - Nothing is swallowed or retried.

pub mod aggregate;
pub mod client_service;
pub mod entity_service;
pub mod product_service;

use crate::model::schema::EntityKind;
use crate::model::EntityId;
use crate::reconcile::ReconcileError;
use crate::repo::record_repo::{ConstraintKind, RepoError};
use serde_json::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Service error for aggregate and entity use cases.
#[derive(Debug)]
pub enum ServiceError {
    /// Root, child or referenced row does not exist (or has another owner).
    NotFound { entity: EntityKind, id: EntityId },
    /// Unique value already held by another row.
    Conflict {
        entity: EntityKind,
        field: &'static str,
        value: Value,
    },
    /// Same identity listed twice in one reconciliation intent.
    InvalidIntent { entity: EntityKind, id: EntityId },
    /// Row cannot be removed while other rows reference it.
    StillReferenced { entity: EntityKind, id: EntityId },
    /// Entity type is not served by the requested facade.
    UnsupportedEntity(EntityKind),
    /// Storage disagreed with a state the service had just observed.
    Internal(String),
    /// Persistence-layer failure.
    Repo(RepoError),
}

impl ServiceError {
    /// HTTP status a controller should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } | Self::StillReferenced { .. } => 409,
            Self::InvalidIntent { .. } | Self::UnsupportedEntity(_) => 400,
            Self::Internal(_) => 500,
            Self::Repo(err) => match err.constraint_kind() {
                Some(ConstraintKind::Unique | ConstraintKind::ForeignKey) => 409,
                Some(ConstraintKind::NotNull | ConstraintKind::Check) => 400,
                None => 500,
            },
        }
    }

    /// Stable machine-readable code, safe to log.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::Conflict { .. } => "conflict",
            Self::InvalidIntent { .. } => "invalid_intent",
            Self::StillReferenced { .. } => "still_referenced",
            Self::UnsupportedEntity(_) => "unsupported_entity",
            Self::Internal(_) => "internal",
            Self::Repo(err) => match err.constraint_kind() {
                Some(_) => "constraint_violation",
                None => "storage_error",
            },
        }
    }
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { entity, id } => write!(f, "{entity} not found: {id}"),
            Self::Conflict {
                entity,
                field,
                value,
            } => write!(f, "another {entity} already has {field} = {value}"),
            Self::InvalidIntent { entity, id } => write!(
                f,
                "{entity} {id} is listed more than once in the change request"
            ),
            Self::StillReferenced { entity, id } => {
                write!(f, "{entity} {id} is still referenced")
            }
            Self::UnsupportedEntity(entity) => {
                write!(f, "{entity} is not supported by this service")
            }
            Self::Internal(details) => write!(f, "internal error: {details}"),
            Self::Repo(err) => write!(f, "{err}"),
        }
    }
}

impl Error for ServiceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ReconcileError> for ServiceError {
    fn from(value: ReconcileError) -> Self {
        match value {
            ReconcileError::NotFound { entity, id } => Self::NotFound { entity, id },
            ReconcileError::Conflict {
                entity,
                field,
                value,
            } => Self::Conflict {
                entity,
                field,
                value,
            },
            ReconcileError::InvalidIntent { entity, id } => Self::InvalidIntent { entity, id },
            other @ ReconcileError::NotACollection(_) => Self::Internal(other.to_string()),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(value: RepoError) -> Self {
        match value {
            RepoError::NoRowsAffected { entity, id } => {
                Self::Internal(format!("write on {entity} {id} affected no rows"))
            }
            other => Self::Repo(other),
        }
    }
}

impl From<rusqlite::Error> for ServiceError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Repo(RepoError::from(value))
    }
}

#[cfg(test)]
mod tests {
    use super::ServiceError;
    use crate::model::schema::EntityKind;
    use crate::reconcile::ReconcileError;
    use crate::repo::record_repo::RepoError;
    use serde_json::json;

    #[test]
    fn taxonomy_maps_to_http_status_codes() {
        let not_found = ServiceError::NotFound {
            entity: EntityKind::Product,
            id: 1,
        };
        let conflict = ServiceError::Conflict {
            entity: EntityKind::Product,
            field: "sku",
            value: json!("X1"),
        };
        let internal = ServiceError::Internal("boom".to_string());
        assert_eq!(not_found.status_code(), 404);
        assert_eq!(conflict.status_code(), 409);
        assert_eq!(internal.status_code(), 500);
        assert_eq!(conflict.code(), "conflict");
    }

    #[test]
    fn zero_affected_rows_is_internal() {
        let err = ServiceError::from(RepoError::NoRowsAffected {
            entity: EntityKind::ProcessStep,
            id: 3,
        });
        assert!(matches!(err, ServiceError::Internal(_)));
    }

    #[test]
    fn planner_errors_keep_their_class() {
        let err = ServiceError::from(ReconcileError::NotFound {
            entity: EntityKind::ProductInput,
            id: 12,
        });
        assert!(matches!(
            err,
            ServiceError::NotFound {
                entity: EntityKind::ProductInput,
                id: 12
            }
        ));
    }
}
