//! Repository layer abstractions and persistence implementations.
//!
//! # Responsibility
//! - Define the per-entity data access contract used by services.
//! - Isolate SQLite query details from service orchestration.
//!
//! # Invariants
//! - Repositories never open transactions; they borrow whatever connection
//!   or transaction the caller hands them.
//! - Zero affected rows on a keyed write is reported, never ignored.

pub mod record_repo;
