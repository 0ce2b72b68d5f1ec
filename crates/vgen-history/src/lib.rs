//! Generation history persistence.
//!
//! This crate provides:
//! - The [`HistoryStore`] trait with update-only-while-active semantics
//! - An in-memory implementation (tests, storage-less deployments)
//! - A SQLite implementation (sqlx)

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod store;

pub use error::{HistoryError, HistoryResult};
pub use memory::MemoryHistory;
pub use sqlite::SqliteHistory;
pub use store::{timeout_message, HistoryPage, HistoryQuery, HistoryStore};
