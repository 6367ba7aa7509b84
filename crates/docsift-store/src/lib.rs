//! `SQLite`-backed document and chunk storage for docsift.

pub mod error;
pub mod sqlite;
pub mod types;

pub use error::StoreError;
pub use sqlite::SqliteStore;
