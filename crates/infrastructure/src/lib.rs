//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod grant_tables;
mod in_memory_access_store;
mod postgres_access_store;

pub use grant_tables::GrantTables;
pub use in_memory_access_store::{InMemoryAccessStore, InMemoryTransaction};
pub use postgres_access_store::PostgresAccessStore;

/// Migrations creating the bundled target and grant tables.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
