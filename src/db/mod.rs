/// Storage layer: `sqlx::AnyPool` over either configured dialect.
///
/// The teacher talks to a single embedded rocksdb handle (`src/storage.rs`
/// analog inside `sync.rs`); this service needs transactional, indexed
/// relational storage instead (spec.md §3), so the pool construction below
/// is new but kept in the same "one shared handle, passed by reference"
/// shape the teacher uses for its db handle.
pub mod models;
pub mod repository;

use crate::config::{Dialect, StorageConfig};
use crate::error::{BridgeError, Result};
use sqlx::any::AnyPoolOptions;
use sqlx::AnyPool;

pub async fn connect(cfg: &StorageConfig) -> Result<AnyPool> {
    sqlx::any::install_default_drivers();

    let pool = AnyPoolOptions::new()
        .max_connections(10)
        .connect(&cfg.dsn)
        .await
        .map_err(BridgeError::Database)?;

    Ok(pool)
}

pub async fn migrate(pool: &AnyPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| BridgeError::Config(format!("migration failed: {e}")))
}

/// `INSERT ... ON CONFLICT DO NOTHING` has no single spelling across the two
/// supported dialects: sqlite wants `INSERT OR IGNORE INTO`, mysql wants
/// `INSERT IGNORE INTO`. Callers build idempotent inserts by splicing this
/// in place of the bare `INSERT INTO` keyword.
pub fn insert_ignore_keyword(dialect: Dialect) -> &'static str {
    match dialect {
        Dialect::Sqlite3 => "INSERT OR IGNORE INTO",
        Dialect::Mysql => "INSERT IGNORE INTO",
    }
}
