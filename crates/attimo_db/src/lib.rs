//! Dynamic category database for Attimo
//!
//! Categories are user-defined record tables built from reusable field
//! definitions ("datatypes"). This crate owns all SQL: schema bootstrap,
//! validated CRUD against category tables, and the pending index of
//! still-open items.
//!
//! # Usage
//!
//! ```rust,ignore
//! use attimo_db::{AttimoDb, RowData, Value};
//!
//! let db = AttimoDb::open("~/.attimo/attimo.sqlite3").await?;
//!
//! let mut row = RowData::new();
//! row.insert("Opened".into(), Value::from("01-01-2024"));
//! row.insert("Note".into(), Value::from("call back"));
//! let id = db.create_row("Contact", &row).await?;
//!
//! for pointer in db.list_pending_pointers().await? {
//!     println!("{pointer}");
//! }
//! db.close_item("Contact", id, "02-01-2024").await?;
//! ```

mod error;
pub mod identifier;
mod registry;
pub mod seed;
mod types;
pub mod validation;

// Method implementations organized by component
mod completion;
mod crud;
mod pending;
mod schema;

pub use completion::CompletionValue;
pub use error::{DbError, Result};
pub use registry::DatatypeRegistry;
pub use seed::{DatatypeSeed, Seed};
pub use types::*;

use sqlx::sqlite::{Sqlite, SqlitePool, SqlitePoolOptions};
use sqlx::Transaction;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Connection settings for [`AttimoDb::open_with`].
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Maximum connections in the pool
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self { max_connections: 5 }
    }
}

/// Handle to an Attimo database.
///
/// Cheap to clone; clones share the pool and the datatype registry.
#[derive(Clone)]
pub struct AttimoDb {
    pool: SqlitePool,
    registry: Arc<DatatypeRegistry>,
}

impl AttimoDb {
    /// Open or create a database at the given path with the built-in seed.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DbConfig::default(), Seed::builtin()).await
    }

    /// Open or create a database.
    ///
    /// `seed` is only applied when the file has not been bootstrapped yet.
    pub async fn open_with(path: impl AsRef<Path>, config: DbConfig, seed: Seed) -> Result<Self> {
        let path = path.as_ref();

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect(&url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        let registry = schema::ensure_schema(&pool, &seed).await?;
        info!(path = %path.display(), datatypes = registry.len(), "Database opened");

        Ok(Self {
            pool,
            registry: Arc::new(registry),
        })
    }

    /// Open an existing, already bootstrapped database (fails if not exists).
    pub async fn open_existing(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(DbError::NotFound(format!(
                "Database not found: {}",
                path.display()
            )));
        }

        let url = format!("sqlite:{}?mode=rw", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(DbConfig::default().max_connections)
            .connect(&url)
            .await?;

        let mut conn = pool.acquire().await?;
        if !schema::is_bootstrapped(&mut conn).await? {
            return Err(DbError::NotFound(format!(
                "{} is not an Attimo database",
                path.display()
            )));
        }
        let registry = DatatypeRegistry::load(&mut conn).await?;
        drop(conn);

        Ok(Self {
            pool,
            registry: Arc::new(registry),
        })
    }

    /// Get the underlying connection pool (escape hatch for complex queries).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The datatype catalog loaded at open time.
    pub fn registry(&self) -> &DatatypeRegistry {
        &self.registry
    }

    /// Close the database connection.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

/// Commit on success, roll back on error.
///
/// A failed rollback is logged; the original error is what the caller sees.
pub(crate) async fn finish<T>(tx: Transaction<'_, Sqlite>, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!(error = %rollback_err, "Rollback failed");
            }
            Err(err)
        }
    }
}
