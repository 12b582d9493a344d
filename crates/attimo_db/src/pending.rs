//! Pending tracker: index of still-open items as `"<category>:<id>"` pointers.
//!
//! `register` and `deregister` take the caller's connection so they always
//! run inside the transaction that wrote the category row.

use crate::error::Result;
use crate::types::PendingPointer;
use crate::AttimoDb;
use sqlx::sqlite::SqliteConnection;
use sqlx::Row;
use tracing::debug;

/// Create the pending table and its live-pointer index.
pub(crate) async fn create_table(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS pending (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            deleted_at DATETIME DEFAULT NULL,
            pointer TEXT NOT NULL,
            CHECK (pointer LIKE '%:%')
        )"#,
    )
    .execute(&mut *conn)
    .await?;

    // One live row per pointer; tombstones are kept as history.
    sqlx::query(
        r#"CREATE UNIQUE INDEX IF NOT EXISTS idx_pending_pointer
            ON pending(pointer)
            WHERE deleted_at IS NULL"#,
    )
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Mark an item as open. Re-registering a live pointer only refreshes it.
pub(crate) async fn register(conn: &mut SqliteConnection, category: &str, id: i64) -> Result<()> {
    let pointer = PendingPointer::new(category, id).to_string();

    sqlx::query(
        r#"
        INSERT INTO pending (pointer)
        VALUES (?)
        ON CONFLICT(pointer) WHERE deleted_at IS NULL DO UPDATE SET
            updated_at = CURRENT_TIMESTAMP,
            deleted_at = NULL
        "#,
    )
    .bind(&pointer)
    .execute(&mut *conn)
    .await?;

    debug!(%pointer, "Registered pending item");
    Ok(())
}

/// Tombstone the live pointer for an item. Missing pointers are not an error.
///
/// Returns whether a live pointer was removed.
pub(crate) async fn deregister(
    conn: &mut SqliteConnection,
    category: &str,
    id: i64,
) -> Result<bool> {
    let pointer = PendingPointer::new(category, id).to_string();

    let result = sqlx::query(
        r#"
        UPDATE pending
        SET deleted_at = CURRENT_TIMESTAMP,
            updated_at = CURRENT_TIMESTAMP
        WHERE pointer = ?
          AND deleted_at IS NULL
        "#,
    )
    .bind(&pointer)
    .execute(&mut *conn)
    .await?;

    let removed = result.rows_affected() > 0;
    debug!(%pointer, removed, "Deregistered pending item");
    Ok(removed)
}

/// Live pending rows as `(pending id, pointer, created_at)`, newest id first.
pub(crate) async fn live_rows(conn: &mut SqliteConnection) -> Result<Vec<(i64, String, String)>> {
    let rows = sqlx::query(
        r#"
        SELECT id, pointer, created_at
        FROM pending
        WHERE deleted_at IS NULL
        ORDER BY id DESC
        "#,
    )
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .iter()
        .map(|row| (row.get("id"), row.get("pointer"), row.get("created_at")))
        .collect())
}

impl AttimoDb {
    /// All live pending pointers, most recent first.
    pub async fn list_pending_pointers(&self) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let rows = live_rows(&mut conn).await?;
        Ok(rows.into_iter().map(|(_, pointer, _)| pointer).collect())
    }
}
