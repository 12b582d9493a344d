//! Schema bootstrap and category table management.
//!
//! Engine tables (`metadata`, `datatypes`, `pending`) are created here, once,
//! in the same transaction that seeds the datatype catalog and the built-in
//! categories.

use crate::error::{DbError, Result};
use crate::identifier::{
    check_category_name, check_identifier, check_identifiers, is_audit_column, quote,
};
use crate::registry::DatatypeRegistry;
use crate::seed::{Seed, SCHEMA_VERSION};
use crate::types::{CategoryTemplate, ColumnFilter, Datatype};
use crate::{finish, pending, AttimoDb};
use sqlx::sqlite::{SqliteConnection, SqlitePool};
use sqlx::Row;
use std::collections::HashSet;
use tracing::{debug, info};

/// Bootstrap the database if needed, then load the datatype registry.
pub(crate) async fn ensure_schema(pool: &SqlitePool, seed: &Seed) -> Result<DatatypeRegistry> {
    let mut tx = pool.begin().await?;
    let result = async {
        if is_bootstrapped(&mut tx).await? {
            debug!("Database schema verified");
        } else {
            bootstrap(&mut tx, seed).await?;
        }
        DatatypeRegistry::load(&mut tx).await
    }
    .await;
    finish(tx, result).await
}

/// True once the metadata table exists.
pub(crate) async fn is_bootstrapped(conn: &mut SqliteConnection) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'metadata'",
    )
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

async fn bootstrap(conn: &mut SqliteConnection, seed: &Seed) -> Result<()> {
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            version TEXT NOT NULL
        )"#,
    )
    .execute(&mut *conn)
    .await?;

    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS datatypes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            variable_type TEXT NOT NULL,
            completion_value TEXT NOT NULL DEFAULT 'no',
            completion_sort TEXT NOT NULL DEFAULT 'no',
            value_check TEXT NOT NULL DEFAULT 'nonempty',
            fill_behavior TEXT NOT NULL DEFAULT 'open'
                CHECK (fill_behavior IN ('open', 'close'))
        )"#,
    )
    .execute(&mut *conn)
    .await?;

    pending::create_table(conn).await?;

    sqlx::query("INSERT INTO metadata (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&mut *conn)
        .await?;

    let mut seen = HashSet::new();
    for (index, dt) in seed.datatypes.iter().enumerate() {
        check_identifier(&dt.name)?;
        if is_audit_column(&dt.name) {
            return Err(DbError::config(format!(
                "datatype name '{}' collides with an audit column",
                dt.name
            )));
        }
        if !seen.insert(dt.name.to_ascii_lowercase()) {
            return Err(DbError::config(format!(
                "datatype '{}' is defined twice",
                dt.name
            )));
        }

        sqlx::query(
            r#"
            INSERT INTO datatypes
                (id, name, variable_type, completion_value, completion_sort, value_check, fill_behavior)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(index as i64 + 1)
        .bind(&dt.name)
        .bind(dt.variable_type.as_str())
        .bind(&dt.completion_value)
        .bind(dt.completion_sort.as_str())
        .bind(&dt.value_check)
        .bind(dt.fill_behavior.as_str())
        .execute(&mut *conn)
        .await?;
    }

    let registry = DatatypeRegistry::load(conn).await?;
    for template in &seed.categories {
        create_category_table(conn, &registry, template).await?;
    }

    info!(
        version = SCHEMA_VERSION,
        datatypes = seed.datatypes.len(),
        categories = seed.categories.len(),
        "Database bootstrapped"
    );
    Ok(())
}

/// Create one category table from a template.
///
/// Every identifier is checked before any DDL is issued.
pub(crate) async fn create_category_table(
    conn: &mut SqliteConnection,
    registry: &DatatypeRegistry,
    template: &CategoryTemplate,
) -> Result<()> {
    check_category_name(&template.name)?;
    if template.column_ids.is_empty() {
        return Err(DbError::config(format!(
            "category '{}' has no columns",
            template.name
        )));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(template.column_ids.len());
    for id in &template.column_ids {
        if !seen.insert(*id) {
            return Err(DbError::config(format!(
                "category '{}' lists datatype {} twice",
                template.name, id
            )));
        }
        columns.push(registry.get(*id)?);
    }
    check_identifiers(columns.iter().map(|dt| dt.name.as_str()))?;

    if category_exists(conn, &template.name).await? {
        return Err(DbError::config(format!(
            "category '{}' already exists",
            template.name
        )));
    }

    let mut ddl = format!(
        "CREATE TABLE {} (\n    id INTEGER PRIMARY KEY AUTOINCREMENT,\n    \
         created_at DATETIME DEFAULT CURRENT_TIMESTAMP,\n    \
         updated_at DATETIME DEFAULT CURRENT_TIMESTAMP,\n    \
         deleted_at DATETIME DEFAULT NULL",
        quote(&template.name)
    );
    for datatype in &columns {
        ddl.push_str(&format!(
            ",\n    {} {}",
            quote(&datatype.name),
            datatype.variable_type.storage_type()
        ));
    }
    ddl.push_str("\n)");

    sqlx::query(&ddl).execute(&mut *conn).await?;
    debug!(category = %template.name, columns = columns.len(), "Created category table");
    Ok(())
}

async fn category_exists(conn: &mut SqliteConnection, category: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ? COLLATE NOCASE",
    )
    .bind(category)
    .fetch_one(&mut *conn)
    .await?;
    Ok(count > 0)
}

/// Non-audit columns of a category, as datatypes in table order.
///
/// Errors with `NotFound` when the category table does not exist.
pub(crate) async fn live_columns<'r>(
    conn: &mut SqliteConnection,
    registry: &'r DatatypeRegistry,
    category: &str,
) -> Result<Vec<&'r Datatype>> {
    check_category_name(category)?;

    // Exact-case match keeps pending pointers canonical.
    let exists: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?",
    )
    .bind(category)
    .fetch_one(&mut *conn)
    .await?;
    if exists == 0 {
        return Err(DbError::not_found(format!("category '{}'", category)));
    }

    let rows = sqlx::query("SELECT name FROM pragma_table_info(?) ORDER BY cid")
        .bind(category)
        .fetch_all(&mut *conn)
        .await?;

    rows.iter()
        .map(|row| row.get::<String, _>("name"))
        .filter(|name| !is_audit_column(name))
        .map(|name| registry.get_by_name(&name))
        .collect()
}

impl AttimoDb {
    /// Create a new category table from a template.
    pub async fn create_category(&self, template: &CategoryTemplate) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = create_category_table(&mut tx, &self.registry, template).await;
        finish(tx, result).await?;

        info!(category = %template.name, "Category created");
        Ok(())
    }

    /// Names of all category tables, alphabetically.
    pub async fn list_categories(&self) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT name FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
              AND name NOT IN ('metadata', 'datatypes', 'pending')
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    /// Non-audit column names of a category, filtered, in table order.
    pub async fn list_category_columns(
        &self,
        category: &str,
        filter: &ColumnFilter,
    ) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let columns = live_columns(&mut conn, &self.registry, category).await?;

        Ok(columns
            .into_iter()
            .filter(|dt| filter.include.is_empty() || filter.include.contains(&dt.name))
            .filter(|dt| !filter.exclude.contains(&dt.name))
            .filter(|dt| filter.fill_behavior.map_or(true, |fb| dt.fill_behavior == fb))
            .map(|dt| dt.name.clone())
            .collect())
    }

    /// The datatype behind a column of a category.
    pub async fn get_datatype(&self, category: &str, column: &str) -> Result<Datatype> {
        let mut conn = self.pool.acquire().await?;
        let columns = live_columns(&mut conn, &self.registry, category).await?;

        columns
            .into_iter()
            .find(|dt| dt.name == column)
            .cloned()
            .ok_or_else(|| {
                DbError::not_found(format!("column '{}' in category '{}'", column, category))
            })
    }

    /// Schema version recorded at bootstrap.
    pub async fn schema_version(&self) -> Result<String> {
        let version: String =
            sqlx::query_scalar("SELECT version FROM metadata ORDER BY id DESC LIMIT 1")
                .fetch_one(&self.pool)
                .await?;
        Ok(version)
    }
}
