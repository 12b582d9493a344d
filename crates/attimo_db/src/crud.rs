//! Row operations on category tables.
//!
//! Every write runs in one transaction together with the pending-index update
//! it implies; any failure rolls back both. Column names only reach SQL after
//! they have been matched against the category's live columns.

use crate::error::{DbError, Result};
use crate::identifier::{check_identifier, is_audit_column, quote};
use crate::registry::DatatypeRegistry;
use crate::schema::live_columns;
use crate::types::{
    Datatype, FillBehavior, PendingItem, PendingPointer, RowData, RowPage, Value, VariableType,
};
use crate::{finish, pending, AttimoDb};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnection, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::{debug, info, warn};

type SqliteQuery<'q> = Query<'q, Sqlite, SqliteArguments<'q>>;

fn bind_value<'q>(query: SqliteQuery<'q>, value: &'q Value) -> SqliteQuery<'q> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(b) => query.bind(*b),
        Value::Integer(i) => query.bind(*i),
        Value::Real(r) => query.bind(*r),
        Value::Text(s) => query.bind(s.as_str()),
    }
}

/// Decode a row by storage class; column names become keys.
fn decode_row(row: &SqliteRow) -> Result<RowData> {
    let mut data = RowData::new();
    for column in row.columns() {
        let idx = column.ordinal();
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_info = raw.type_info();
            match type_info.name() {
                "INTEGER" => Value::Integer(row.try_get_unchecked::<i64, _>(idx)?),
                "REAL" => Value::Real(row.try_get_unchecked::<f64, _>(idx)?),
                "BLOB" => {
                    let bytes = row.try_get_unchecked::<Vec<u8>, _>(idx)?;
                    Value::Text(String::from_utf8_lossy(&bytes).into_owned())
                }
                _ => Value::Text(row.try_get_unchecked::<String, _>(idx)?),
            }
        };
        data.insert(column.name().to_string(), value);
    }
    Ok(data)
}

/// Bool columns are stored as 0/1; give them back as booleans.
fn restore_bools(data: &mut RowData, columns: &[&Datatype]) {
    for dt in columns.iter().filter(|dt| dt.variable_type == VariableType::Bool) {
        if let Some(value) = data.get_mut(&dt.name) {
            if let Value::Integer(i) = value {
                *value = Value::Bool(*i != 0);
            }
        }
    }
}

fn find_column<'a>(columns: &[&'a Datatype], key: &str) -> Result<&'a Datatype> {
    check_identifier(key)?;
    if is_audit_column(key) {
        return Err(DbError::validation(
            key,
            "audit columns are managed by the database",
        ));
    }
    columns
        .iter()
        .copied()
        .find(|dt| dt.name == key)
        .ok_or_else(|| DbError::validation(key, "no such column in this category"))
}

/// Type and check validation of one value, returning it in the form it is
/// stored and read back in.
///
/// Null passes for close-fill columns only; an open column with no value is
/// treated as missing.
fn validate_value(registry: &DatatypeRegistry, dt: &Datatype, value: &Value) -> Result<Value> {
    if value.is_null() {
        return match dt.fill_behavior {
            FillBehavior::Close => Ok(Value::Null),
            FillBehavior::Open => Err(DbError::validation(&dt.name, "a value is required")),
        };
    }
    if !dt.variable_type.accepts(value) {
        return Err(DbError::validation(
            &dt.name,
            format!("expected {}, got {}", dt.variable_type, value.kind()),
        ));
    }
    let value = dt.variable_type.coerce(value.clone());
    if !registry.validate(&dt.name, &value)? {
        warn!(column = %dt.name, check = %dt.value_check, %value, "Value rejected");
        return Err(DbError::validation(
            &dt.name,
            format!("'{}' does not satisfy check '{}'", value, dt.value_check),
        ));
    }
    Ok(value)
}

/// Validate every key/value of `data`, aborting on the first failure.
fn validate_row(
    registry: &DatatypeRegistry,
    columns: &[&Datatype],
    data: &RowData,
) -> Result<RowData> {
    data.iter()
        .map(|(key, value)| {
            let dt = find_column(columns, key)?;
            Ok((key.clone(), validate_value(registry, dt, value)?))
        })
        .collect()
}

fn sets_close_column(columns: &[&Datatype], data: &RowData) -> bool {
    columns
        .iter()
        .filter(|dt| dt.fill_behavior == FillBehavior::Close)
        .any(|dt| data.get(&dt.name).is_some_and(|v| !v.is_null()))
}

impl AttimoDb {
    /// Insert a row and, if it starts open, register it as pending.
    ///
    /// Every open-fill column must be supplied; close-fill columns may be
    /// omitted. Returns the new row id.
    pub async fn create_row(&self, category: &str, data: &RowData) -> Result<i64> {
        let mut tx = self.pool.begin().await?;
        let result = self.create_row_in(&mut tx, category, data).await;
        let id = finish(tx, result).await?;

        info!(category, id, "Row created");
        Ok(id)
    }

    async fn create_row_in(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        data: &RowData,
    ) -> Result<i64> {
        let columns = live_columns(conn, &self.registry, category).await?;
        let data = &validate_row(&self.registry, &columns, data)?;

        if let Some(missing) = columns
            .iter()
            .filter(|dt| dt.fill_behavior == FillBehavior::Open)
            .find(|dt| !data.contains_key(&dt.name))
        {
            return Err(DbError::validation(&missing.name, "a value is required"));
        }

        let sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(category))
        } else {
            let names: Vec<String> = data.keys().map(|k| quote(k)).collect();
            let placeholders = vec!["?"; data.len()].join(", ");
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(category),
                names.join(", "),
                placeholders
            )
        };

        let mut query = sqlx::query(&sql);
        for value in data.values() {
            query = bind_value(query, value);
        }
        let id = query.execute(&mut *conn).await?.last_insert_rowid();

        let has_open_column = columns
            .iter()
            .any(|dt| dt.fill_behavior == FillBehavior::Open);
        if has_open_column && !sets_close_column(&columns, data) {
            pending::register(conn, category, id).await?;
        }
        Ok(id)
    }

    /// Fetch one live row by id.
    pub async fn read_row(&self, category: &str, id: i64) -> Result<RowData> {
        let mut conn = self.pool.acquire().await?;
        self.read_row_in(&mut conn, category, id).await
    }

    async fn read_row_in(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        id: i64,
    ) -> Result<RowData> {
        let columns = live_columns(conn, &self.registry, category).await?;

        let sql = format!(
            "SELECT * FROM {} WHERE id = ? AND deleted_at IS NULL",
            quote(category)
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?
            .ok_or_else(|| DbError::not_found(PendingPointer::new(category, id).to_string()))?;

        let mut data = decode_row(&row)?;
        restore_bools(&mut data, &columns);
        Ok(data)
    }

    /// Update some columns of a live row.
    ///
    /// Setting a close-fill column closes the item and drops it from the
    /// pending index.
    pub async fn update_row(&self, category: &str, id: i64, data: &RowData) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = self.update_row_in(&mut tx, category, id, data).await;
        finish(tx, result).await?;

        info!(category, id, columns = data.len(), "Row updated");
        Ok(())
    }

    async fn update_row_in(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        id: i64,
        data: &RowData,
    ) -> Result<()> {
        let columns = live_columns(conn, &self.registry, category).await?;
        if data.is_empty() {
            return Err(DbError::validation(
                category,
                "update requires at least one column",
            ));
        }
        let data = &validate_row(&self.registry, &columns, data)?;

        // Open -> Closed is terminal.
        if let Some(dt) = columns
            .iter()
            .filter(|dt| dt.fill_behavior == FillBehavior::Close)
            .find(|dt| data.get(&dt.name).is_some_and(Value::is_null))
        {
            return Err(DbError::validation(
                &dt.name,
                "a close column cannot be cleared",
            ));
        }

        let assignments: Vec<String> = data.keys().map(|k| format!("{} = ?", quote(k))).collect();
        let sql = format!(
            "UPDATE {} SET {}, updated_at = CURRENT_TIMESTAMP WHERE id = ? AND deleted_at IS NULL",
            quote(category),
            assignments.join(", ")
        );

        let mut query = sqlx::query(&sql);
        for value in data.values() {
            query = bind_value(query, value);
        }
        let result = query.bind(id).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(
                PendingPointer::new(category, id).to_string(),
            ));
        }

        if sets_close_column(&columns, data) {
            pending::deregister(conn, category, id).await?;
        }
        Ok(())
    }

    /// Soft-delete a live row and drop its pending pointer.
    pub async fn delete_row(&self, category: &str, id: i64) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = self.delete_row_in(&mut tx, category, id).await;
        finish(tx, result).await?;

        info!(category, id, "Row deleted");
        Ok(())
    }

    async fn delete_row_in(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        id: i64,
    ) -> Result<()> {
        live_columns(conn, &self.registry, category).await?;

        let sql = format!(
            "UPDATE {} SET deleted_at = CURRENT_TIMESTAMP, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? AND deleted_at IS NULL",
            quote(category)
        );
        let result = sqlx::query(&sql).bind(id).execute(&mut *conn).await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(
                PendingPointer::new(category, id).to_string(),
            ));
        }

        pending::deregister(conn, category, id).await?;
        Ok(())
    }

    /// One page of live rows, newest first.
    ///
    /// `filters` are equality matches on non-audit columns; a null filter
    /// value matches empty cells. `page` is 1-based.
    pub async fn list_rows(
        &self,
        category: &str,
        filters: &RowData,
        page: u32,
        page_size: u32,
    ) -> Result<RowPage> {
        let mut tx = self.pool.begin().await?;
        let result = self
            .list_rows_in(&mut tx, category, filters, page, page_size)
            .await;
        finish(tx, result).await
    }

    async fn list_rows_in(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        filters: &RowData,
        page: u32,
        page_size: u32,
    ) -> Result<RowPage> {
        let columns = live_columns(conn, &self.registry, category).await?;

        let mut conditions = vec!["deleted_at IS NULL".to_string()];
        let mut params = Vec::new();
        for (key, value) in filters {
            find_column(&columns, key)?;
            if value.is_null() {
                conditions.push(format!("{} IS NULL", quote(key)));
            } else {
                conditions.push(format!("{} = ?", quote(key)));
                params.push(value);
            }
        }
        let where_clause = conditions.join(" AND ");

        let count_sql = format!(
            "SELECT COUNT(*) FROM {} WHERE {}",
            quote(category),
            where_clause
        );
        let mut count_query = sqlx::query(&count_sql);
        for value in &params {
            count_query = bind_value(count_query, value);
        }
        let total: i64 = count_query.fetch_one(&mut *conn).await?.try_get(0)?;

        let limit = i64::from(page_size);
        let offset = i64::from(page.saturating_sub(1)).saturating_mul(limit);
        let select_sql = format!(
            "SELECT * FROM {} WHERE {} ORDER BY id DESC LIMIT ? OFFSET ?",
            quote(category),
            where_clause
        );
        let mut select_query = sqlx::query(&select_sql);
        for value in &params {
            select_query = bind_value(select_query, value);
        }
        let rows = select_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&mut *conn)
            .await?;

        let rows = rows
            .iter()
            .map(|row| {
                let mut data = decode_row(row)?;
                restore_bools(&mut data, &columns);
                Ok(data)
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(category, page, page_size, total, "Listed rows");
        Ok(RowPage {
            rows,
            total: total.max(0) as u64,
        })
    }

    /// Close an open item by filling its close column.
    ///
    /// The category's first close-fill column is written. Closing an item
    /// twice, or a deleted item, is `NotFound`.
    pub async fn close_item(
        &self,
        category: &str,
        id: i64,
        close_value: impl Into<Value>,
    ) -> Result<()> {
        let close_value = close_value.into();
        let mut tx = self.pool.begin().await?;
        let result = self.close_item_in(&mut tx, category, id, &close_value).await;
        finish(tx, result).await?;

        info!(category, id, value = %close_value, "Item closed");
        Ok(())
    }

    /// Close the item a pending pointer refers to.
    pub async fn close_pointer(&self, pointer: &str, close_value: impl Into<Value>) -> Result<()> {
        let pointer: PendingPointer = pointer.parse()?;
        self.close_item(&pointer.category, pointer.id, close_value)
            .await
    }

    async fn close_item_in(
        &self,
        conn: &mut SqliteConnection,
        category: &str,
        id: i64,
        close_value: &Value,
    ) -> Result<()> {
        let columns = live_columns(conn, &self.registry, category).await?;
        let close = columns
            .iter()
            .copied()
            .find(|dt| dt.fill_behavior == FillBehavior::Close)
            .ok_or_else(|| {
                DbError::config(format!("category '{}' has no close column", category))
            })?;

        if close_value.is_null() {
            return Err(DbError::validation(&close.name, "a value is required"));
        }
        let close_value = &validate_value(&self.registry, close, close_value)?;

        let column = quote(&close.name);
        let sql = format!(
            "UPDATE {} SET {} = ?, updated_at = CURRENT_TIMESTAMP \
             WHERE id = ? AND deleted_at IS NULL AND {} IS NULL",
            quote(category),
            column,
            column
        );
        let result = bind_value(sqlx::query(&sql), close_value)
            .bind(id)
            .execute(&mut *conn)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::not_found(format!(
                "open item {}",
                PendingPointer::new(category, id)
            )));
        }

        pending::deregister(conn, category, id).await?;
        Ok(())
    }

    /// Pending pointers resolved to their rows, most recent first.
    ///
    /// Pointers whose row can no longer be read are skipped with a warning.
    pub async fn list_pending_items(&self) -> Result<Vec<PendingItem>> {
        let mut conn = self.pool.acquire().await?;
        let live = pending::live_rows(&mut conn).await?;

        let mut items = Vec::with_capacity(live.len());
        for (pending_id, pointer, pending_since) in live {
            let parsed: PendingPointer = match pointer.parse() {
                Ok(p) => p,
                Err(err) => {
                    warn!(%pointer, error = %err, "Skipping malformed pending pointer");
                    continue;
                }
            };
            match self
                .read_row_in(&mut conn, &parsed.category, parsed.id)
                .await
            {
                Ok(row) => items.push(PendingItem {
                    pending_id,
                    pointer: parsed,
                    pending_since,
                    row,
                }),
                Err(err) => warn!(%pointer, error = %err, "Skipping unresolvable pending item"),
            }
        }
        Ok(items)
    }
}
