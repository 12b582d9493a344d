//! Datatype registry: the read-only catalog of field definitions.
//!
//! Loaded from the `datatypes` table once the bootstrap transaction has
//! seeded it. Check expressions are parsed once here and cached per id.

use crate::error::{DbError, Result};
use crate::types::{CompletionSort, Datatype, FillBehavior, Value, VariableType};
use crate::validation::{evaluate_parsed, parse_check, Check, CheckError};
use sqlx::sqlite::{SqliteConnection, SqliteRow};
use sqlx::Row;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug)]
struct Entry {
    datatype: Datatype,
    check: std::result::Result<Check, CheckError>,
}

/// In-memory datatype catalog keyed by id and by name.
#[derive(Debug, Default)]
pub struct DatatypeRegistry {
    entries: HashMap<i64, Entry>,
    by_name: HashMap<String, i64>,
}

impl DatatypeRegistry {
    /// Build a registry from already-loaded datatypes.
    pub fn from_datatypes(datatypes: impl IntoIterator<Item = Datatype>) -> Self {
        let mut registry = Self::default();
        for datatype in datatypes {
            let check = parse_check(&datatype.value_check);
            if let Err(err) = &check {
                warn!(
                    datatype = %datatype.name,
                    error = %err,
                    "Datatype has an unusable check; every value will be rejected"
                );
            }
            registry.by_name.insert(datatype.name.clone(), datatype.id);
            registry.entries.insert(datatype.id, Entry { datatype, check });
        }
        registry
    }

    /// Read every row of the `datatypes` table.
    pub(crate) async fn load(conn: &mut SqliteConnection) -> Result<Self> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, variable_type, completion_value, completion_sort, value_check, fill_behavior
            FROM datatypes
            ORDER BY id
            "#,
        )
        .fetch_all(&mut *conn)
        .await?;

        let datatypes = rows
            .iter()
            .map(row_to_datatype)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = datatypes.len(), "Datatype registry loaded");
        Ok(Self::from_datatypes(datatypes))
    }

    /// Look up a datatype by id.
    pub fn get(&self, id: i64) -> Result<&Datatype> {
        self.entries
            .get(&id)
            .map(|e| &e.datatype)
            .ok_or_else(|| DbError::UnknownDatatype(format!("id {}", id)))
    }

    /// Look up a datatype by its (column) name.
    pub fn get_by_name(&self, name: &str) -> Result<&Datatype> {
        self.by_name
            .get(name)
            .and_then(|id| self.entries.get(id))
            .map(|e| &e.datatype)
            .ok_or_else(|| DbError::UnknownDatatype(format!("name '{}'", name)))
    }

    /// The cached parse result of a datatype's check expression.
    pub fn check(&self, id: i64) -> Result<&std::result::Result<Check, CheckError>> {
        self.entries
            .get(&id)
            .map(|e| &e.check)
            .ok_or_else(|| DbError::UnknownDatatype(format!("id {}", id)))
    }

    /// Evaluate `value` against the named datatype's cached check.
    pub fn validate(&self, name: &str, value: &Value) -> Result<bool> {
        let id = self.get_by_name(name)?.id;
        Ok(evaluate_parsed(name, self.check(id)?, value))
    }

    /// All datatypes in id order.
    pub fn datatypes(&self) -> Vec<&Datatype> {
        let mut all: Vec<&Datatype> = self.entries.values().map(|e| &e.datatype).collect();
        all.sort_by_key(|d| d.id);
        all
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn row_to_datatype(row: &SqliteRow) -> Result<Datatype> {
    let name: String = row.get("name");

    let variable_type: String = row.get("variable_type");
    let variable_type = VariableType::parse(&variable_type).ok_or_else(|| {
        DbError::config(format!(
            "datatype '{}' has unknown variable type '{}'",
            name, variable_type
        ))
    })?;

    let completion_sort: String = row.get("completion_sort");
    let completion_sort = CompletionSort::parse(&completion_sort).ok_or_else(|| {
        DbError::config(format!(
            "datatype '{}' has unknown completion sort '{}'",
            name, completion_sort
        ))
    })?;

    let fill_behavior: String = row.get("fill_behavior");
    let fill_behavior = FillBehavior::parse(&fill_behavior).ok_or_else(|| {
        DbError::config(format!(
            "datatype '{}' has unknown fill behavior '{}'",
            name, fill_behavior
        ))
    })?;

    Ok(Datatype {
        id: row.get("id"),
        name,
        variable_type,
        completion_value: row.get("completion_value"),
        completion_sort,
        value_check: row.get("value_check"),
        fill_behavior,
    })
}
