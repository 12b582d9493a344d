//! Unified types for Attimo categories, datatypes and rows.
//!
//! These types are the unit of exchange between the database layer and its
//! collaborators (controller, CLI).

use crate::error::{DbError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// Values
// ============================================================================

/// A single untyped cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    /// Comma-joined storage form for `csv` columns.
    pub fn csv<I, S>(items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: Vec<String> = items
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .collect();
        Value::Text(joined.join(","))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Short name of the variant, used in type-mismatch messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) => "int",
            Value::Real(_) => "float",
            Value::Text(_) => "string",
        }
    }

    fn from_json(column: &str, json: serde_json::Value) -> Result<Self> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Integer(i)),
                None => n.as_f64().map(Value::Real).ok_or_else(|| {
                    DbError::validation(column, format!("number {} is out of range", n))
                }),
            },
            serde_json::Value::String(s) => Ok(Value::Text(s)),
            other => Err(DbError::validation(
                column,
                format!("nested JSON values are not supported: {}", other),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Integer(i) => write!(f, "{}", i),
            Value::Real(r) => write!(f, "{}", r),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<f64> for Value {
    fn from(r: f64) -> Self {
        Value::Real(r)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Column name to value map exchanged with the CRUD layer.
///
/// Ordered so generated SQL is deterministic.
pub type RowData = BTreeMap<String, Value>;

/// Build a [`RowData`] from a JSON object such as `{"Note": "x", "Rating": 3}`.
pub fn row_data_from_json(input: &str) -> Result<RowData> {
    let parsed: serde_json::Value = serde_json::from_str(input)?;
    let serde_json::Value::Object(map) = parsed else {
        return Err(DbError::config("row data must be a JSON object"));
    };
    map.into_iter()
        .map(|(column, json)| {
            let value = Value::from_json(&column, json)?;
            Ok((column, value))
        })
        .collect()
}

// ============================================================================
// Datatype Types
// ============================================================================

/// Logical value type of a datatype.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableType {
    String,
    Int,
    Float,
    Bool,
    Time,
    /// Comma-separated list stored as a single string
    Csv,
}

impl VariableType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Time => "time",
            Self::Csv => "csv",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            "time" => Some(Self::Time),
            "csv" => Some(Self::Csv),
            _ => None,
        }
    }

    /// Whether a value of this shape can be stored in a column of this type.
    ///
    /// Null is accepted here; whether a column may be empty is decided by
    /// its fill behavior.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::String | Self::Time | Self::Csv, Value::Text(_)) => true,
            (Self::Int, Value::Integer(_)) => true,
            (Self::Float, Value::Real(_) | Value::Integer(_)) => true,
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Bool, Value::Integer(i)) => *i == 0 || *i == 1,
            _ => false,
        }
    }

    /// Convert an accepted value to the variant this type reads back as.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Float, Value::Integer(i)) => Value::Real(i as f64),
            (Self::Bool, Value::Integer(i)) => Value::Bool(i != 0),
            (_, value) => value,
        }
    }

    /// SQLite storage type used for category columns.
    pub fn storage_type(&self) -> &'static str {
        match self {
            Self::Int => "INTEGER",
            Self::String => "TEXT",
            Self::Float => "REAL",
            Self::Bool => "INTEGER",
            Self::Time => "DATETIME",
            Self::Csv => "TEXT",
        }
    }
}

impl fmt::Display for VariableType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Whether a column is populated when an item is opened or when it is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillBehavior {
    #[default]
    Open,
    Close,
}

impl FillBehavior {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Some(Self::Open),
            "close" => Some(Self::Close),
            _ => None,
        }
    }
}

impl fmt::Display for FillBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordering hint for value suggestions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionSort {
    #[default]
    No,
    Frequency,
    Last,
    Alphabetic,
}

impl CompletionSort {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::No => "no",
            Self::Frequency => "frequency",
            Self::Last => "last",
            Self::Alphabetic => "alphabetic",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "no" => Some(Self::No),
            "frequency" => Some(Self::Frequency),
            "last" => Some(Self::Last),
            "alphabetic" => Some(Self::Alphabetic),
            _ => None,
        }
    }
}

/// A reusable field definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Datatype {
    pub id: i64,
    /// Column name used in every category that references this datatype
    pub name: String,
    pub variable_type: VariableType,
    /// Completion expression, e.g. `unique` or `in(Low,Medium,High)`
    pub completion_value: String,
    pub completion_sort: CompletionSort,
    /// Check expression, e.g. `nonempty` or `range(1,5)`
    pub value_check: String,
    pub fill_behavior: FillBehavior,
}

/// Declarative category definition, consumed once at table creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryTemplate {
    pub name: String,
    /// Datatype ids in column order
    pub column_ids: Vec<i64>,
}

impl CategoryTemplate {
    pub fn new(name: impl Into<String>, column_ids: Vec<i64>) -> Self {
        Self {
            name: name.into(),
            column_ids,
        }
    }
}

// ============================================================================
// Pending Types
// ============================================================================

/// `"<category>:<id>"` reference to a still-open item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PendingPointer {
    pub category: String,
    pub id: i64,
}

impl PendingPointer {
    pub fn new(category: impl Into<String>, id: i64) -> Self {
        Self {
            category: category.into(),
            id,
        }
    }
}

impl fmt::Display for PendingPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.id)
    }
}

impl FromStr for PendingPointer {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self> {
        let (category, id) = s
            .split_once(':')
            .ok_or_else(|| DbError::InvalidPointer(s.to_string()))?;
        if category.is_empty() || id.contains(':') {
            return Err(DbError::InvalidPointer(s.to_string()));
        }
        let id = id
            .parse::<i64>()
            .map_err(|_| DbError::InvalidPointer(s.to_string()))?;
        Ok(Self::new(category, id))
    }
}

impl TryFrom<String> for PendingPointer {
    type Error = DbError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<PendingPointer> for String {
    fn from(p: PendingPointer) -> Self {
        p.to_string()
    }
}

/// A pending pointer resolved against its category row.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingItem {
    pub pending_id: i64,
    pub pointer: PendingPointer,
    pub pending_since: String,
    pub row: RowData,
}

// ============================================================================
// Filter Types (for queries)
// ============================================================================

/// Column selection for `list_category_columns`.
///
/// Empty `include` means "all columns".
#[derive(Debug, Clone, Default)]
pub struct ColumnFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub fill_behavior: Option<FillBehavior>,
}

impl ColumnFilter {
    pub fn fill(fill_behavior: FillBehavior) -> Self {
        Self {
            fill_behavior: Some(fill_behavior),
            ..Self::default()
        }
    }
}

/// One page of rows plus the total number of matching rows.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowPage {
    pub rows: Vec<RowData>,
    pub total: u64,
}
