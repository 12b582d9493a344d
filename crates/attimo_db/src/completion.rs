//! Completion hints for data entry.
//!
//! A datatype's `completion_value` says where suggestions come from and its
//! `completion_sort` how they are ordered.

use crate::error::{DbError, Result};
use crate::identifier::quote;
use crate::schema::live_columns;
use crate::types::{CompletionSort, VariableType};
use crate::validation::split_expression;
use crate::AttimoDb;
use std::collections::HashMap;

/// Parsed `completion_value` expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionValue {
    /// No suggestions
    No,
    /// The most recent value in the column
    Last,
    /// Distinct values already in the column
    Unique,
    /// Fixed list, in declared order
    OneOf(Vec<String>),
    /// Date picker; nothing to suggest from stored data
    Date,
    /// File picker; nothing to suggest from stored data
    File,
}

impl CompletionValue {
    pub fn parse(expr: &str) -> Result<Self> {
        let (name, args) = split_expression(expr)
            .map_err(|e| DbError::config(format!("completion '{}': {}", expr, e)))?;

        let value = match name {
            "no" => Self::No,
            "last" => Self::Last,
            "unique" => Self::Unique,
            "date" => Self::Date,
            "file" => Self::File,
            "in" if !args.is_empty() => {
                return Ok(Self::OneOf(args.into_iter().map(str::to_string).collect()))
            }
            _ => {
                return Err(DbError::config(format!(
                    "unknown completion expression '{}'",
                    expr
                )))
            }
        };
        if !args.is_empty() {
            return Err(DbError::config(format!(
                "completion '{}' takes no arguments",
                name
            )));
        }
        Ok(value)
    }
}

/// Order distinct values by the datatype's sort.
///
/// `history` is newest first; csv cells are split into their items.
fn rank(history: &[String], csv: bool, sort: CompletionSort, limit: usize) -> Vec<String> {
    // value -> (count, recency rank of first sighting)
    let mut seen: HashMap<&str, (usize, usize)> = HashMap::new();
    let mut order = Vec::new();
    let items = history.iter().flat_map(|cell| {
        if csv {
            cell.split(',').map(str::trim).collect::<Vec<_>>()
        } else {
            vec![cell.as_str()]
        }
    });
    for item in items.filter(|s| !s.is_empty()) {
        let next = order.len();
        let entry = seen.entry(item).or_insert((0, next));
        if entry.0 == 0 {
            order.push(item);
        }
        entry.0 += 1;
    }

    match sort {
        CompletionSort::Frequency => {
            order.sort_by(|a, b| {
                let (ca, ra) = seen[a];
                let (cb, rb) = seen[b];
                cb.cmp(&ca).then(ra.cmp(&rb))
            });
        }
        CompletionSort::Alphabetic => order.sort_unstable(),
        CompletionSort::Last | CompletionSort::No => {}
    }

    order.into_iter().take(limit).map(str::to_string).collect()
}

impl AttimoDb {
    /// Suggested values for a column, at most `limit` of them.
    pub async fn suggest_values(
        &self,
        category: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        let mut conn = self.pool.acquire().await?;
        let columns = live_columns(&mut conn, &self.registry, category).await?;
        let dt = columns
            .into_iter()
            .find(|dt| dt.name == column)
            .ok_or_else(|| {
                DbError::not_found(format!("column '{}' in category '{}'", column, category))
            })?;

        let history_limit = match CompletionValue::parse(&dt.completion_value)? {
            CompletionValue::No | CompletionValue::Date | CompletionValue::File => {
                return Ok(Vec::new())
            }
            CompletionValue::OneOf(values) => return Ok(values.into_iter().take(limit).collect()),
            CompletionValue::Last => 1,
            CompletionValue::Unique => -1,
        };

        let column = quote(&dt.name);
        let sql = format!(
            "SELECT CAST({} AS TEXT) FROM {} \
             WHERE deleted_at IS NULL AND {} IS NOT NULL \
             ORDER BY id DESC LIMIT ?",
            column,
            quote(category),
            column
        );
        let history: Vec<String> = sqlx::query_scalar(&sql)
            .bind(history_limit)
            .fetch_all(&mut *conn)
            .await?;

        Ok(rank(
            &history,
            dt.variable_type == VariableType::Csv,
            dt.completion_sort,
            limit,
        ))
    }
}
