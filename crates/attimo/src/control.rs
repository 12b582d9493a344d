//! Controller: the boundary between front ends (CLI) and the database.
//!
//! Adds paging arithmetic and pointer handling on top of [`AttimoDb`].

use crate::config::{AttimoConfig, DEFAULT_PAGE_SIZE};
use attimo_db::{
    AttimoDb, CategoryTemplate, ColumnFilter, Datatype, DbError, PendingItem, Result, RowData,
    Value, VariableType,
};
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Options for [`Controller::list_rows`]. Zero page or page size means default.
#[derive(Debug, Clone, Default)]
pub struct ListRowsOptions {
    pub category: String,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
    /// Equality filters on non-audit columns
    pub filters: RowData,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRowsResult {
    pub rows: Vec<RowData>,
    pub total_rows: u64,
    pub current_page: u32,
    pub total_pages: u64,
    pub page_size: u32,
}

pub struct Controller {
    db: AttimoDb,
    page_size: u32,
}

impl Controller {
    pub fn new(db: AttimoDb, page_size: u32) -> Self {
        let page_size = if page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            page_size
        };
        Self { db, page_size }
    }

    /// Open (and bootstrap if needed) the configured database.
    pub async fn open(config: &AttimoConfig) -> Result<Self> {
        Self::open_at(&config.database_path(), config).await
    }

    /// Like [`Controller::open`] but with an explicit database path.
    pub async fn open_at(path: &Path, config: &AttimoConfig) -> Result<Self> {
        let db = AttimoDb::open_with(path, config.db_config(), config.seed()).await?;
        Ok(Self::new(db, config.page_size()))
    }

    pub fn db(&self) -> &AttimoDb {
        &self.db
    }

    pub async fn list_categories(&self) -> Result<Vec<String>> {
        self.db.list_categories().await
    }

    pub async fn list_category_columns(
        &self,
        category: &str,
        filter: &ColumnFilter,
    ) -> Result<Vec<String>> {
        self.db.list_category_columns(category, filter).await
    }

    pub async fn get_column_datatype(&self, category: &str, column: &str) -> Result<Datatype> {
        self.db.get_datatype(category, column).await
    }

    pub async fn create_category(&self, template: &CategoryTemplate) -> Result<()> {
        self.db.create_category(template).await
    }

    pub async fn create_row(&self, category: &str, data: &RowData) -> Result<i64> {
        self.db.create_row(category, data).await
    }

    pub async fn delete_row(&self, category: &str, id: i64) -> Result<()> {
        self.db.delete_row(category, id).await
    }

    /// One page of rows plus paging totals.
    pub async fn list_rows(&self, mut opts: ListRowsOptions) -> Result<ListRowsResult> {
        if opts.page < 1 {
            opts.page = 1;
        }
        if opts.page_size < 1 {
            opts.page_size = self.page_size;
        }

        let page = self
            .db
            .list_rows(&opts.category, &opts.filters, opts.page, opts.page_size)
            .await?;
        let total_pages = page.total.div_ceil(u64::from(opts.page_size));

        info!(
            category = %opts.category,
            rows = page.rows.len(),
            page = opts.page,
            total_pages,
            "Listed rows"
        );
        Ok(ListRowsResult {
            rows: page.rows,
            total_rows: page.total,
            current_page: opts.page,
            total_pages,
            page_size: opts.page_size,
        })
    }

    pub async fn list_pending_pointers(&self) -> Result<Vec<String>> {
        self.db.list_pending_pointers().await
    }

    pub async fn list_pending_items(&self) -> Result<Vec<PendingItem>> {
        self.db.list_pending_items().await
    }

    pub async fn close_item(
        &self,
        category: &str,
        id: i64,
        close_value: impl Into<Value>,
    ) -> Result<()> {
        self.db.close_item(category, id, close_value).await
    }

    /// Close the item behind a `"<category>:<id>"` pointer.
    pub async fn close_pointer(&self, pointer: &str, close_value: impl Into<Value>) -> Result<()> {
        self.db.close_pointer(pointer, close_value).await
    }

    pub async fn suggest_values(
        &self,
        category: &str,
        column: &str,
        limit: usize,
    ) -> Result<Vec<String>> {
        self.db.suggest_values(category, column, limit).await
    }

    /// Turn `column=value` text pairs into a row, typed by each column's datatype.
    pub async fn parse_assignments(
        &self,
        category: &str,
        pairs: &[(String, String)],
    ) -> Result<RowData> {
        let mut row = RowData::new();
        for (column, raw) in pairs {
            let datatype = self.get_column_datatype(category, column).await?;
            row.insert(column.clone(), parse_cell(&datatype, raw)?);
        }
        Ok(row)
    }
}

/// Parse user-entered text for a column. Empty text means no value.
pub fn parse_cell(datatype: &Datatype, raw: &str) -> Result<Value> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(Value::Null);
    }

    let invalid = || {
        DbError::validation(
            &datatype.name,
            format!("'{}' is not a valid {}", raw, datatype.variable_type),
        )
    };
    Ok(match datatype.variable_type {
        VariableType::Int => Value::Integer(raw.parse().map_err(|_| invalid())?),
        VariableType::Float => Value::Real(raw.parse().map_err(|_| invalid())?),
        VariableType::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "yes" | "1" => Value::Bool(true),
            "false" | "no" | "0" => Value::Bool(false),
            _ => return Err(invalid()),
        },
        VariableType::Csv => Value::csv(raw.split(',').filter(|s| !s.trim().is_empty())),
        VariableType::String | VariableType::Time => Value::Text(raw.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    async fn controller(tmp: &TempDir) -> Controller {
        Controller::open_at(&tmp.path().join("attimo.sqlite3"), &AttimoConfig::default())
            .await
            .unwrap()
    }

    fn financial(note: &str) -> RowData {
        let mut row = RowData::new();
        row.insert("Opened".into(), Value::from("01-02-2024"));
        row.insert("Note".into(), Value::from(note));
        row.insert("Location".into(), Value::from("Berlin"));
        row.insert("Cost_EUR".into(), Value::from(120));
        row
    }

    #[tokio::test]
    async fn test_list_rows_paging() {
        let tmp = TempDir::new().unwrap();
        let ctrl = controller(&tmp).await;
        for i in 0..7 {
            ctrl.create_row("Financial", &financial(&format!("invoice {i}")))
                .await
                .unwrap();
        }

        let first = ctrl
            .list_rows(ListRowsOptions {
                category: "Financial".into(),
                page: 1,
                page_size: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(first.rows.len(), 3);
        assert_eq!(first.total_rows, 7);
        assert_eq!(first.total_pages, 3);

        let last = ctrl
            .list_rows(ListRowsOptions {
                category: "Financial".into(),
                page: 3,
                page_size: 3,
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(last.rows.len(), 1);
        assert_eq!(last.current_page, 3);
    }

    #[tokio::test]
    async fn test_list_rows_clamps_options() {
        let tmp = TempDir::new().unwrap();
        let ctrl = controller(&tmp).await;
        ctrl.create_row("Financial", &financial("only")).await.unwrap();

        let result = ctrl
            .list_rows(ListRowsOptions {
                category: "Financial".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(result.current_page, 1);
        assert_eq!(result.page_size, DEFAULT_PAGE_SIZE);
        assert_eq!(result.total_pages, 1);
    }

    #[tokio::test]
    async fn test_empty_category_has_zero_pages() {
        let tmp = TempDir::new().unwrap();
        let ctrl = controller(&tmp).await;

        let result = ctrl
            .list_rows(ListRowsOptions {
                category: "Contact".into(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(result.rows.is_empty());
        assert_eq!(result.total_pages, 0);
    }

    #[tokio::test]
    async fn test_parse_assignments_uses_column_types() {
        let tmp = TempDir::new().unwrap();
        let ctrl = controller(&tmp).await;

        let pairs = vec![
            ("Note".to_string(), "42".to_string()),
            ("Cost_EUR".to_string(), " 42 ".to_string()),
            ("Closed".to_string(), "".to_string()),
        ];
        let row = ctrl.parse_assignments("Financial", &pairs).await.unwrap();
        assert_eq!(row["Note"], Value::from("42"));
        assert_eq!(row["Cost_EUR"], Value::Integer(42));
        assert_eq!(row["Closed"], Value::Null);

        let bad = vec![("Cost_EUR".to_string(), "lots".to_string())];
        let err = ctrl.parse_assignments("Financial", &bad).await.unwrap_err();
        assert!(err.is_validation());

        let unknown = vec![("Email".to_string(), "a@b.co".to_string())];
        let err = ctrl.parse_assignments("Financial", &unknown).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_close_by_pointer() {
        let tmp = TempDir::new().unwrap();
        let ctrl = controller(&tmp).await;
        let id = ctrl.create_row("Financial", &financial("rent")).await.unwrap();

        let pointers = ctrl.list_pending_pointers().await.unwrap();
        assert_eq!(pointers, vec![format!("Financial:{id}")]);

        ctrl.close_pointer(&pointers[0], "03-02-2024").await.unwrap();
        assert!(ctrl.list_pending_pointers().await.unwrap().is_empty());
        assert!(ctrl
            .close_pointer(&pointers[0], "04-02-2024")
            .await
            .unwrap_err()
            .is_not_found());
    }
}
