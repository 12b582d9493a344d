//! Output formatting for CLI commands

use attimo_db::{RowData, Value};
use comfy_table::{presets::UTF8_FULL_CONDENSED, Cell, Color, ContentArrangement, Table};
use serde::Serialize;

/// Print a table with headers and rows
pub fn print_table(headers: &[&str], rows: Vec<Vec<String>>) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic);

    let header_cells: Vec<Cell> = headers
        .iter()
        .map(|h| Cell::new(h).fg(Color::Cyan))
        .collect();
    table.set_header(header_cells);

    for row in rows {
        table.add_row(row);
    }

    println!("{}", table);
}

/// Print a value as pretty JSON on stdout
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Cell text for a value; empty for NULL.
pub fn cell(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => v.to_string(),
    }
}

/// `Col=value` summary of the non-empty cells of a row, in `columns` order.
pub fn summarize(row: &RowData, columns: &[String]) -> String {
    columns
        .iter()
        .filter_map(|c| match row.get(c) {
            None | Some(Value::Null) => None,
            Some(v) => Some(format!("{}={}", c, v)),
        })
        .collect::<Vec<_>>()
        .join(", ")
}
