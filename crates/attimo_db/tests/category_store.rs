use attimo_db::{
    AttimoDb, CategoryTemplate, CompletionSort, DatatypeSeed, DbConfig, DbError, FillBehavior,
    RowData, Seed, Value, VariableType,
};
use tempfile::TempDir;

/// Small catalog without filesystem-dependent checks.
fn seed() -> Seed {
    use CompletionSort::{Alphabetic, Frequency, Last, No};
    use FillBehavior::{Close, Open};

    Seed {
        datatypes: vec![
            DatatypeSeed::new("Opened", VariableType::Time, "date", Last, "date", Open),
            DatatypeSeed::new("Closed", VariableType::Time, "date", Last, "date", Close),
            DatatypeSeed::new("Note", VariableType::String, "no", No, "nonempty", Open),
            DatatypeSeed::new("Person", VariableType::String, "unique", Frequency, "nonempty", Open),
            DatatypeSeed::new("Rating", VariableType::Int, "in(1,2,3,4,5)", No, "range(1,5)", Open),
            DatatypeSeed::new("Email", VariableType::String, "unique", Alphabetic, "mail", Open),
            DatatypeSeed::new("Tags", VariableType::Csv, "unique", Frequency, "nonempty", Open),
            DatatypeSeed::new("Amount", VariableType::Float, "no", No, "no", Open),
            DatatypeSeed::new("Paid", VariableType::Bool, "no", No, "no", Open),
        ],
        categories: vec![
            // Opened, Closed, Note, Person, Rating
            CategoryTemplate::new("Task", vec![1, 2, 3, 4, 5]),
            // Closed only: nothing to fill at open time
            CategoryTemplate::new("Archive", vec![2]),
            // Opened, Note, Email, Tags: no close column
            CategoryTemplate::new("Journal", vec![1, 3, 6, 7]),
            // Amount, Paid
            CategoryTemplate::new("Expense", vec![8, 9]),
        ],
    }
}

async fn open(tmp: &TempDir) -> AttimoDb {
    AttimoDb::open_with(tmp.path().join("attimo.sqlite3"), DbConfig::default(), seed())
        .await
        .unwrap()
}

fn task(note: &str, rating: i64) -> RowData {
    let mut row = RowData::new();
    row.insert("Opened".into(), Value::from("01-03-2024"));
    row.insert("Note".into(), Value::from(note));
    row.insert("Person".into(), Value::from("Ada"));
    row.insert("Rating".into(), Value::from(rating));
    row
}

#[tokio::test]
async fn test_create_and_read_roundtrip() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let data = task("write report", 4);
    let id = db.create_row("Task", &data).await.unwrap();
    let row = db.read_row("Task", id).await.unwrap();

    for (key, value) in &data {
        assert_eq!(&row[key], value, "column {key}");
    }
    assert_eq!(row["id"], Value::Integer(id));
    assert_eq!(row["Closed"], Value::Null);
    assert_eq!(row["deleted_at"], Value::Null);
    assert!(matches!(row["created_at"], Value::Text(_)));
}

#[tokio::test]
async fn test_pending_lifecycle() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let first = db.create_row("Task", &task("one", 1)).await.unwrap();
    let second = db.create_row("Task", &task("two", 2)).await.unwrap();
    assert_eq!(
        db.list_pending_pointers().await.unwrap(),
        vec![format!("Task:{second}"), format!("Task:{first}")]
    );

    db.close_item("Task", first, "02-03-2024").await.unwrap();
    assert_eq!(
        db.list_pending_pointers().await.unwrap(),
        vec![format!("Task:{second}")]
    );
    let row = db.read_row("Task", first).await.unwrap();
    assert_eq!(row["Closed"], Value::from("02-03-2024"));

    // Open -> Closed is terminal.
    let err = db.close_item("Task", first, "03-03-2024").await.unwrap_err();
    assert!(err.is_not_found());

    db.close_pointer(&format!("Task:{second}"), "04-03-2024")
        .await
        .unwrap();
    assert!(db.list_pending_pointers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_created_closed_is_not_pending() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let mut data = task("done already", 3);
    data.insert("Closed".into(), Value::from("01-03-2024"));
    db.create_row("Task", &data).await.unwrap();

    // A category with no open column is never tracked.
    let mut archived = RowData::new();
    archived.insert("Closed".into(), Value::Null);
    db.create_row("Archive", &archived).await.unwrap();

    assert!(db.list_pending_pointers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_update_with_close_value_deregisters() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let id = db.create_row("Task", &task("edit me", 2)).await.unwrap();

    let mut change = RowData::new();
    change.insert("Rating".into(), Value::from(5));
    db.update_row("Task", id, &change).await.unwrap();
    assert_eq!(db.list_pending_pointers().await.unwrap().len(), 1);
    assert_eq!(db.read_row("Task", id).await.unwrap()["Rating"], Value::Integer(5));

    change.insert("Closed".into(), Value::from("05-03-2024"));
    db.update_row("Task", id, &change).await.unwrap();
    assert!(db.list_pending_pointers().await.unwrap().is_empty());

    let err = db.update_row("Task", 999, &change).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_closed_item_cannot_be_reopened() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let id = db.create_row("Task", &task("ship it", 3)).await.unwrap();
    db.close_item("Task", id, "06-03-2024").await.unwrap();

    let mut reopen = RowData::new();
    reopen.insert("Closed".into(), Value::Null);
    let err = db.update_row("Task", id, &reopen).await.unwrap_err();
    assert!(err.is_validation());

    assert!(db.list_pending_pointers().await.unwrap().is_empty());
    assert_eq!(
        db.read_row("Task", id).await.unwrap()["Closed"],
        Value::from("06-03-2024")
    );
}

#[tokio::test]
async fn test_numeric_input_reads_back_as_column_type() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let mut expense = RowData::new();
    expense.insert("Amount".into(), Value::Integer(12));
    expense.insert("Paid".into(), Value::Integer(1));
    let id = db.create_row("Expense", &expense).await.unwrap();

    let row = db.read_row("Expense", id).await.unwrap();
    assert_eq!(row["Amount"], Value::Real(12.0));
    assert_eq!(row["Paid"], Value::Bool(true));

    let mut change = RowData::new();
    change.insert("Paid".into(), Value::Integer(0));
    db.update_row("Expense", id, &change).await.unwrap();
    assert_eq!(db.read_row("Expense", id).await.unwrap()["Paid"], Value::Bool(false));

    change.insert("Paid".into(), Value::Integer(2));
    assert!(db.update_row("Expense", id, &change).await.unwrap_err().is_validation());
}

#[tokio::test]
async fn test_delete_deregisters_and_hides_row() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let id = db.create_row("Task", &task("drop me", 1)).await.unwrap();
    db.delete_row("Task", id).await.unwrap();

    assert!(db.list_pending_pointers().await.unwrap().is_empty());
    assert!(db.read_row("Task", id).await.unwrap_err().is_not_found());
    assert!(db.delete_row("Task", id).await.unwrap_err().is_not_found());
    assert!(db
        .close_item("Task", id, "02-03-2024")
        .await
        .unwrap_err()
        .is_not_found());
}

#[tokio::test]
async fn test_failed_validation_leaves_nothing_behind() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let mut data = task("almost", 3);
    data.insert("Rating".into(), Value::from(11));
    let err = db.create_row("Task", &data).await.unwrap_err();
    assert!(err.is_validation(), "{err}");

    let page = db.list_rows("Task", &RowData::new(), 1, 10).await.unwrap();
    assert_eq!(page.total, 0);
    assert!(db.list_pending_pointers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_open_column_is_rejected() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let mut data = task("no person", 3);
    data.remove("Person");
    let err = db.create_row("Task", &data).await.unwrap_err();
    assert!(matches!(err, DbError::Validation { ref column, .. } if column == "Person"));
}

#[tokio::test]
async fn test_injection_is_rejected_before_sql() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let err = db
        .create_row("Task; DROP TABLE pending", &task("x", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidIdentifier(_)));

    let mut data = task("x", 1);
    data.insert("Note\" = 1; --".into(), Value::from("y"));
    let err = db.create_row("Task", &data).await.unwrap_err();
    assert!(matches!(err, DbError::InvalidIdentifier(_)));

    assert_eq!(
        db.list_categories().await.unwrap(),
        vec!["Archive", "Expense", "Journal", "Task"]
    );
    assert!(db.list_pending_pointers().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_errors_are_distinguishable() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    assert!(db.read_row("Nowhere", 1).await.unwrap_err().is_not_found());
    assert!(db.read_row("Task", 42).await.unwrap_err().is_not_found());
    assert!(db
        .close_item("Journal", 1, "01-01-2024")
        .await
        .unwrap_err()
        .is_config());

    let id = db.create_row("Task", &task("bad close", 1)).await.unwrap();
    let err = db.close_item("Task", id, "2024-01-02").await.unwrap_err();
    assert!(err.is_validation());
    assert!(matches!(
        db.close_pointer("Task-1", "01-01-2024").await,
        Err(DbError::InvalidPointer(_))
    ));
}

#[tokio::test]
async fn test_list_rows_pagination_and_filters() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let mut ids = Vec::new();
    for i in 0..7 {
        let rating = if i % 2 == 0 { 5 } else { 1 };
        ids.push(db.create_row("Task", &task(&format!("t{i}"), rating)).await.unwrap());
    }

    let first = db.list_rows("Task", &RowData::new(), 1, 3).await.unwrap();
    assert_eq!(first.total, 7);
    assert_eq!(first.rows.len(), 3);
    assert_eq!(first.rows[0]["id"], Value::Integer(ids[6]));

    let last = db.list_rows("Task", &RowData::new(), 3, 3).await.unwrap();
    assert_eq!(last.rows.len(), 1);
    assert_eq!(last.rows[0]["id"], Value::Integer(ids[0]));

    let mut filter = RowData::new();
    filter.insert("Rating".into(), Value::from(5));
    let fives = db.list_rows("Task", &filter, 1, 10).await.unwrap();
    assert_eq!(fives.total, 4);

    filter.insert("Closed".into(), Value::Null);
    assert_eq!(db.list_rows("Task", &filter, 1, 10).await.unwrap().total, 4);

    let mut bad = RowData::new();
    bad.insert("Email".into(), Value::from("a@b.co"));
    assert!(db.list_rows("Task", &bad, 1, 10).await.unwrap_err().is_validation());

    let beyond = db.list_rows("Task", &RowData::new(), u32::MAX, u32::MAX).await.unwrap();
    assert_eq!(beyond.total, 7);
    assert!(beyond.rows.is_empty());
}

#[tokio::test]
async fn test_list_pending_items_resolves_rows() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    let id = db.create_row("Task", &task("resolve me", 2)).await.unwrap();
    let items = db.list_pending_items().await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].pointer.to_string(), format!("Task:{id}"));
    assert_eq!(items[0].row["Note"], Value::from("resolve me"));
}

#[tokio::test]
async fn test_suggest_values() {
    let tmp = TempDir::new().unwrap();
    let db = open(&tmp).await;

    for (person, email, tags) in [
        ("Ada", "zed@example.com", "work,home"),
        ("Bob", "amy@example.com", "work"),
        ("Bob", "amy@example.com", "errand"),
    ] {
        let mut journal = RowData::new();
        journal.insert("Opened".into(), Value::from("01-03-2024"));
        journal.insert("Note".into(), Value::from("entry"));
        journal.insert("Email".into(), Value::from(email));
        journal.insert("Tags".into(), Value::from(tags));
        db.create_row("Journal", &journal).await.unwrap();

        let mut data = task("suggest", 1);
        data.insert("Person".into(), Value::from(person));
        db.create_row("Task", &data).await.unwrap();
    }

    assert_eq!(db.suggest_values("Task", "Person", 5).await.unwrap(), ["Bob", "Ada"]);
    assert_eq!(
        db.suggest_values("Task", "Rating", 2).await.unwrap(),
        ["1", "2"]
    );
    assert!(db.suggest_values("Task", "Note", 5).await.unwrap().is_empty());
    assert_eq!(
        db.suggest_values("Journal", "Email", 5).await.unwrap(),
        ["amy@example.com", "zed@example.com"]
    );
    assert_eq!(
        db.suggest_values("Journal", "Tags", 5).await.unwrap(),
        ["work", "errand", "home"]
    );
    assert_eq!(
        db.suggest_values("Journal", "Opened", 5).await.unwrap(),
        Vec::<String>::new()
    );
}
