//! Bootstrap seed: the datatypes and category templates written on first open.

use crate::types::{CategoryTemplate, CompletionSort, FillBehavior, VariableType};
use serde::Deserialize;

/// Schema version recorded in the metadata table.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Datatype definition before it has been assigned an id.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DatatypeSeed {
    pub name: String,
    pub variable_type: VariableType,
    #[serde(default = "default_completion")]
    pub completion_value: String,
    #[serde(default)]
    pub completion_sort: CompletionSort,
    #[serde(default = "default_check")]
    pub value_check: String,
    #[serde(default)]
    pub fill_behavior: FillBehavior,
}

fn default_completion() -> String {
    "no".to_string()
}

fn default_check() -> String {
    "nonempty".to_string()
}

impl DatatypeSeed {
    pub fn new(
        name: &str,
        variable_type: VariableType,
        completion_value: &str,
        completion_sort: CompletionSort,
        value_check: &str,
        fill_behavior: FillBehavior,
    ) -> Self {
        Self {
            name: name.to_string(),
            variable_type,
            completion_value: completion_value.to_string(),
            completion_sort,
            value_check: value_check.to_string(),
            fill_behavior,
        }
    }
}

/// Everything written by the bootstrap transaction.
///
/// Datatypes receive ids 1..=n in list order; templates reference those ids.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Seed {
    #[serde(default)]
    pub datatypes: Vec<DatatypeSeed>,
    #[serde(default)]
    pub categories: Vec<CategoryTemplate>,
}

impl Seed {
    /// Built-in datatypes and categories.
    pub fn builtin() -> Self {
        Self {
            datatypes: default_datatypes(),
            categories: default_categories(),
        }
    }

    /// Append extra datatypes and categories after the current ones.
    pub fn extend(mut self, other: Seed) -> Self {
        self.datatypes.extend(other.datatypes);
        self.categories.extend(other.categories);
        self
    }
}

/// Built-in datatypes, in id order (Opened = 1).
pub fn default_datatypes() -> Vec<DatatypeSeed> {
    use CompletionSort::{Frequency, Last, No};
    use FillBehavior::{Close, Open};
    use VariableType::{Csv, Int, Time};
    let text = VariableType::String;

    vec![
        DatatypeSeed::new("Opened", Time, "date", Last, "date", Open),
        DatatypeSeed::new("Closed", Time, "date", Last, "date", Close),
        DatatypeSeed::new("Note", text, "no", No, "nonempty", Open),
        DatatypeSeed::new("Project", text, "unique", Last, "nonempty", Open),
        DatatypeSeed::new("Person", text, "unique", Frequency, "nonempty", Open),
        DatatypeSeed::new("Location", text, "unique", Last, "nonempty", Open),
        DatatypeSeed::new("URL", text, "no", No, "url", Open),
        DatatypeSeed::new("Cost_EUR", Int, "no", No, "range(0,1000000000)", Open),
        DatatypeSeed::new("Deadline", Time, "date", Last, "date", Open),
        DatatypeSeed::new("Rating", Int, "in(1,2,3,4,5)", Frequency, "range(1,5)", Open),
        DatatypeSeed::new("Email", text, "unique", No, "mail", Open),
        DatatypeSeed::new("Phone", text, "no", No, "phone", Open),
        DatatypeSeed::new("File", text, "file", No, "file_exists", Open),
        DatatypeSeed::new(
            "Priority",
            text,
            "in(Low,Medium,High,Urgent)",
            Frequency,
            "in(Low,Medium,High,Urgent)",
            Open,
        ),
        DatatypeSeed::new(
            "Status",
            text,
            "in(Not Started,In Progress,On Hold,Completed,Cancelled)",
            Last,
            "in(Not Started,In Progress,On Hold,Completed,Cancelled)",
            Open,
        ),
        DatatypeSeed::new("Tags", Csv, "unique", Frequency, "nonempty", Open),
        DatatypeSeed::new("Progress", Int, "in(0,25,50,75,100)", Last, "range(0,100)", Open),
    ]
}

/// Built-in categories.
pub fn default_categories() -> Vec<CategoryTemplate> {
    vec![
        // Opened, Closed, Note, Project, Location, File
        CategoryTemplate::new("General", vec![1, 2, 3, 4, 6, 13]),
        // Opened, Closed, Note, Email, Phone, File
        CategoryTemplate::new("Contact", vec![1, 2, 3, 11, 12, 13]),
        // Opened, Closed, Note, Location, Cost_EUR
        CategoryTemplate::new("Financial", vec![1, 2, 3, 6, 8]),
    ]
}
