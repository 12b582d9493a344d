//! Attimo command-line interface
//!
//! Every command opens the configured database (bootstrapping it on first
//! use), performs one operation, and prints a table or JSON.

use anyhow::{bail, Context, Result};
use attimo::config::{attimo_home, config_path, AttimoConfig};
use attimo::{Controller, ListRowsOptions};
use attimo_db::identifier::is_audit_column;
use attimo_db::{row_data_from_json, ColumnFilter, FillBehavior};
use attimo_logging::LogConfig;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;

mod output;

use output::{cell, print_json, print_table, summarize};

/// Date format used for close values entered on the command line
const CLOSE_DATE_FORMAT: &str = "%d-%m-%Y";

#[derive(Parser, Debug)]
#[command(name = "attimo", version, about = "Track open items across user-defined categories")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Database file (default: <home>/attimo.sqlite3)
    #[arg(long, global = true, env = "ATTIMO_DB")]
    db: Option<PathBuf>,

    /// Config file (default: <home>/config.toml)
    #[arg(long, global = true, env = "ATTIMO_CONFIG")]
    config: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List categories
    Categories,

    /// List the columns of a category
    Columns {
        category: String,

        /// Only columns filled when an item is opened or closed
        #[arg(long, value_enum)]
        fill: Option<Fill>,

        /// Only these columns (repeatable)
        #[arg(long)]
        include: Vec<String>,

        /// Skip these columns (repeatable)
        #[arg(long)]
        exclude: Vec<String>,
    },

    /// Add an item to a category
    Add {
        category: String,

        /// Column value, e.g. --set Note="call back" (repeatable)
        #[arg(long = "set", value_parser = parse_assignment, required_unless_present = "row")]
        set: Vec<(String, String)>,

        /// Whole row as a JSON object, e.g. --row '{"Note": "call back"}'
        #[arg(long, conflicts_with = "set")]
        row: Option<String>,
    },

    /// List items of a category, newest first
    List {
        category: String,

        /// Page number (1-based)
        #[arg(long, default_value_t = 1)]
        page: u32,

        /// Rows per page (default from config)
        #[arg(long)]
        page_size: Option<u32>,

        /// Equality filter, e.g. --where Location=Berlin (repeatable)
        #[arg(long = "where", value_parser = parse_assignment)]
        filters: Vec<(String, String)>,
    },

    /// Show items that are still open
    Pending,

    /// Close an open item
    Close {
        /// Pending pointer, e.g. General:3
        pointer: String,

        /// Close value (default: today, DD-MM-YYYY)
        #[arg(long)]
        value: Option<String>,
    },

    /// Delete an item
    Delete { category: String, id: i64 },

    /// Show the datatype behind a column
    Datatype { category: String, column: String },

    /// Suggest values for a column
    Suggest {
        category: String,
        column: String,

        /// Maximum number of suggestions
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },

    /// Show resolved paths
    Config,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Fill {
    Open,
    Close,
}

impl From<Fill> for FillBehavior {
    fn from(fill: Fill) -> Self {
        match fill {
            Fill::Open => FillBehavior::Open,
            Fill::Close => FillBehavior::Close,
        }
    }
}

/// Parse `Column=value`; the value may be empty or contain '='.
fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    let (column, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected Column=value, got '{}'", s))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in '{}'", s));
    }
    Ok((column.to_string(), value.to_string()))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let json_mode = cli.json;

    match run_cli(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            if json_mode {
                let body = serde_json::json!({ "error": format!("{:#}", err) });
                println!("{}", body);
            } else {
                eprintln!("Error: {:#}", err);
            }
            ExitCode::from(1)
        }
    }
}

fn run_cli(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => AttimoConfig::load(path)?,
        None => AttimoConfig::load_default()?,
    };

    let log_dir = config.log_dir();
    let _log_guard = match attimo_logging::init_logging(LogConfig {
        app_name: "attimo",
        log_dir: Some(&log_dir),
        filter: config.logging.filter.as_deref(),
        verbose: cli.verbose,
    }) {
        Ok(guard) => Some(guard),
        Err(err) => {
            eprintln!("Warning: failed to initialize logging: {:#}", err);
            None
        }
    };

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async { run(cli, config).await })
}

async fn run(cli: Cli, config: AttimoConfig) -> Result<()> {
    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());

    if let Commands::Config = cli.command {
        return show_config(&config, &db_path, cli.json);
    }

    debug!(path = %db_path.display(), "Opening database");
    let ctrl = Controller::open_at(&db_path, &config)
        .await
        .with_context(|| format!("Failed to open database: {}", db_path.display()))?;

    match cli.command {
        Commands::Categories => {
            let categories = ctrl.list_categories().await?;
            if cli.json {
                print_json(&categories)?;
            } else {
                for category in categories {
                    println!("{}", category);
                }
            }
        }

        Commands::Columns {
            category,
            fill,
            include,
            exclude,
        } => {
            let filter = ColumnFilter {
                include,
                exclude,
                fill_behavior: fill.map(FillBehavior::from),
            };
            let columns = ctrl.list_category_columns(&category, &filter).await?;

            let mut datatypes = Vec::with_capacity(columns.len());
            for column in &columns {
                datatypes.push(ctrl.get_column_datatype(&category, column).await?);
            }
            if cli.json {
                print_json(&datatypes)?;
            } else {
                let rows = datatypes
                    .iter()
                    .map(|dt| {
                        vec![
                            dt.name.clone(),
                            dt.variable_type.to_string(),
                            dt.fill_behavior.to_string(),
                            dt.value_check.clone(),
                            dt.completion_value.clone(),
                        ]
                    })
                    .collect();
                print_table(&["Column", "Type", "Fill", "Check", "Completion"], rows);
            }
        }

        Commands::Add { category, set, row } => {
            let data = match row {
                Some(json) => row_data_from_json(&json)?,
                None => ctrl.parse_assignments(&category, &set).await?,
            };
            let id = ctrl.create_row(&category, &data).await?;
            if cli.json {
                print_json(&serde_json::json!({ "category": category, "id": id }))?;
            } else {
                println!("Created {}:{}", category, id);
            }
        }

        Commands::List {
            category,
            page,
            page_size,
            filters,
        } => {
            let filters = ctrl.parse_assignments(&category, &filters).await?;
            let result = ctrl
                .list_rows(ListRowsOptions {
                    category: category.clone(),
                    page,
                    page_size: page_size.unwrap_or(0),
                    filters,
                })
                .await?;

            if cli.json {
                print_json(&result)?;
            } else {
                let columns = ctrl
                    .list_category_columns(&category, &ColumnFilter::default())
                    .await?;
                let mut headers = vec!["id"];
                headers.extend(columns.iter().map(String::as_str));

                let rows = result
                    .rows
                    .iter()
                    .map(|row| headers.iter().map(|h| cell(row.get(*h))).collect())
                    .collect();
                print_table(&headers, rows);
                println!(
                    "Page {} of {} ({} rows)",
                    result.current_page, result.total_pages, result.total_rows
                );
            }
        }

        Commands::Pending => {
            let items = ctrl.list_pending_items().await?;
            if cli.json {
                print_json(&items)?;
            } else {
                let rows = items
                    .iter()
                    .map(|item| {
                        let columns: Vec<String> = item
                            .row
                            .keys()
                            .filter(|k| !is_audit_column(k))
                            .cloned()
                            .collect();
                        vec![
                            item.pointer.to_string(),
                            item.pending_since.clone(),
                            summarize(&item.row, &columns),
                        ]
                    })
                    .collect();
                print_table(&["Pointer", "Since", "Details"], rows);
            }
        }

        Commands::Close { pointer, value } => {
            let value = value
                .unwrap_or_else(|| chrono::Local::now().format(CLOSE_DATE_FORMAT).to_string());
            ctrl.close_pointer(&pointer, value.as_str()).await?;
            if cli.json {
                print_json(&serde_json::json!({ "closed": pointer, "value": value }))?;
            } else {
                println!("Closed {} ({})", pointer, value);
            }
        }

        Commands::Delete { category, id } => {
            ctrl.delete_row(&category, id).await?;
            if cli.json {
                print_json(&serde_json::json!({ "deleted": format!("{}:{}", category, id) }))?;
            } else {
                println!("Deleted {}:{}", category, id);
            }
        }

        Commands::Datatype { category, column } => {
            let dt = ctrl.get_column_datatype(&category, &column).await?;
            if cli.json {
                print_json(&dt)?;
            } else {
                print_table(
                    &["Field", "Value"],
                    vec![
                        vec!["id".into(), dt.id.to_string()],
                        vec!["name".into(), dt.name.clone()],
                        vec!["type".into(), dt.variable_type.to_string()],
                        vec!["check".into(), dt.value_check.clone()],
                        vec!["completion".into(), dt.completion_value.clone()],
                        vec!["sort".into(), dt.completion_sort.as_str().to_string()],
                        vec!["fill".into(), dt.fill_behavior.to_string()],
                    ],
                );
            }
        }

        Commands::Suggest {
            category,
            column,
            limit,
        } => {
            let values = ctrl.suggest_values(&category, &column, limit).await?;
            if cli.json {
                print_json(&values)?;
            } else {
                for value in values {
                    println!("{}", value);
                }
            }
        }

        Commands::Config => bail!("config command is handled before opening the database"),
    }

    Ok(())
}

/// Show resolved paths
fn show_config(config: &AttimoConfig, db_path: &std::path::Path, json: bool) -> Result<()> {
    let home = attimo_home();
    let config_file = config_path();
    let log_dir = config.log_dir();

    if json {
        print_json(&serde_json::json!({
            "home": home.to_string_lossy(),
            "config": {
                "path": config_file.to_string_lossy(),
                "exists": config_file.exists(),
            },
            "database": {
                "path": db_path.to_string_lossy(),
                "exists": db_path.exists(),
            },
            "logs": log_dir.to_string_lossy(),
            "page_size": config.page_size(),
        }))
    } else {
        print_table(
            &["Setting", "Value"],
            vec![
                vec!["home".into(), home.display().to_string()],
                vec!["config".into(), config_file.display().to_string()],
                vec!["database".into(), db_path.display().to_string()],
                vec!["logs".into(), log_dir.display().to_string()],
                vec!["page size".into(), config.page_size().to_string()],
            ],
        );
        Ok(())
    }
}
