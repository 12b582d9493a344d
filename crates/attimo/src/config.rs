//! Configuration for Attimo
//!
//! Paths default to the Attimo home (`$ATTIMO_HOME` or `~/.attimo`).
//! An optional `config.toml` there overrides them and can extend the
//! built-in datatypes and categories used on first bootstrap.

use anyhow::{Context, Result};
use attimo_db::{CategoryTemplate, DatatypeSeed, DbConfig, Seed};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub use attimo_logging::attimo_home;

/// Rows per page when neither the caller nor the config says otherwise.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

const DEFAULT_DB_FILE: &str = "attimo.sqlite3";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AttimoConfig {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub list: ListConfig,
    /// Extra datatypes, appended after the built-in ones (ids continue from 18)
    pub datatypes: Vec<DatatypeSeed>,
    /// Extra categories, created alongside the built-in ones
    pub categories: Vec<CategoryTemplate>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Relative paths are resolved against the Attimo home
    pub path: Option<PathBuf>,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: None,
            max_connections: DbConfig::default().max_connections,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub filter: Option<String>,
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListConfig {
    pub page_size: u32,
}

impl Default for ListConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

/// Get the config file path: `<home>/config.toml`
pub fn config_path() -> PathBuf {
    attimo_home().join(CONFIG_FILE)
}

impl AttimoConfig {
    /// Load `<home>/config.toml`, or defaults when it does not exist.
    pub fn load_default() -> Result<Self> {
        Self::load(&config_path())
    }

    /// Load a config file; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Database file: configured path, else `<home>/attimo.sqlite3`.
    pub fn database_path(&self) -> PathBuf {
        resolve(self.database.path.as_deref(), DEFAULT_DB_FILE)
    }

    /// Log directory: configured dir, else `<home>/logs`.
    pub fn log_dir(&self) -> PathBuf {
        resolve(self.logging.dir.as_deref(), "logs")
    }

    pub fn db_config(&self) -> DbConfig {
        DbConfig {
            max_connections: self.database.max_connections,
        }
    }

    /// Built-in seed extended with the configured datatypes and categories.
    pub fn seed(&self) -> Seed {
        Seed::builtin().extend(Seed {
            datatypes: self.datatypes.clone(),
            categories: self.categories.clone(),
        })
    }

    pub fn page_size(&self) -> u32 {
        if self.list.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            self.list.page_size
        }
    }
}

fn resolve(configured: Option<&Path>, default_name: &str) -> PathBuf {
    match configured {
        Some(path) if path.is_absolute() => path.to_path_buf(),
        Some(path) => attimo_home().join(path),
        None => attimo_home().join(default_name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use attimo_db::{FillBehavior, VariableType};
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AttimoConfig::default();
        assert_eq!(config.page_size(), DEFAULT_PAGE_SIZE);
        assert_eq!(config.db_config().max_connections, 5);
        assert!(config.database_path().ends_with(DEFAULT_DB_FILE));
        assert!(config.log_dir().ends_with("logs"));
        assert_eq!(config.seed(), Seed::builtin());
    }

    #[test]
    fn test_parse_full_config() {
        let config = AttimoConfig::from_toml_str(
            r#"
            [database]
            path = "/var/lib/attimo/items.db"
            max_connections = 2

            [logging]
            filter = "attimo_db=debug"

            [list]
            page_size = 25

            [[datatypes]]
            name = "Severity"
            variable_type = "int"
            value_check = "range(1,3)"

            [[datatypes]]
            name = "Resolved"
            variable_type = "time"
            value_check = "date"
            fill_behavior = "close"

            [[categories]]
            name = "Incident"
            column_ids = [1, 3, 18, 19]
            "#,
        )
        .unwrap();

        assert_eq!(config.database_path(), PathBuf::from("/var/lib/attimo/items.db"));
        assert_eq!(config.db_config().max_connections, 2);
        assert_eq!(config.logging.filter.as_deref(), Some("attimo_db=debug"));
        assert_eq!(config.page_size(), 25);

        let seed = config.seed();
        assert_eq!(seed.datatypes.len(), 19);
        assert_eq!(seed.datatypes[17].variable_type, VariableType::Int);
        assert_eq!(seed.datatypes[18].fill_behavior, FillBehavior::Close);
        assert_eq!(seed.categories.last().unwrap().name, "Incident");
    }

    #[test]
    fn test_zero_page_size_falls_back() {
        let config = AttimoConfig::from_toml_str("[list]\npage_size = 0\n").unwrap();
        assert_eq!(config.page_size(), DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_load_missing_file_is_default() {
        let tmp = TempDir::new().unwrap();
        let config = AttimoConfig::load(&tmp.path().join("config.toml")).unwrap();
        assert!(config.datatypes.is_empty());
    }

    #[test]
    fn test_load_rejects_bad_toml() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.toml");
        std::fs::write(&path, "[list]\npage_size = \"many\"\n").unwrap();
        let err = AttimoConfig::load(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to parse config"));
    }
}
