//! Configuration for the Query MCP Server

use crate::classify::DEFAULT_DIALECT;
use crate::policy::SqlPolicy;
use anyhow::{bail, Context, Result};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Query MCP configuration
#[derive(Debug, Clone, Deserialize)]
pub struct QueryConfig {
    /// Warehouse connection settings
    #[serde(default)]
    pub warehouse: WarehouseConfig,

    /// Statement classification and permissions
    #[serde(default)]
    pub sql: SqlConfig,

    /// Default query tag fields, merged under any caller-supplied tag
    #[serde(default = "default_query_tag")]
    pub query_tag: Map<String, Value>,
}

/// Warehouse connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct WarehouseConfig {
    /// Path to the SQLite database file
    /// Default: `:memory:`
    #[serde(default = "default_path")]
    pub path: PathBuf,

    /// Busy timeout in seconds
    /// Default: 30
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

/// SQL statement settings
#[derive(Debug, Clone, Deserialize)]
pub struct SqlConfig {
    /// sqlparser dialect used for classification
    #[serde(default = "default_dialect")]
    pub dialect: String,

    /// Statement type permissions, e.g. `select = true`, `drop = false`.
    /// The special keys `all` and `unknown` widen what is allowed.
    /// Default: empty, which rejects every statement.
    #[serde(default)]
    pub permissions: BTreeMap<String, bool>,
}

fn default_path() -> PathBuf {
    PathBuf::from(":memory:")
}

fn default_timeout() -> u64 {
    30
}

fn default_dialect() -> String {
    DEFAULT_DIALECT.to_string()
}

fn default_query_tag() -> Map<String, Value> {
    let mut tag = Map::new();
    tag.insert("origin".to_string(), Value::from("binks"));
    tag.insert("name".to_string(), Value::from("query-mcp"));
    tag
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            warehouse: WarehouseConfig::default(),
            sql: SqlConfig::default(),
            query_tag: default_query_tag(),
        }
    }
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            timeout_secs: default_timeout(),
        }
    }
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            dialect: default_dialect(),
            permissions: BTreeMap::new(),
        }
    }
}

impl QueryConfig {
    /// Location of the config file
    ///
    /// 1. `QUERY_CONFIG_PATH` environment variable
    /// 2. `~/.binks/query.toml`
    pub fn path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var("QUERY_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }
        Ok(dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".binks")
            .join("query.toml"))
    }

    /// Load configuration from the file named by [`QueryConfig::path`]
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load and validate configuration from `config_path`
    ///
    /// A missing file yields the defaults, which reject every statement.
    /// A file that exists but fails to parse or validate is an error.
    pub fn load_from(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            tracing::info!("No config at {:?}, using defaults", config_path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;

        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse config from {:?}", config_path))?;
        config
            .validate()
            .with_context(|| format!("Invalid config in {:?}", config_path))?;
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Reject settings that would otherwise be silently replaced
    pub fn validate(&self) -> Result<()> {
        if sqlparser::dialect::dialect_from_str(&self.sql.dialect).is_none() {
            bail!("Unknown SQL dialect '{}'", self.sql.dialect);
        }
        if self.warehouse.path.as_os_str().is_empty() {
            bail!("warehouse.path must not be empty");
        }
        Ok(())
    }

    /// Allow/disallow policy built from `sql.permissions`
    pub fn policy(&self) -> SqlPolicy {
        SqlPolicy::from_permissions(&self.sql.permissions)
    }
}
