//! Query MCP Library
//!
//! A single MCP tool, `run_query`, that classifies a SQL statement by its
//! command kind, checks it against a configured allow/disallow policy, and
//! runs permitted statements against a warehouse connection.
//!
//! # Usage as Library
//!
//! ```rust,ignore
//! use query_mcp::{QueryConfig, QueryMcpServer};
//!
//! let config = QueryConfig::from_toml("[sql.permissions]\nselect = true")?;
//! let server = QueryMcpServer::from_config(config);
//! let decision = server.validate("SELECT 1");
//! assert!(decision.valid);
//! ```

pub mod classify;
pub mod config;
pub mod policy;
pub mod query;
pub mod server;
pub mod warehouse;

pub use classify::{StatementClassifier, StatementType};
pub use config::QueryConfig;
pub use policy::{PolicyDecision, PolicyRule, SqlPolicy};
pub use query::{run_query, QueryTag};
pub use server::{QueryMcpServer, RunQueryParams};
pub use warehouse::{ConnectionProvider, Row, ScopedConnection, SqliteWarehouse};
