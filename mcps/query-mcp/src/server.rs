//! Query MCP Server implementation

use crate::classify::StatementClassifier;
use crate::config::QueryConfig;
use crate::policy::{PolicyDecision, PolicyRule, SqlPolicy};
use crate::query::{self, QueryTag};
use crate::warehouse::{ConnectionProvider, SqliteWarehouse};
use mcp_common::{
    async_trait, invalid_params, json_success, EmbeddableError, EmbeddableMcp, EmbeddableResult,
    McpError, ResultExt,
};
use rmcp::{
    handler::server::{router::tool::ToolRouter, wrapper::Parameters},
    model::{CallToolResult, ServerCapabilities, ServerInfo, Tool},
    tool, tool_handler, tool_router,
};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::sync::Arc;

// ============================================================================
// Parameter Types
// ============================================================================

/// Parameters for run_query tool
#[derive(Debug, Deserialize, JsonSchema)]
pub struct RunQueryParams {
    /// SQL statement to execute
    pub statement: String,

    /// Optional custom query tag to be merged with default tags.
    /// Example: {"user": "alice", "app": "my_app"}
    #[serde(default)]
    pub query_tag: Option<Map<String, Value>>,
}

// ============================================================================
// Server Implementation
// ============================================================================

/// Query MCP Server
#[derive(Clone)]
pub struct QueryMcpServer {
    classifier: Arc<StatementClassifier>,
    policy: Arc<SqlPolicy>,
    default_tag: Arc<Map<String, Value>>,
    warehouse: Arc<dyn ConnectionProvider>,
    tool_router: ToolRouter<Self>,
}

impl QueryMcpServer {
    /// Create a server from `QueryConfig::load`
    ///
    /// Fails when a config file exists but is malformed or invalid, rather
    /// than serving with permissions the operator did not write.
    pub fn try_new() -> anyhow::Result<Self> {
        Ok(Self::from_config(QueryConfig::load()?))
    }

    /// Create a server backed by the SQLite warehouse named in `config`
    pub fn from_config(config: QueryConfig) -> Self {
        let warehouse = Arc::new(SqliteWarehouse::new(&config.warehouse));
        Self::with_provider(config, warehouse)
    }

    /// Create a server that runs statements over `warehouse`
    pub fn with_provider(config: QueryConfig, warehouse: Arc<dyn ConnectionProvider>) -> Self {
        let policy = config.policy();
        if policy.is_unconfigured() {
            tracing::warn!("No SQL statement permissions configured; every statement will be rejected");
        }

        Self {
            classifier: Arc::new(StatementClassifier::new(config.sql.dialect)),
            policy: Arc::new(policy),
            default_tag: Arc::new(config.query_tag),
            warehouse,
            tool_router: Self::tool_router(),
        }
    }

    /// Classify and check a statement without running it
    pub fn validate(&self, statement: &str) -> PolicyDecision {
        self.policy.validate(&self.classifier, statement)
    }
}

fn rejection(decision: &PolicyDecision) -> McpError {
    let mut message = format!(
        "Statement type of {} is not permitted.",
        decision.statement_type
    );
    if decision.rule == PolicyRule::Unconfigured {
        message.push_str(" No statement permissions are configured.");
    }
    invalid_params(
        message,
        Some(serde_json::json!({
            "statement_type": decision.statement_type,
            "rule": decision.rule,
        })),
    )
}

#[tool_router]
impl QueryMcpServer {
    /// Run a SQL statement if its type is permitted
    #[tool(description = "Run a SQL query against the warehouse. DML and DDL queries are supported, \
        subject to the configured statement permissions. Supports an optional query_tag object \
        (merged with default tags) for tracking and monitoring; tagged queries run on a dedicated \
        connection. Tool should only be used if other tools do not suffice.")]
    async fn run_query(
        &self,
        Parameters(params): Parameters<RunQueryParams>,
    ) -> Result<CallToolResult, McpError> {
        let decision = self.validate(&params.statement);
        if !decision.valid {
            return Err(rejection(&decision));
        }

        let tag = params
            .query_tag
            .as_ref()
            .map(|custom| QueryTag::merged(&self.default_tag, custom));

        let rows = query::run_query(&params.statement, self.warehouse.as_ref(), tag.as_ref())
            .await
            .to_mcp_err()?;

        json_success(&rows)
    }
}

#[tool_handler]
impl rmcp::ServerHandler for QueryMcpServer {
    fn get_info(&self) -> ServerInfo {
        let permissions = if self.policy.is_unconfigured() {
            "No statement types are permitted".to_string()
        } else {
            format!(
                "Allowed statement types: [{}]; disallowed: [{}]",
                join(self.policy.allow_list()),
                join(self.policy.disallow_list()),
            )
        };
        ServerInfo {
            instructions: Some(format!(
                "SQL query MCP server. Use run_query to execute a statement. {}.",
                permissions
            )),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            ..Default::default()
        }
    }
}

fn join<'a>(entries: impl IntoIterator<Item = &'a String>) -> String {
    entries
        .into_iter()
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

// ============================================================================
// EmbeddableMcp Implementation
// ============================================================================

#[async_trait]
impl EmbeddableMcp for QueryMcpServer {
    fn server_name(&self) -> &str {
        "query"
    }

    fn server_description(&self) -> Option<&str> {
        Some("SQL query MCP server - runs policy-checked statements against a warehouse connection.")
    }

    fn list_tools(&self) -> Vec<Tool> {
        self.tool_router.list_all()
    }

    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult> {
        match name {
            "run_query" => {
                let params: RunQueryParams = serde_json::from_value(params)?;
                self.run_query(Parameters(params)).await.map_err(Into::into)
            }
            _ => Err(EmbeddableError::ToolNotFound(name.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::testing::FakeProvider;

    fn server(permissions: &[(&str, bool)], provider: FakeProvider) -> QueryMcpServer {
        let mut config = QueryConfig::default();
        config.sql.permissions = permissions
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect();
        QueryMcpServer::with_provider(config, Arc::new(provider))
    }

    #[test]
    fn test_lists_single_tool() {
        let server = server(&[], FakeProvider::default());
        let tools = server.list_tools();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "run_query");
    }

    #[test]
    fn test_validate_uses_configured_policy() {
        let server = server(&[("select", true), ("drop", false)], FakeProvider::default());
        assert!(server.validate("SELECT 1").valid);
        assert!(!server.validate("DROP TABLE t").valid);
        assert!(!server.validate("Weird").valid);
    }

    #[test]
    fn test_rejection_mentions_missing_configuration() {
        let server = server(&[], FakeProvider::default());
        let err = rejection(&server.validate("SELECT 1"));
        assert!(err.message.contains("Statement type of Select is not permitted"));
        assert!(err.message.contains("No statement permissions"));
        let data = err.data.unwrap();
        assert_eq!(data["statement_type"], "Select");
        assert_eq!(data["rule"], "unconfigured");
    }

    #[test]
    fn test_info_lists_permissions() {
        let server = server(&[("select", true), ("drop", false)], FakeProvider::default());
        let info = rmcp::ServerHandler::get_info(&server);
        let instructions = info.instructions.unwrap();
        assert!(instructions.contains("Allowed statement types: [select]"));
        assert!(instructions.contains("disallowed: [drop]"));
    }

    #[test]
    fn test_try_new_refuses_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("query.toml");
        std::fs::write(&path, "[sql]\ndialect = \"klingon\"\n[sql.permissions]\nselect = true\n").unwrap();

        // Only test in the crate that reads QUERY_CONFIG_PATH
        std::env::set_var("QUERY_CONFIG_PATH", &path);
        let result = QueryMcpServer::try_new();
        std::env::remove_var("QUERY_CONFIG_PATH");

        let err = result.err().unwrap();
        assert!(format!("{:#}", err).contains("Unknown SQL dialect"));
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let server = server(&[], FakeProvider::default());
        let result = server.call_tool("sql_tables", serde_json::json!({})).await;
        assert!(matches!(result, Err(EmbeddableError::ToolNotFound(_))));
    }

    #[tokio::test]
    async fn test_missing_statement_is_invalid_params() {
        let server = server(&[("all", true)], FakeProvider::default());
        let result = server.call_tool("run_query", serde_json::json!({})).await;
        assert!(matches!(result, Err(EmbeddableError::InvalidParams(_))));
    }
}
