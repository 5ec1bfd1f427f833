//! In-process tool execution
//!
//! [`EmbeddableMcp`] lets a host call a server's tools directly, without a
//! transport in between. Tests use it to drive servers end to end.

use async_trait::async_trait;
use rmcp::model::{CallToolResult, Tool};
use serde_json::Value;

/// Error type for embedded tool calls
#[derive(Debug, thiserror::Error)]
pub enum EmbeddableError {
    /// Tool was not found in the server
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// Parameters did not deserialize into the tool's input type
    #[error("invalid parameters: {0}")]
    InvalidParams(#[from] serde_json::Error),

    /// The tool returned an MCP error
    #[error("mcp error: {}", .0.message)]
    Mcp(rmcp::ErrorData),
}

impl From<rmcp::ErrorData> for EmbeddableError {
    fn from(err: rmcp::ErrorData) -> Self {
        EmbeddableError::Mcp(err)
    }
}

/// Result type for embedded tool calls
pub type EmbeddableResult<T> = Result<T, EmbeddableError>;

/// An MCP server whose tools can be called in-process
#[async_trait]
pub trait EmbeddableMcp: Send + Sync {
    /// Server name, matching the name used in MCP configuration files
    fn server_name(&self) -> &str;

    /// All tools with their input schemas
    fn list_tools(&self) -> Vec<Tool>;

    /// Execute a tool by name with JSON parameters
    async fn call_tool(&self, name: &str, params: Value) -> EmbeddableResult<CallToolResult>;

    fn server_description(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EmptyServer;

    #[async_trait]
    impl EmbeddableMcp for EmptyServer {
        fn server_name(&self) -> &str {
            "empty"
        }

        fn list_tools(&self) -> Vec<Tool> {
            vec![]
        }

        async fn call_tool(&self, name: &str, _params: Value) -> EmbeddableResult<CallToolResult> {
            Err(EmbeddableError::ToolNotFound(name.to_string()))
        }
    }

    #[tokio::test]
    async fn test_call_unknown_tool() {
        let server = EmptyServer;
        assert!(server.list_tools().is_empty());
        let result = server.call_tool("missing", serde_json::json!({})).await;
        assert!(matches!(result, Err(EmbeddableError::ToolNotFound(name)) if name == "missing"));
    }

    #[test]
    fn test_mcp_error_keeps_data() {
        let err: EmbeddableError =
            rmcp::ErrorData::internal_error("boom", Some(serde_json::json!({ "status_code": 500 })))
                .into();
        match err {
            EmbeddableError::Mcp(data) => assert_eq!(data.data.unwrap()["status_code"], 500),
            other => panic!("unexpected error: {other}"),
        }
    }
}
