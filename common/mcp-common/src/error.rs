//! Error handling for MCP tools
//!
//! Tool failures are normalized into [`ToolError`], a `{tool, message,
//! status_code}` record, before they cross the MCP boundary.

use rmcp::ErrorData as McpError;
use serde::{Deserialize, Serialize};

/// Status code carried by unexpected execution failures
pub const STATUS_INTERNAL: u16 = 500;

/// Normalized tool failure
///
/// Raw backend errors are wrapped into this shape so callers see the same
/// record regardless of which driver produced the failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{tool}: {message} (status {status_code})")]
pub struct ToolError {
    /// Name of the tool that failed
    pub tool: String,
    /// Human-readable description
    pub message: String,
    /// HTTP-style status code
    pub status_code: u16,
}

impl ToolError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>, status_code: u16) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
            status_code,
        }
    }

    /// An unexpected failure (status 500)
    pub fn internal(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(tool, message, STATUS_INTERNAL)
    }
}

/// Trait for converting errors into MCP-compatible errors
///
/// Implement this for error types that tool handlers return, so they can
/// be propagated with [`ResultExt::to_mcp_err`].
pub trait IntoMcpError {
    /// Convert this error into an MCP error
    fn into_mcp_error(self) -> McpError;
}

impl IntoMcpError for ToolError {
    fn into_mcp_error(self) -> McpError {
        let data = serde_json::to_value(&self).ok();
        McpError::internal_error(self.message, data)
    }
}

impl IntoMcpError for serde_json::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(format!("JSON error: {}", self), None)
    }
}

impl IntoMcpError for anyhow::Error {
    fn into_mcp_error(self) -> McpError {
        McpError::internal_error(self.to_string(), None)
    }
}

/// Extension trait for Result types to convert to MCP errors
pub trait ResultExt<T> {
    /// Convert the error to an MCP error
    fn to_mcp_err(self) -> Result<T, McpError>;
}

impl<T, E: IntoMcpError> ResultExt<T> for Result<T, E> {
    fn to_mcp_err(self) -> Result<T, McpError> {
        self.map_err(|e| e.into_mcp_error())
    }
}

/// Create an invalid params error carrying structured data
///
/// Use this when the request itself is refused, as opposed to failing
/// while it runs.
pub fn invalid_params(message: impl Into<String>, data: Option<serde_json::Value>) -> McpError {
    McpError::invalid_params(message.into(), data)
}
