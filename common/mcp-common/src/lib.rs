//! MCP Common - shared plumbing for MCP servers
//!
//! - **Initialization**: [`init_tracing`] and the `serve_stdio!` macro
//! - **Errors**: [`ToolError`], the normalized `{tool, message, status_code}`
//!   failure, and conversions into MCP errors
//! - **Results**: [`json_success`] for structured tool output
//! - **Embedding**: [`EmbeddableMcp`] for in-process tool calls
//!
//! ```rust,ignore
//! // main.rs
//! mcp_common::serve_stdio!(QueryMcpServer::try_new, "query_mcp");
//! ```

pub mod embeddable;
pub mod error;
pub mod init;
pub mod result;

pub use embeddable::{EmbeddableError, EmbeddableMcp, EmbeddableResult};
pub use error::{invalid_params, IntoMcpError, ResultExt, ToolError, STATUS_INTERNAL};
pub use init::{init_tracing, LogFormat};
pub use result::json_success;

pub use rmcp::{
    model::{CallToolResult, Content, Tool},
    ErrorData as McpError,
};

pub use async_trait::async_trait;
