//! Query MCP Server
//!
//! Runs policy-checked SQL statements against a warehouse connection.

use query_mcp::QueryMcpServer;

mcp_common::serve_stdio!(QueryMcpServer::try_new, "query_mcp");
