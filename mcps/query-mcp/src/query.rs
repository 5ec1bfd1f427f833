//! Query execution
//!
//! Runs an already-validated statement over a [`ConnectionProvider`] and
//! normalizes every failure into a [`ToolError`].

use crate::warehouse::{
    ConnectionProvider, Row, ScopedConnection, SessionParameters, WarehouseError, QUERY_TAG_PARAM,
};
use mcp_common::ToolError;
use serde_json::{Map, Value};

/// Tool name reported in execution failures
pub const TOOL_NAME: &str = "query_manager";

/// Query tag attached to a dedicated connection
///
/// Built from the configured defaults with caller-supplied fields layered on
/// top.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryTag(Map<String, Value>);

impl QueryTag {
    pub fn merged(defaults: &Map<String, Value>, custom: &Map<String, Value>) -> Self {
        let mut tag = defaults.clone();
        tag.extend(custom.iter().map(|(k, v)| (k.clone(), v.clone())));
        Self(tag)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Session parameters carrying this tag as a JSON string
    pub fn session_parameters(&self) -> SessionParameters {
        SessionParameters::new().with(QUERY_TAG_PARAM, Value::Object(self.0.clone()).to_string())
    }
}

/// Execute `statement` and fetch every row.
///
/// With a tag the statement runs on a dedicated connection that is closed
/// before this returns, whatever the outcome. Without one it runs on the
/// provider's shared connection.
pub async fn run_query<P>(
    statement: &str,
    provider: &P,
    query_tag: Option<&QueryTag>,
) -> Result<Vec<Row>, ToolError>
where
    P: ConnectionProvider + ?Sized,
{
    let session = query_tag.map(QueryTag::session_parameters);

    match execute_scoped(statement, provider, session.as_ref()).await {
        Ok(rows) => {
            tracing::debug!(rows = rows.len(), tagged = query_tag.is_some(), "Query completed");
            Ok(rows)
        }
        Err(e) => {
            tracing::error!("Error executing query: {}", e);
            Err(ToolError::internal(TOOL_NAME, format!("Error executing query: {}", e)))
        }
    }
}

/// The connection is released when `conn` drops at the end of this scope
async fn execute_scoped<P>(
    statement: &str,
    provider: &P,
    session: Option<&SessionParameters>,
) -> Result<Vec<Row>, WarehouseError>
where
    P: ConnectionProvider + ?Sized,
{
    let mut conn = ScopedConnection::acquire(provider, session).await?;
    conn.execute(statement)
}
