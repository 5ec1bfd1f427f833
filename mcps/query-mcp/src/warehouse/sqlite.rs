//! SQLite-backed warehouse

use super::{
    ConnectionProvider, Row, SessionParameters, SharedConnection, SharedSlot,
    WarehouseConnection, WarehouseError,
};
use crate::config::WarehouseConfig;
use async_trait::async_trait;
use rusqlite::{params, types::Value as SqlValue, Connection};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Open connection to a SQLite database
pub struct SqliteConnection {
    conn: Option<Connection>,
}

impl SqliteConnection {
    /// Open `path` and apply session parameters, if any
    pub fn open(
        path: &Path,
        timeout: Duration,
        session: Option<&SessionParameters>,
    ) -> Result<Self, WarehouseError> {
        let conn = Connection::open(path)
            .map_err(|e| WarehouseError::Connect(format!("{}: {}", path.display(), e)))?;
        conn.busy_timeout(timeout)?;

        if let Some(session) = session {
            apply_session(&conn, session)?;
        }

        Ok(Self { conn: Some(conn) })
    }
}

/// Record session parameters in a per-connection temp table
fn apply_session(conn: &Connection, session: &SessionParameters) -> Result<(), WarehouseError> {
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS session_parameters (
            name TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
    )?;
    for (name, value) in session.iter() {
        conn.execute(
            "INSERT OR REPLACE INTO temp.session_parameters (name, value) VALUES (?1, ?2)",
            params![name, value],
        )?;
    }
    Ok(())
}

fn to_json(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => serde_json::json!(i),
        SqlValue::Real(f) => serde_json::json!(f),
        SqlValue::Text(s) => Value::String(s),
        SqlValue::Blob(b) => Value::String(format!("<blob {} bytes>", b.len())),
    }
}

impl WarehouseConnection for SqliteConnection {
    fn execute(&mut self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        let conn = self.conn.as_ref().ok_or(WarehouseError::Closed)?;

        let mut stmt = conn.prepare(statement)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|s| s.to_string()).collect();

        let mut rows = stmt.query([])?;
        let mut result = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (i, column) in columns.iter().enumerate() {
                let value: SqlValue = row.get(i)?;
                record.insert(column.clone(), to_json(value));
            }
            result.push(record);
        }

        Ok(result)
    }

    fn close(&mut self) -> Result<(), WarehouseError> {
        match self.conn.take() {
            Some(conn) => conn.close().map_err(|(_, e)| WarehouseError::Sqlite(e)),
            None => Ok(()),
        }
    }
}

/// Warehouse stored in a SQLite database file
///
/// Note that with `:memory:` each dedicated connection sees its own empty
/// database.
#[derive(Clone)]
pub struct SqliteWarehouse {
    path: PathBuf,
    timeout: Duration,
    shared: SharedSlot,
}

impl SqliteWarehouse {
    pub fn new(config: &WarehouseConfig) -> Self {
        Self {
            path: config.path.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            shared: SharedSlot::new(),
        }
    }

    fn connect(
        &self,
        session: Option<&SessionParameters>,
    ) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        let conn = SqliteConnection::open(&self.path, self.timeout, session)?;
        Ok(Box::new(conn))
    }
}

#[async_trait]
impl ConnectionProvider for SqliteWarehouse {
    async fn shared(&self) -> Result<SharedConnection, WarehouseError> {
        self.shared.acquire(|| self.connect(None)).await
    }

    async fn dedicated(
        &self,
        session: &SessionParameters,
    ) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
        tracing::debug!(path = %self.path.display(), "Opening dedicated warehouse connection");
        self.connect(Some(session))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::{ScopedConnection, QUERY_TAG_PARAM};
    use tempfile::tempdir;

    fn warehouse(path: PathBuf) -> SqliteWarehouse {
        SqliteWarehouse::new(&WarehouseConfig {
            path,
            timeout_secs: 5,
        })
    }

    #[tokio::test]
    async fn test_rows_keep_order_and_columns() {
        let dir = tempdir().unwrap();
        let warehouse = warehouse(dir.path().join("wh.db"));

        let mut conn = ScopedConnection::acquire(&warehouse, None).await.unwrap();
        conn.execute("CREATE TABLE t (id INTEGER, name TEXT, score REAL, data BLOB)")
            .unwrap();
        conn.execute("INSERT INTO t VALUES (2, 'b', 1.5, NULL), (1, 'a', NULL, x'0102')")
            .unwrap();

        let rows = conn.execute("SELECT id, name, score, data FROM t ORDER BY id DESC").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["id"], 2);
        assert_eq!(rows[0]["name"], "b");
        assert_eq!(rows[0]["score"], 1.5);
        assert_eq!(rows[0]["data"], Value::Null);
        assert_eq!(rows[1]["id"], 1);
        assert_eq!(rows[1]["data"], "<blob 2 bytes>");
    }

    #[tokio::test]
    async fn test_non_query_statement_returns_no_rows() {
        let dir = tempdir().unwrap();
        let warehouse = warehouse(dir.path().join("wh.db"));

        let mut conn = ScopedConnection::acquire(&warehouse, None).await.unwrap();
        let rows = conn.execute("CREATE TABLE t (id INTEGER)").unwrap();
        assert!(rows.is_empty());
    }

    #[tokio::test]
    async fn test_dedicated_connection_sees_query_tag() {
        let dir = tempdir().unwrap();
        let warehouse = warehouse(dir.path().join("wh.db"));
        let session = SessionParameters::new().with(QUERY_TAG_PARAM, r#"{"app":"test"}"#);

        let mut conn = ScopedConnection::acquire(&warehouse, Some(&session)).await.unwrap();
        let rows = conn
            .execute("SELECT value FROM temp.session_parameters WHERE name = 'QUERY_TAG'")
            .unwrap();
        assert_eq!(rows[0]["value"], r#"{"app":"test"}"#);
    }

    #[tokio::test]
    async fn test_dedicated_and_shared_share_data() {
        let dir = tempdir().unwrap();
        let warehouse = warehouse(dir.path().join("wh.db"));

        {
            let mut shared = ScopedConnection::acquire(&warehouse, None).await.unwrap();
            shared.execute("CREATE TABLE t (id INTEGER)").unwrap();
            shared.execute("INSERT INTO t VALUES (7)").unwrap();
        }

        let session = SessionParameters::new().with(QUERY_TAG_PARAM, "{}");
        let mut dedicated = ScopedConnection::acquire(&warehouse, Some(&session)).await.unwrap();
        let rows = dedicated.execute("SELECT id FROM t").unwrap();
        assert_eq!(rows[0]["id"], 7);
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let mut conn =
            SqliteConnection::open(&dir.path().join("wh.db"), Duration::from_secs(1), None).unwrap();
        conn.close().unwrap();
        conn.close().unwrap();
        assert!(matches!(conn.execute("SELECT 1"), Err(WarehouseError::Closed)));
    }

    #[test]
    fn test_invalid_statement_is_error() {
        let dir = tempdir().unwrap();
        let mut conn =
            SqliteConnection::open(&dir.path().join("wh.db"), Duration::from_secs(1), None).unwrap();
        assert!(matches!(
            conn.execute("SELECT * FROM missing"),
            Err(WarehouseError::Sqlite(_))
        ));
    }
}
