//! Warehouse connection abstraction
//!
//! A [`ConnectionProvider`] hands out connections in two ways:
//!
//! - **shared**: one long-lived connection, opened on first use and
//!   borrowed under a lock for the duration of a call
//! - **dedicated**: a fresh connection configured with session parameters,
//!   owned by a single call and closed afterwards
//!
//! [`ScopedConnection`] wraps both. Dropping it releases the shared lock or
//! closes the dedicated connection, whichever applies, on every exit path.

pub mod sqlite;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub use sqlite::SqliteWarehouse;

/// One result row: column name to value
pub type Row = Map<String, Value>;

/// Session parameter holding the query tag
pub const QUERY_TAG_PARAM: &str = "QUERY_TAG";

/// Errors raised by warehouse backends
#[derive(Debug, thiserror::Error)]
pub enum WarehouseError {
    #[error("failed to connect: {0}")]
    Connect(String),

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error("{0}")]
    Execution(String),

    #[error("connection is closed")]
    Closed,
}

/// Session parameters applied to a dedicated connection
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionParameters(BTreeMap<String, String>);

impl SessionParameters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// A single open connection to the warehouse
pub trait WarehouseConnection: Send {
    /// Execute one statement and fetch every row, in result order
    fn execute(&mut self, statement: &str) -> Result<Vec<Row>, WarehouseError>;

    /// Close the connection. Calling it again is a no-op.
    fn close(&mut self) -> Result<(), WarehouseError>;
}

/// Source of warehouse connections
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    /// Borrow the shared connection
    async fn shared(&self) -> Result<SharedConnection, WarehouseError>;

    /// Open a new connection configured with `session`
    async fn dedicated(
        &self,
        session: &SessionParameters,
    ) -> Result<Box<dyn WarehouseConnection>, WarehouseError>;
}

/// Lazily opened, lock-protected slot for a provider's shared connection
#[derive(Clone, Default)]
pub struct SharedSlot {
    inner: Arc<Mutex<Option<Box<dyn WarehouseConnection>>>>,
}

impl SharedSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the slot, opening the connection with `connect` if needed
    pub async fn acquire<F>(&self, connect: F) -> Result<SharedConnection, WarehouseError>
    where
        F: FnOnce() -> Result<Box<dyn WarehouseConnection>, WarehouseError>,
    {
        let mut guard = self.inner.clone().lock_owned().await;
        if guard.is_none() {
            tracing::debug!("Opening shared warehouse connection");
            *guard = Some(connect()?);
        }
        Ok(SharedConnection { guard })
    }
}

/// Borrowed shared connection; the lock is held until this is dropped
pub struct SharedConnection {
    guard: OwnedMutexGuard<Option<Box<dyn WarehouseConnection>>>,
}

impl SharedConnection {
    pub fn execute(&mut self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        match self.guard.as_mut() {
            Some(conn) => conn.execute(statement),
            None => Err(WarehouseError::Closed),
        }
    }
}

/// Connection owned by one call, closed when dropped
pub struct DedicatedConnection {
    conn: Box<dyn WarehouseConnection>,
}

impl DedicatedConnection {
    pub fn new(conn: Box<dyn WarehouseConnection>) -> Self {
        Self { conn }
    }

    pub fn execute(&mut self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        self.conn.execute(statement)
    }
}

impl Drop for DedicatedConnection {
    fn drop(&mut self) {
        match self.conn.close() {
            Ok(()) => tracing::debug!("Closed dedicated warehouse connection"),
            Err(e) => tracing::warn!("Failed to close dedicated connection: {}", e),
        }
    }
}

/// A connection acquired for the duration of one call
pub enum ScopedConnection {
    Shared(SharedConnection),
    Dedicated(DedicatedConnection),
}

impl ScopedConnection {
    /// Acquire a dedicated connection when `session` is given, otherwise
    /// borrow the shared one
    pub async fn acquire<P>(
        provider: &P,
        session: Option<&SessionParameters>,
    ) -> Result<Self, WarehouseError>
    where
        P: ConnectionProvider + ?Sized,
    {
        match session {
            Some(session) => {
                let conn = provider.dedicated(session).await?;
                Ok(Self::Dedicated(DedicatedConnection::new(conn)))
            }
            None => Ok(Self::Shared(provider.shared().await?)),
        }
    }

    pub fn is_dedicated(&self) -> bool {
        matches!(self, Self::Dedicated(_))
    }

    pub fn execute(&mut self, statement: &str) -> Result<Vec<Row>, WarehouseError> {
        match self {
            Self::Shared(conn) => conn.execute(statement),
            Self::Dedicated(conn) => conn.execute(statement),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fake connections that count lifecycle calls

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    pub struct Counters {
        pub opened: AtomicUsize,
        pub closed: AtomicUsize,
        pub executed: AtomicUsize,
    }

    impl Counters {
        pub fn opened(&self) -> usize {
            self.opened.load(Ordering::SeqCst)
        }

        pub fn closed(&self) -> usize {
            self.closed.load(Ordering::SeqCst)
        }

        pub fn executed(&self) -> usize {
            self.executed.load(Ordering::SeqCst)
        }
    }

    pub struct FakeConnection {
        counters: Arc<Counters>,
        fail_with: Option<String>,
        rows: Vec<Row>,
        open: bool,
    }

    impl WarehouseConnection for FakeConnection {
        fn execute(&mut self, _statement: &str) -> Result<Vec<Row>, WarehouseError> {
            self.counters.executed.fetch_add(1, Ordering::SeqCst);
            if !self.open {
                return Err(WarehouseError::Closed);
            }
            match &self.fail_with {
                Some(message) => Err(WarehouseError::Execution(message.clone())),
                None => Ok(self.rows.clone()),
            }
        }

        fn close(&mut self) -> Result<(), WarehouseError> {
            if self.open {
                self.open = false;
                self.counters.closed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(())
        }
    }

    /// Provider handing out [`FakeConnection`]s
    #[derive(Default)]
    pub struct FakeProvider {
        pub counters: Arc<Counters>,
        pub fail_with: Option<String>,
        pub refuse_connect: bool,
        pub rows: Vec<Row>,
        pub sessions: std::sync::Mutex<Vec<SessionParameters>>,
        slot: SharedSlot,
    }

    impl FakeProvider {
        pub fn returning(rows: Vec<Row>) -> Self {
            Self {
                rows,
                ..Default::default()
            }
        }

        pub fn failing(message: &str) -> Self {
            Self {
                fail_with: Some(message.to_string()),
                ..Default::default()
            }
        }

        pub fn refusing() -> Self {
            Self {
                refuse_connect: true,
                ..Default::default()
            }
        }

        fn connect(&self) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
            if self.refuse_connect {
                return Err(WarehouseError::Connect("connection refused".to_string()));
            }
            self.counters.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(FakeConnection {
                counters: self.counters.clone(),
                fail_with: self.fail_with.clone(),
                rows: self.rows.clone(),
                open: true,
            }))
        }
    }

    #[async_trait]
    impl ConnectionProvider for FakeProvider {
        async fn shared(&self) -> Result<SharedConnection, WarehouseError> {
            self.slot.acquire(|| self.connect()).await
        }

        async fn dedicated(
            &self,
            session: &SessionParameters,
        ) -> Result<Box<dyn WarehouseConnection>, WarehouseError> {
            if let Ok(mut sessions) = self.sessions.lock() {
                sessions.push(session.clone());
            }
            self.connect()
        }
    }
}
