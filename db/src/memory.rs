//! In-memory [`Connector`] for tests.
//!
//! Sessions answer queries through a caller-supplied responder and record
//! everything they are asked to do.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use crate::{Connector, Database, DatabaseResult, DbError, QueryArg};

type Responder = dyn Fn(&str, &[QueryArg]) -> Result<DatabaseResult, DbError> + Send + Sync;

#[derive(Clone)]
pub struct MemoryConnector {
    inner: Arc<Mutex<Recorded>>,
    responder: Arc<Responder>,
}

#[derive(Debug, Default)]
struct Recorded {
    connects: usize,
    failing_connects: usize,
    failing_checkouts: usize,
    schemas: Vec<String>,
    statements: Vec<(String, Vec<QueryArg>)>,
    executed: Vec<(String, Vec<QueryArg>)>,
    commits: usize,
    closed: bool,
}

impl fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("inner", &self.inner)
            .finish_non_exhaustive()
    }
}

impl Default for MemoryConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryConnector {
    /// A connector whose sessions return no rows for every query.
    pub fn new() -> Self {
        Self::with_responder(|_, _| Ok(DatabaseResult::default()))
    }

    pub fn with_responder(
        responder: impl Fn(&str, &[QueryArg]) -> Result<DatabaseResult, DbError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorded::default())),
            responder: Arc::new(responder),
        }
    }

    fn recorded(&self) -> MutexGuard<'_, Recorded> {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn fail_next_connects(&self, count: usize) {
        self.recorded().failing_connects = count;
    }

    pub fn fail_next_checkouts(&self, count: usize) {
        self.recorded().failing_checkouts = count;
    }

    pub fn connects(&self) -> usize {
        self.recorded().connects
    }

    pub fn schemas_set(&self) -> Vec<String> {
        self.recorded().schemas.clone()
    }

    /// Every query sent through `get_results`, as `(positional_sql, args)`.
    pub fn statements(&self) -> Vec<(String, Vec<QueryArg>)> {
        self.recorded().statements.clone()
    }

    /// Every statement sent through `execute`.
    pub fn executed(&self) -> Vec<(String, Vec<QueryArg>)> {
        self.recorded().executed.clone()
    }

    pub fn commits(&self) -> usize {
        self.recorded().commits
    }

    pub fn closed(&self) -> bool {
        self.recorded().closed
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn Database>, DbError> {
        let mut recorded = self.recorded();
        if recorded.failing_connects > 0 {
            recorded.failing_connects -= 1;
            return Err(DbError::Connection("connection refused".to_string()));
        }
        recorded.connects += 1;
        Ok(Box::new(MemoryDatabase {
            connector: self.clone(),
        }))
    }
}

#[derive(Debug)]
struct MemoryDatabase {
    connector: MemoryConnector,
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn set_schema(&mut self, schema: &str) -> Result<(), DbError> {
        let mut recorded = self.connector.recorded();
        if recorded.failing_checkouts > 0 {
            recorded.failing_checkouts -= 1;
            return Err(DbError::Connection("session lost".to_string()));
        }
        recorded.schemas.push(schema.to_string());
        Ok(())
    }

    async fn get_results(
        &mut self,
        sql: &str,
        args: &[QueryArg],
    ) -> Result<DatabaseResult, DbError> {
        self.connector
            .recorded()
            .statements
            .push((sql.to_string(), args.to_vec()));
        (self.connector.responder)(sql, args)
    }

    async fn execute(&mut self, sql: &str, args: &[QueryArg]) -> Result<u64, DbError> {
        self.connector
            .recorded()
            .executed
            .push((sql.to_string(), args.to_vec()));
        (self.connector.responder)(sql, args).map(|result| result.rows.len() as u64)
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        self.connector.recorded().commits += 1;
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.connector.recorded().closed = true;
        Ok(())
    }
}
