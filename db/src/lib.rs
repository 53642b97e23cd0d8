pub mod connection;
#[cfg(any(test, feature = "test-support"))]
pub mod memory;
pub mod params;
pub mod postgres;
pub mod queries;
pub mod runner;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use connection::{ConnectionManager, Cursor};
pub use params::{Params, QueryArg, ToQueryArg};
pub use queries::{QueryBook, Statement};
pub use runner::{QueryResult, QueryRunner, Row};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error(transparent)]
    Driver(#[from] sqlx::Error),

    #[error("unknown query '{0}'")]
    UnknownQuery(String),

    #[error("missing value for parameter ':{0}'")]
    MissingParam(String),

    #[error("could not read query definitions '{path}': {source}")]
    LoadQueries {
        path: String,
        source: std::io::Error,
    },

    #[error("invalid query definitions: {0}")]
    InvalidQueries(String),
}

/// A single live session with the warehouse.
///
/// Every method maps onto one round trip; none of them retries. Recovery is
/// the job of [`ConnectionManager`].
#[async_trait]
pub trait Database: Send + std::fmt::Debug {
    /// Scope subsequent statements to `schema`.
    async fn set_schema(&mut self, schema: &str) -> Result<(), DbError>;

    /// Execute a query and return its column descriptions and raw rows.
    /// Headers are `(column_name, column_type)` in select order and are
    /// present even when no rows come back.
    async fn get_results(&mut self, sql: &str, args: &[QueryArg])
    -> Result<DatabaseResult, DbError>;

    /// Execute a statement for effect and return the affected row count.
    async fn execute(&mut self, sql: &str, args: &[QueryArg]) -> Result<u64, DbError>;

    async fn commit(&mut self) -> Result<(), DbError>;

    async fn close(self: Box<Self>) -> Result<(), DbError>;
}

/// Opens [`Database`] sessions. Called once at startup and again on every
/// reconnect.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug {
    async fn connect(&self) -> Result<Box<dyn Database>, DbError>;
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DatabaseResult {
    pub headers: Vec<(String, String)>,
    pub rows: Vec<Vec<Value>>,
}
