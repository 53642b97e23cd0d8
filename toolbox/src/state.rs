use config::ToolboxConfig;
use db::postgres::PgConnector;
use db::{ConnectionManager, Connector, Params, QueryBook, QueryRunner, Row};

use crate::ToolError;

/// Everything a tool needs to talk to the warehouse: the shared runner and
/// the loaded query definitions.
#[derive(Debug)]
pub struct State {
    runner: QueryRunner,
    queries: QueryBook,
}

impl State {
    pub fn new(runner: QueryRunner, queries: QueryBook) -> Self {
        Self { runner, queries }
    }

    /// Connects to the configured warehouse and loads the query file.
    ///
    /// # Errors
    /// Fails when the query file is unreadable or the first connection
    /// cannot be established.
    pub async fn connect(config: &ToolboxConfig) -> Result<Self, ToolError> {
        let queries = QueryBook::load(&config.toolbox.queries)?;
        tracing::info!(
            path = %config.toolbox.queries.display(),
            count = queries.len(),
            "loaded query definitions"
        );
        let connector = PgConnector::from_config(&config.database)?;
        Self::with_connector(Box::new(connector), &config.database.schema, queries).await
    }

    /// # Errors
    /// Fails when the first connection cannot be established.
    pub async fn with_connector(
        connector: Box<dyn Connector>,
        schema: &str,
        queries: QueryBook,
    ) -> Result<Self, ToolError> {
        let manager = ConnectionManager::open(connector, schema).await?;
        Ok(Self::new(QueryRunner::new(manager), queries))
    }

    pub fn queries(&self) -> &QueryBook {
        &self.queries
    }

    pub fn runner(&self) -> &QueryRunner {
        &self.runner
    }

    /// Runs a named query. Query failures come back as no rows.
    ///
    /// # Errors
    /// Fails only when `query_name` is not defined.
    pub async fn run_query(&self, query_name: &str, params: &Params) -> Result<Vec<Row>, ToolError> {
        let statement = self.queries.get(query_name)?;
        Ok(self.runner.select_as_dict(statement, params).await)
    }

    /// Runs a lookup query with `value` and `limit` bound. With fuzzy
    /// matching the value matches anywhere in the candidate.
    ///
    /// # Errors
    /// Fails only when `query_name` is not defined.
    pub async fn search(
        &self,
        query_name: &str,
        value: &str,
        use_fuzzy_matching: bool,
        limit: u32,
    ) -> Result<Vec<Row>, ToolError> {
        let value = if use_fuzzy_matching {
            format!("%{value}%")
        } else {
            value.to_string()
        };
        tracing::info!(query = query_name, value = %value, limit, "search");

        let params = Params::new().with("value", value).with("limit", limit);
        self.run_query(query_name, &params).await
    }

    /// # Errors
    /// Fails when the final commit or close fails.
    pub async fn close(self) -> Result<(), ToolError> {
        self.runner.close().await?;
        Ok(())
    }
}
