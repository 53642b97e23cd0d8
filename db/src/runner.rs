use std::error::Error as _;

use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::{ConnectionManager, DbError, Params, Statement};

/// A result row keyed by lower-cased column name.
pub type Row = Map<String, Value>;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Zips every row with the column names.
    pub fn into_rows(self) -> Vec<Row> {
        let Self { columns, rows } = self;
        rows.into_iter()
            .map(|row| columns.iter().cloned().zip(row).collect())
            .collect()
    }
}

/// Runs statements over the single shared connection.
///
/// The `try_*` methods report failures. The others keep the toolbox
/// contract of logging a failure and answering as if nothing came back.
#[derive(Debug)]
pub struct QueryRunner {
    manager: Mutex<ConnectionManager>,
}

impl QueryRunner {
    pub fn new(manager: ConnectionManager) -> Self {
        Self {
            manager: Mutex::new(manager),
        }
    }

    /// # Errors
    /// Fails on a missing parameter, a cursor that cannot be recovered, or a
    /// driver error.
    pub async fn try_run_query(
        &self,
        statement: &Statement,
        params: &Params,
    ) -> Result<QueryResult, DbError> {
        let args = statement.bind(params)?;
        tracing::debug!(query = statement.name(), ?args, "running query");

        let mut manager = self.manager.lock().await;
        let mut cursor = manager.cursor().await?;
        let result = cursor.fetch(statement.positional_sql(), &args).await?;

        Ok(QueryResult {
            columns: result
                .headers
                .into_iter()
                .map(|(name, _)| name.to_lowercase())
                .collect(),
            rows: result.rows,
        })
    }

    /// Like [`try_run_query`](Self::try_run_query), but a failure is logged
    /// and comes back as an empty result.
    pub async fn run_query(&self, statement: &Statement, params: &Params) -> QueryResult {
        self.try_run_query(statement, params)
            .await
            .unwrap_or_else(|err| {
                log_failure(statement, &err);
                QueryResult::default()
            })
    }

    /// # Errors
    /// Same failure modes as [`try_run_query`](Self::try_run_query).
    pub async fn try_run(&self, statement: &Statement, params: &Params) -> Result<u64, DbError> {
        let args = statement.bind(params)?;
        tracing::debug!(query = statement.name(), ?args, "running statement");

        let mut manager = self.manager.lock().await;
        let mut cursor = manager.cursor().await?;
        cursor.execute(statement.positional_sql(), &args).await
    }

    /// Executes a statement for effect; failures are logged and dropped.
    pub async fn run(&self, statement: &Statement, params: &Params) {
        if let Err(err) = self.try_run(statement, params).await {
            log_failure(statement, &err);
        }
    }

    pub async fn select_as_dict(&self, statement: &Statement, params: &Params) -> Vec<Row> {
        self.run_query(statement, params).await.into_rows()
    }

    /// # Errors
    /// Fails when the final commit or close fails.
    pub async fn close(self) -> Result<(), DbError> {
        self.manager.into_inner().close().await
    }
}

fn log_failure(statement: &Statement, err: &DbError) {
    let mut chain = Vec::new();
    let mut source = err.source();
    while let Some(cause) = source {
        chain.push(cause.to_string());
        source = cause.source();
    }
    tracing::error!(
        query = statement.name(),
        error = %err,
        causes = ?chain,
        "query failed, returning no rows"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryConnector;
    use crate::{DatabaseResult, QueryArg};
    use serde_json::json;

    async fn runner(connector: &MemoryConnector) -> QueryRunner {
        let manager = ConnectionManager::open(Box::new(connector.clone()), "sh")
            .await
            .unwrap();
        QueryRunner::new(manager)
    }

    fn sales_result() -> DatabaseResult {
        DatabaseResult {
            headers: vec![
                ("CATEGORY".to_string(), "TEXT".to_string()),
                ("Total_Sales".to_string(), "NUMERIC".to_string()),
            ],
            rows: vec![
                vec![json!("Electronics"), json!(100)],
                vec![json!("Hardware"), json!(42.5)],
            ],
        }
    }

    #[tokio::test]
    async fn test_run_query_lowercases_columns() {
        let connector = MemoryConnector::with_responder(|_, _| Ok(sales_result()));
        let runner = runner(&connector).await;
        let stmt = Statement::parse("sales", "SELECT * FROM sales WHERE c = :country");

        let result = runner
            .run_query(&stmt, &Params::new().with("country", None::<String>))
            .await;

        assert_eq!(result.columns, vec!["category", "total_sales"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(
            connector.statements(),
            vec![(
                "SELECT * FROM sales WHERE c = $1".to_string(),
                vec![QueryArg::Text(String::new())]
            )]
        );
    }

    #[tokio::test]
    async fn test_run_query_failure_is_empty() {
        let connector = MemoryConnector::with_responder(|_, _| {
            Err(DbError::Query(
                "relation \"missing\" does not exist".to_string(),
            ))
        });
        let runner = runner(&connector).await;
        let stmt = Statement::parse("broken", "SELECT * FROM missing");

        let result = runner.run_query(&stmt, &Params::new()).await;

        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
    }

    #[tokio::test]
    async fn test_try_run_query_reports_failure() {
        let connector =
            MemoryConnector::with_responder(|_, _| Err(DbError::Query("boom".to_string())));
        let runner = runner(&connector).await;
        let stmt = Statement::parse("broken", "SELECT 1");

        let err = runner.try_run_query(&stmt, &Params::new()).await.unwrap_err();

        assert!(matches!(err, DbError::Query(_)));
    }

    #[tokio::test]
    async fn test_missing_param_never_reaches_driver() {
        let connector = MemoryConnector::new();
        let runner = runner(&connector).await;
        let stmt = Statement::parse("q", "SELECT :a");

        assert!(runner.select_as_dict(&stmt, &Params::new()).await.is_empty());
        assert!(connector.statements().is_empty());
    }

    #[tokio::test]
    async fn test_select_as_dict_zips_rows() {
        let connector = MemoryConnector::with_responder(|_, _| Ok(sales_result()));
        let runner = runner(&connector).await;
        let stmt = Statement::parse("sales", "SELECT 1");

        let rows = runner.select_as_dict(&stmt, &Params::new()).await;

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["category"], json!("Electronics"));
        assert_eq!(rows[1]["total_sales"], json!(42.5));
    }

    #[tokio::test]
    async fn test_run_swallows_failure() {
        let connector =
            MemoryConnector::with_responder(|_, _| Err(DbError::Query("boom".to_string())));
        let runner = runner(&connector).await;
        let stmt = Statement::parse("insert", "INSERT INTO audit VALUES (:who)");

        runner.run(&stmt, &Params::new().with("who", "sh")).await;

        assert_eq!(connector.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_close_commits_through_manager() {
        let connector = MemoryConnector::new();
        let runner = runner(&connector).await;

        runner.close().await.unwrap();

        assert_eq!(connector.commits(), 1);
        assert!(connector.closed());
    }
}
