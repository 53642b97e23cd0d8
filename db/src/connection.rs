use crate::{Connector, Database, DatabaseResult, DbError, QueryArg};

/// Owns the single warehouse session.
///
/// Every [`cursor`](Self::cursor) checkout scopes the session to the
/// configured schema. If that fails the session is replaced once and the
/// checkout retried; a second failure is returned to the caller.
#[derive(Debug)]
pub struct ConnectionManager {
    connector: Box<dyn Connector>,
    session: Box<dyn Database>,
    schema: String,
}

/// A statement-execution handle borrowed from the [`ConnectionManager`].
#[derive(Debug)]
pub struct Cursor<'a> {
    session: &'a mut dyn Database,
}

impl ConnectionManager {
    /// # Errors
    /// Fails when the initial connection cannot be established.
    pub async fn open(
        connector: Box<dyn Connector>,
        schema: impl Into<String>,
    ) -> Result<Self, DbError> {
        let session = connector.connect().await?;
        let schema = schema.into();
        tracing::info!(schema = %schema, "connected to warehouse");
        Ok(Self {
            connector,
            session,
            schema,
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// # Errors
    /// Fails when both the checkout and the checkout after a reconnect fail,
    /// or when the reconnect itself fails.
    pub async fn cursor(&mut self) -> Result<Cursor<'_>, DbError> {
        if let Err(err) = self.session.set_schema(&self.schema).await {
            tracing::error!(error = %err, "error getting cursor, reconnecting");
            self.connect().await?;
            self.session.set_schema(&self.schema).await?;
        }

        Ok(Cursor {
            session: self.session.as_mut(),
        })
    }

    async fn connect(&mut self) -> Result<(), DbError> {
        self.session = self.connector.connect().await?;
        tracing::info!(schema = %self.schema, "reconnected to warehouse");
        Ok(())
    }

    /// Commits pending work and releases the session.
    ///
    /// # Errors
    /// Fails when the commit or the close round trip fails.
    pub async fn close(self) -> Result<(), DbError> {
        let mut session = self.session;
        session.commit().await?;
        session.close().await
    }
}

impl Cursor<'_> {
    /// # Errors
    /// Propagates driver failures.
    pub async fn fetch(&mut self, sql: &str, args: &[QueryArg]) -> Result<DatabaseResult, DbError> {
        self.session.get_results(sql, args).await
    }

    /// # Errors
    /// Propagates driver failures.
    pub async fn execute(&mut self, sql: &str, args: &[QueryArg]) -> Result<u64, DbError> {
        self.session.execute(sql, args).await
    }
}
