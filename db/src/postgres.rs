use std::fmt;
use std::path::Path;

use config::DatabaseConfig;
use rust_decimal::prelude::ToPrimitive;
use serde_json::{Value, json};
use sqlx::postgres::{PgArguments, PgConnectOptions, PgRow, PgSslMode, PgTypeInfo};
use sqlx::query::Query;
use sqlx::{
    Column, Connection, Executor, PgConnection, Postgres, Row, Statement, Type, TypeInfo,
};

use crate::{Connector, Database, DatabaseResult, DbError, QueryArg};

const DEFAULT_PORT: u16 = 5432;
const WALLET_ROOT_CERT: &str = "root.crt";
const WALLET_CLIENT_CERT: &str = "client.crt";
const WALLET_CLIENT_KEY: &str = "client.key";

/// Opens sessions against the warehouse described by [`DatabaseConfig`].
#[derive(Clone)]
pub struct PgConnector {
    options: PgConnectOptions,
}

impl fmt::Debug for PgConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PgConnector")
            .field("host", &self.options.get_host())
            .field("port", &self.options.get_port())
            .field("database", &self.options.get_database())
            .field("username", &self.options.get_username())
            .finish_non_exhaustive()
    }
}

impl PgConnector {
    /// # Errors
    /// Fails when the DSN cannot be parsed.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, DbError> {
        if config.wallet_password().is_some() {
            tracing::warn!(
                "wallet_password is set but encrypted client keys are not supported; \
                 the wallet key must be stored unencrypted"
            );
        }
        Ok(Self {
            options: connect_options(config)?,
        })
    }
}

#[async_trait::async_trait]
impl Connector for PgConnector {
    async fn connect(&self) -> Result<Box<dyn Database>, DbError> {
        let connection = PgConnection::connect_with(&self.options).await?;
        Ok(Box::new(PostgresDatabase {
            connection,
            in_transaction: false,
        }))
    }
}

fn connect_options(config: &DatabaseConfig) -> Result<PgConnectOptions, DbError> {
    let dsn = config.dsn.trim();
    let options = if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
        dsn.parse::<PgConnectOptions>()?
    } else {
        let (address, database) = dsn.split_once('/').ok_or_else(|| {
            DbError::Connection(format!("dsn '{dsn}' must look like host[:port]/database"))
        })?;
        let (host, port) = match address.rsplit_once(':') {
            Some((host, port)) => {
                let port = port
                    .parse::<u16>()
                    .map_err(|_| DbError::Connection(format!("invalid port in dsn '{dsn}'")))?;
                (host, port)
            }
            None => (address, DEFAULT_PORT),
        };
        PgConnectOptions::new()
            .host(host)
            .port(port)
            .database(database)
    };

    let options = options
        .username(&config.username)
        .password(&config.password);

    Ok(match &config.wallet_path {
        Some(wallet) => with_wallet(options, wallet),
        None => options,
    })
}

fn with_wallet(options: PgConnectOptions, wallet: &Path) -> PgConnectOptions {
    let mut options = options
        .ssl_mode(PgSslMode::VerifyFull)
        .ssl_root_cert(wallet.join(WALLET_ROOT_CERT));

    let client_cert = wallet.join(WALLET_CLIENT_CERT);
    let client_key = wallet.join(WALLET_CLIENT_KEY);
    if client_cert.exists() && client_key.exists() {
        options = options
            .ssl_client_cert(client_cert)
            .ssl_client_key(client_key);
    }
    options
}

/// Quotes `ident` as a Postgres identifier.
fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

#[derive(Debug)]
pub struct PostgresDatabase {
    connection: PgConnection,
    // Statements run for effect are held in one transaction until commit.
    in_transaction: bool,
}

#[async_trait::async_trait]
impl Database for PostgresDatabase {
    async fn set_schema(&mut self, schema: &str) -> Result<(), DbError> {
        let sql = format!("SET search_path TO {}", quote_ident(schema));
        (&mut self.connection).execute(sqlx::raw_sql(&sql)).await?;
        Ok(())
    }

    async fn get_results(
        &mut self,
        sql: &str,
        args: &[QueryArg],
    ) -> Result<DatabaseResult, DbError> {
        let types: Vec<PgTypeInfo> = args.iter().map(param_type).collect();
        let statement = (&mut self.connection).prepare_with(sql, &types).await?;

        let headers = statement
            .columns()
            .iter()
            .map(|col| (col.name().to_string(), col.type_info().name().to_string()))
            .collect();

        let query = args
            .iter()
            .fold(statement.query(), |query, arg| bind(query, arg));
        let rows = query.fetch_all(&mut self.connection).await?;

        Ok(DatabaseResult {
            headers,
            rows: rows.iter().map(row_values).collect(),
        })
    }

    async fn execute(&mut self, sql: &str, args: &[QueryArg]) -> Result<u64, DbError> {
        if !self.in_transaction {
            (&mut self.connection).execute(sqlx::raw_sql("BEGIN")).await?;
            self.in_transaction = true;
        }

        let query = args
            .iter()
            .fold(sqlx::query(sql), |query, arg| bind(query, arg));
        let done = query.execute(&mut self.connection).await?;

        Ok(done.rows_affected())
    }

    async fn commit(&mut self) -> Result<(), DbError> {
        if self.in_transaction {
            (&mut self.connection).execute(sqlx::raw_sql("COMMIT")).await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    async fn close(self: Box<Self>) -> Result<(), DbError> {
        self.connection.close().await?;
        Ok(())
    }
}

fn bind<'q>(
    query: Query<'q, Postgres, PgArguments>,
    arg: &QueryArg,
) -> Query<'q, Postgres, PgArguments> {
    match arg {
        QueryArg::Text(value) => query.bind(value.clone()),
        QueryArg::Int(value) => query.bind(*value),
        QueryArg::Date(value) => query.bind(*value),
        QueryArg::Null => query.bind(None::<String>),
    }
}

/// The declared type of a bind, so the server never infers a narrower one.
fn param_type(arg: &QueryArg) -> PgTypeInfo {
    match arg {
        QueryArg::Text(_) | QueryArg::Null => <String as Type<Postgres>>::type_info(),
        QueryArg::Int(_) => <i64 as Type<Postgres>>::type_info(),
        QueryArg::Date(_) => <chrono::NaiveDate as Type<Postgres>>::type_info(),
    }
}

fn row_values(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| column_value(row, i, col.type_info().name()))
        .collect()
}

fn column_value(row: &PgRow, i: usize, type_name: &str) -> Value {
    match type_name {
        "UUID" => row
            .try_get::<uuid::Uuid, _>(i)
            .map(|v| json!(v.to_string()))
            .unwrap_or(Value::Null),

        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<String, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "DATE" => row
            .try_get::<chrono::NaiveDate, _>(i)
            .map(|v| json!(v.format("%Y-%m-%d").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMP" => row
            .try_get::<chrono::NaiveDateTime, _>(i)
            .map(|dt| json!(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),

        "TIMESTAMPTZ" => row
            .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
            .map(|dt| json!(dt.to_rfc3339()))
            .unwrap_or(Value::Null),

        "INT2" => row
            .try_get::<i16, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT4" => row
            .try_get::<i32, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "INT8" => row
            .try_get::<i64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT4" => row
            .try_get::<f32, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "FLOAT8" => row
            .try_get::<f64, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        "NUMERIC" => row
            .try_get::<rust_decimal::Decimal, _>(i)
            .map(decimal_to_json)
            .unwrap_or(Value::Null),

        "BOOL" => row
            .try_get::<bool, _>(i)
            .map(|v| json!(v))
            .unwrap_or(Value::Null),

        _ => row
            .try_get_raw(i)
            .ok()
            .and_then(|raw| raw.as_bytes().ok())
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
            .map_or(Value::Null, |s| json!(s)),
    }
}

/// Whole decimals become JSON integers, the rest JSON floats.
fn decimal_to_json(value: rust_decimal::Decimal) -> Value {
    if value.fract().is_zero()
        && let Some(int) = value.to_i64()
    {
        return json!(int);
    }
    value.to_f64().map_or(Value::Null, |v| json!(v))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use rust_decimal::Decimal;
    use std::path::PathBuf;
    use std::str::FromStr;

    fn config(dsn: &str) -> DatabaseConfig {
        DatabaseConfig {
            username: "sh".to_string(),
            password: "pw".to_string(),
            wallet_path: None,
            wallet_password: None,
            dsn: dsn.to_string(),
            schema: "sh".to_string(),
        }
    }

    #[rstest]
    #[case("warehouse.internal:5433/sales", "warehouse.internal", 5433, "sales")]
    #[case("localhost/sales", "localhost", 5432, "sales")]
    #[case("postgres://other@db.example:6543/dw", "db.example", 6543, "dw")]
    fn test_connect_options_from_dsn(
        #[case] dsn: &str,
        #[case] host: &str,
        #[case] port: u16,
        #[case] database: &str,
    ) {
        let options = connect_options(&config(dsn)).unwrap();
        assert_eq!(options.get_host(), host);
        assert_eq!(options.get_port(), port);
        assert_eq!(options.get_database(), Some(database));
        assert_eq!(options.get_username(), "sh");
    }

    #[rstest]
    #[case("no-database")]
    #[case("localhost:not-a-port/sales")]
    fn test_bad_dsn(#[case] dsn: &str) {
        assert!(matches!(
            connect_options(&config(dsn)),
            Err(DbError::Connection(_))
        ));
    }

    #[test]
    fn test_wallet_requires_verified_tls() {
        let mut config = config("localhost/sales");
        config.wallet_path = Some(PathBuf::from("/nonexistent/wallet"));
        let options = connect_options(&config).unwrap();
        assert!(matches!(options.get_ssl_mode(), PgSslMode::VerifyFull));
    }

    #[rstest]
    #[case("sh", "\"sh\"")]
    #[case("Sales History", "\"Sales History\"")]
    #[case("a\"b", "\"a\"\"b\"")]
    fn test_quote_ident(#[case] ident: &str, #[case] expected: &str) {
        assert_eq!(quote_ident(ident), expected);
    }

    #[rstest]
    #[case(QueryArg::Text("x".into()), "TEXT")]
    #[case(QueryArg::Null, "TEXT")]
    #[case(QueryArg::Int(2), "INT8")]
    #[case(QueryArg::Date(chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()), "DATE")]
    fn test_param_types_match_binds(#[case] arg: QueryArg, #[case] expected: &str) {
        assert_eq!(param_type(&arg).name(), expected);
    }

    #[rstest]
    #[case("100", json!(100))]
    #[case("100.00", json!(100))]
    #[case("42.5", json!(42.5))]
    #[case("-3", json!(-3))]
    fn test_decimal_to_json(#[case] decimal: &str, #[case] expected: Value) {
        assert_eq!(decimal_to_json(Decimal::from_str(decimal).unwrap()), expected);
    }
}
