use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_QUERIES_PATH: &str = "queries.sql";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("missing config value: database.{0}")]
    Missing(&'static str),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolboxConfig {
    #[serde(alias = "oracle")]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub toolbox: ToolboxSection,
}

/// Connection settings for the sales warehouse.
///
/// `dsn` is either `host[:port]/database` or a full `postgres://` URL.
/// `wallet_path` points at a directory holding `root.crt` and, optionally,
/// `client.crt`/`client.key`.
#[derive(Serialize, Deserialize, Default)]
pub struct DatabaseConfig {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub wallet_path: Option<PathBuf>,
    #[serde(default)]
    pub wallet_password: Option<String>,
    pub dsn: String,
    pub schema: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("wallet_path", &self.wallet_path)
            .field(
                "wallet_password",
                &self.wallet_password.as_ref().map(|_| "<redacted>"),
            )
            .field("dsn", &self.dsn)
            .field("schema", &self.schema)
            .finish()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ToolboxSection {
    #[serde(default = "default_queries_path")]
    pub queries: PathBuf,
}

impl Default for ToolboxSection {
    fn default() -> Self {
        Self {
            queries: default_queries_path(),
        }
    }
}

fn default_queries_path() -> PathBuf {
    PathBuf::from(DEFAULT_QUERIES_PATH)
}

impl ToolboxConfig {
    /// Reads and validates the config file at `path`.
    ///
    /// # Errors
    /// Fails when the file cannot be read, is not valid TOML, or leaves a
    /// required connection value blank.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents)
    }

    /// Parses config from TOML text.
    ///
    /// # Errors
    /// Fails on invalid TOML or a blank required connection value.
    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(contents)?;
        config.database.validate()?;
        Ok(config)
    }
}

impl DatabaseConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("username", &self.username),
            ("dsn", &self.dsn),
            ("schema", &self.schema),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(name));
            }
        }
        Ok(())
    }

    /// Non-empty wallet password, if one was configured.
    pub fn wallet_password(&self) -> Option<&str> {
        self.wallet_password
            .as_deref()
            .filter(|password| !password.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const FULL: &str = r#"
[database]
username = "sh"
password = "secret"
wallet_path = "/etc/warehouse/wallet"
wallet_password = ""
dsn = "warehouse.internal:5433/sales"
schema = "sh"

[toolbox]
queries = "sql/queries.sql"
"#;

    #[test]
    fn test_parses_full_config() {
        let config = ToolboxConfig::from_toml(FULL).unwrap();
        assert_eq!(config.database.username, "sh");
        assert_eq!(config.database.dsn, "warehouse.internal:5433/sales");
        assert_eq!(
            config.database.wallet_path,
            Some(PathBuf::from("/etc/warehouse/wallet"))
        );
        assert_eq!(config.database.wallet_password(), None);
        assert_eq!(config.toolbox.queries, PathBuf::from("sql/queries.sql"));
    }

    #[test]
    fn test_accepts_oracle_section_and_defaults_queries_path() {
        let config = ToolboxConfig::from_toml(
            r#"
[oracle]
username = "sh"
password = "pw"
dsn = "localhost/sales"
schema = "sh"
"#,
        )
        .unwrap();
        assert_eq!(config.database.schema, "sh");
        assert_eq!(config.database.wallet_path, None);
        assert_eq!(config.toolbox.queries, PathBuf::from("queries.sql"));
    }

    #[rstest]
    #[case("username")]
    #[case("dsn")]
    #[case("schema")]
    fn test_blank_required_value_is_rejected(#[case] field: &str) {
        let mut values = vec![
            ("username", "sh"),
            ("password", "pw"),
            ("dsn", "localhost/sales"),
            ("schema", "sh"),
        ];
        for (name, value) in &mut values {
            if *name == field {
                *value = " ";
            }
        }
        let body = values
            .iter()
            .map(|(name, value)| format!("{name} = \"{value}\""))
            .collect::<Vec<_>>()
            .join("\n");
        let err = ToolboxConfig::from_toml(&format!("[database]\n{body}\n")).unwrap_err();
        assert!(matches!(err, ConfigError::Missing(name) if name == field));
    }

    #[test]
    fn test_missing_section_is_parse_error() {
        let err = ToolboxConfig::from_toml("[toolbox]\nqueries = \"q.sql\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let config = ToolboxConfig::from_toml(FULL).unwrap();
        let rendered = format!("{:?}", config.database);
        assert!(!rendered.contains("secret"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn test_missing_file_reports_path() {
        let err = ToolboxConfig::load("/nonexistent/toolbox.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/toolbox.toml"));
    }
}
