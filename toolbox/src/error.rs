use db::DbError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("unknown tool '{0}'")]
    UnknownTool(String),

    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("invalid arguments for '{tool}': {source}")]
    InvalidArguments {
        tool: String,
        source: serde_json::Error,
    },

    #[error("invalid dimension value: {0}")]
    InvalidValue(String),

    #[error("could not encode payload: {0}")]
    Encode(#[from] serde_json::Error),
}
