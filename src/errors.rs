use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Unrecognized artifact format: {0}")]
    Format(String),

    #[error("{tool} failed with {status}: {stderr}")]
    ExternalTool {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Encryption error: {0}")]
    Crypto(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AppError>;
