//! Error types for the pure core.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("malformed long-poll payload: {0}")]
    Malformed(String),

    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {detail}")]
    Invalid { field: &'static str, detail: String },
}
