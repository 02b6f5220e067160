use std::path::PathBuf;

use olx_core::UsageKey;

#[derive(thiserror::Error, Debug)]
pub enum RuntimeError {
    #[error("Codec error: {0}")]
    Codec(#[from] olx_codec::Error),

    #[error("Assignment error: {0}")]
    Assignment(#[from] olx_assignment::Error),

    #[error("Core error: {0}")]
    Core(#[from] olx_core::Error),

    #[error("Key error: {0}")]
    Key(#[from] olx_core::KeyError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to read config {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{usage} is not part of the course")]
    UnknownUsage { usage: UsageKey },
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
