use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid user partition: {message}")]
    InvalidPartition { message: String },

    #[error("Field '{field}' of {usage} is invalid: {message}")]
    InvalidField {
        usage: String,
        field: String,
        message: String,
    },

    #[error("Key error: {0}")]
    Key(#[from] olx_core::KeyError),

    #[error("Core error: {0}")]
    Core(#[from] olx_core::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
