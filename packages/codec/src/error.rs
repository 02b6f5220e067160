use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("XML error at {position}: {message}")]
    Xml { position: u64, message: String },

    #[error("XML write error: {message}")]
    XmlWrite { message: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Resource not found: {path}")]
    ResourceNotFound { path: String },

    #[error("Path leaves the course root: {path}")]
    InvalidPath { path: String },

    #[error("Definition of {category} '{url_name}' not found (tried {})", tried.join(", "))]
    DefinitionNotFound {
        category: String,
        url_name: String,
        tried: Vec<String>,
    },

    #[error("Expected <{expected}> but found <{found}>")]
    UnexpectedElement { expected: String, found: String },

    #[error("Field '{field}' of {usage} must hold {expected}")]
    InvalidFieldValue {
        usage: String,
        field: String,
        expected: &'static str,
    },

    #[error("Core error: {0}")]
    Core(#[from] olx_core::Error),

    #[error("Key error: {0}")]
    Key(#[from] olx_core::KeyError),
}

pub type Result<T> = std::result::Result<T, Error>;
