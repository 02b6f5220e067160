use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Codec(#[from] olx_codec::Error),

    #[error(transparent)]
    Runtime(#[from] olx_runtime::RuntimeError),

    #[error(transparent)]
    Core(#[from] olx_core::Error),

    #[error("Failed to write output: {0}")]
    Output(#[from] io::Error),

    #[error("Cannot create {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Usage {usage} is not part of the course")]
    UnknownUsage { usage: String },
}

pub type Result<T> = std::result::Result<T, CliError>;
