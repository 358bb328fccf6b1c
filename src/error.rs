use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ExportError {
    #[error("configuration: {0}")]
    Config(String),

    #[error("configuration: no file key in FILE_KEY and none could be parsed from config url {0:?}")]
    #[diagnostic(help("set FILE_KEY or point `url` in the config file at the design document"))]
    MissingFileKey(Option<String>),

    #[error("configuration: failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("configuration: failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("resolve: canvas {0:?} not found in design document")]
    CanvasNotFound(String),

    #[error("resolve: batched export request failed: {0}")]
    BatchExport(String),

    #[error("{stage}: request failed: {message}")]
    Http { stage: &'static str, message: String },

    #[error("{stage}: remote returned status {status}: {message}")]
    HttpStatus {
        stage: &'static str,
        status: u16,
        message: String,
    },

    #[error("optimize: {name}: {message}")]
    Optimization { name: String, message: String },

    #[error("resolve: mirror does not match local configuration ({field}: local {local:?}, mirror {remote:?})")]
    #[diagnostic(help("set TOKEN to export from the primary source instead"))]
    SourceMismatch {
        field: &'static str,
        local: String,
        remote: String,
    },

    #[error("resolve: asset name {0:?} is used by more than one component")]
    DuplicateAsset(String),

    #[error("resolve: invalid asset name {0:?}")]
    InvalidAssetName(String),

    #[error("stage: filesystem error: {0}")]
    Filesystem(String),

    #[error("download: run deadline of {0:?} exceeded")]
    DeadlineExceeded(Duration),

    #[error("download: task panicked: {0}")]
    TaskPanicked(String),
}

impl ExportError {
    pub fn fs(err: impl std::fmt::Display) -> Self {
        ExportError::Filesystem(err.to_string())
    }
}
