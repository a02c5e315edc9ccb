use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FlowError>;

/// Every failure the engine can report.
///
/// Interactive flows print these and return to their menu; execution flows
/// never surface them (see [`crate::executor::ActionExecutor::execute`]).
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid input: {0}")]
    Validation(String),

    #[error("cannot decode output as {0}")]
    Decode(String),

    #[error("execution failed: {0}")]
    Execution(String),

    #[error("nothing to generate: no points recorded")]
    NothingToGenerate,

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("input injection failed: {0}")]
    Input(String),

    #[error("screen capture failed: {0}")]
    Capture(String),

    #[error("paste aborted after {delivered} characters: {message}")]
    Paste { delivered: usize, message: String },

    #[error("lua: {0}")]
    Lua(String),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Stdio(#[from] std::io::Error),
}

impl FlowError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        FlowError::Io { path: path.to_path_buf(), source }
    }

    pub fn json(path: &Path, source: serde_json::Error) -> Self {
        FlowError::Json { path: path.to_path_buf(), source }
    }
}

/// Helper to convert mlua::Error -> FlowError
pub fn lua_err(e: mlua::Error) -> FlowError {
    FlowError::Lua(e.to_string())
}
