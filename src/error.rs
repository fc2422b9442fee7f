//! Error types shared across the converters, the simulator and the sync tool.

use thiserror::Error;

/// Internal failure of a conversion pass.
///
/// Never escapes the public `convert` entry points: the pipelines log it and
/// fall back to the unconverted input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConvertError {
    #[error("unterminated tag starting at byte {offset}")]
    UnterminatedTag { offset: usize },

    #[error("unterminated comment starting at byte {offset}")]
    UnterminatedComment { offset: usize },

    #[error("unterminated interpolation starting at byte {offset}")]
    UnterminatedInterpolation { offset: usize },

    #[error("unbalanced braces in stylesheet")]
    UnbalancedBraces,
}

/// Misuse of the simulator API. Expression misses are not errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("no page registered for route '{0}'")]
    UnknownRoute(String),

    #[error("no element with id '{id}' in page '{route}'")]
    UnknownElement { route: String, id: String },

    #[error("no handler '{handler}' for page '{route}'")]
    UnknownHandler { route: String, handler: String },

    #[error("data patch must be an object, got {0}")]
    InvalidPatch(String),

    #[error("page stack is empty")]
    EmptyStack,

    #[error("cannot navigate back from the root page")]
    NoPreviousPage,

    #[error("failed to process markup: {0}")]
    Markup(String),
}

/// Failure of a host API call, delivered through `fail`/`complete` callbacks.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum HostError {
    #[error("storage key '{0}' not found")]
    StorageMiss(String),

    #[error("no modal is open")]
    NoModal,

    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("io error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("page not found: {0}")]
    PageNotFound(String),

    #[error("watcher error: {0}")]
    Watch(#[from] notify::Error),
}

impl SyncError {
    pub fn io(path: impl AsRef<std::path::Path>, source: std::io::Error) -> Self {
        SyncError::Io {
            path: path.as_ref().display().to_string(),
            source,
        }
    }
}
