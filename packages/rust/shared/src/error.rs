//! Error types for probs-runner.
//!
//! Library crates use [`ProbsError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Variants fall into three families: construction errors raised while
//! assembling datasources and staged trees (always before any engine process
//! starts), process errors from the engine subprocess, and query errors from
//! a live endpoint.

use std::path::PathBuf;

/// Top-level error type for all probs-runner operations.
#[derive(Debug, thiserror::Error)]
pub enum ProbsError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Two inputs would be staged under the same file name.
    #[error("duplicate input name '{name}'; pass explicit names to disambiguate")]
    DuplicateName { name: String },

    /// No loader script was given and some inputs cannot be imported automatically.
    #[error("no load_data script given, and cannot automatically load {} files", .suffixes.join(", "))]
    UnsupportedFormats { suffixes: Vec<String> },

    /// An input path does not exist.
    #[error("not found: {}", .path.display())]
    NotFound { path: PathBuf },

    /// Two sources were staged to the same destination path.
    #[error("duplicate entry in staged files for '{path}' (from {existing} and {incoming})")]
    Collision {
        path: String,
        existing: String,
        incoming: String,
    },

    /// A staged destination path escapes the working root.
    #[error("invalid staged path '{path}': {reason}")]
    InvalidPath { path: String, reason: String },

    /// Caller passed an argument this layer cannot act on.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// The engine process failed to start, exited early, or reported failure.
    #[error("engine error: {message}")]
    Engine {
        message: String,
        /// Tail of the engine's stdout/stderr, oldest line first.
        diagnostics: Vec<String>,
    },

    /// A stage finished without writing its output artifact.
    #[error("stage output missing at {}", .path.display())]
    MissingOutput {
        path: PathBuf,
        diagnostics: Vec<String>,
    },

    /// HTTP transport error talking to an endpoint.
    #[error("network error: {0}")]
    Network(String),

    /// The endpoint rejected a query; `body` is the engine's own message.
    #[error("query failed with HTTP {status}: {body}")]
    Query { status: u16, body: String },

    /// A query result did not have the expected shape.
    #[error("decode error: {message}")]
    Decode { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ProbsError>;

impl ProbsError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create an invalid-input error from any displayable message.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: msg.into(),
        }
    }

    /// Create a decode error from any displayable message.
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode {
            message: msg.into(),
        }
    }

    /// Create an engine error carrying the process diagnostics.
    pub fn engine(msg: impl Into<String>, diagnostics: Vec<String>) -> Self {
        Self::Engine {
            message: msg.into(),
            diagnostics,
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was raised while assembling inputs, before any engine ran.
    pub fn is_construction(&self) -> bool {
        matches!(
            self,
            Self::DuplicateName { .. }
                | Self::UnsupportedFormats { .. }
                | Self::NotFound { .. }
                | Self::Collision { .. }
                | Self::InvalidPath { .. }
                | Self::InvalidInput { .. }
        )
    }

    /// Engine output captured before the failure, if any.
    pub fn diagnostics(&self) -> &[String] {
        match self {
            Self::Engine { diagnostics, .. } | Self::MissingOutput { diagnostics, .. } => {
                diagnostics
            }
            _ => &[],
        }
    }
}
