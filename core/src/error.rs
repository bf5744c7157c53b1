//! Error types for querybench-core

use std::path::PathBuf;

use thiserror::Error;

use crate::traits::ClientError;

/// Numeric codes reported as the process exit status.
///
/// The values follow the server's own error numbering so that a failed batch
/// exits with the same code the server would have reported.
pub mod codes {
    /// Malformed or contradictory input
    pub const BAD_ARGUMENTS: i32 = 36;
    /// Feature unavailable on this platform
    pub const NOT_IMPLEMENTED: i32 = 48;
    /// Internal invariant violated
    pub const LOGICAL_ERROR: i32 = 49;
    /// File could not be opened or read
    pub const CANNOT_OPEN_FILE: i32 = 76;
    /// Referenced file does not exist
    pub const FILE_DOESNT_EXIST: i32 = 107;
    /// Transport-level failure talking to the server
    pub const NETWORK_ERROR: i32 = 210;
}

/// Core error type
#[derive(Error, Debug)]
pub enum BenchError {
    /// Malformed or contradictory test configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Descriptor or profile document could not be parsed
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// File that failed to parse
        path: PathBuf,
        /// Underlying parser error
        #[source]
        source: serde_yaml::Error,
    },

    /// A referenced file does not exist
    #[error("file '{0}' does not exist")]
    MissingFile(PathBuf),

    /// Requested feature is not supported here
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Database client failure outside of a run
    #[error("client error: {0}")]
    Client(#[from] ClientError),

    /// Orchestration invariant broken
    #[error("orchestration error: {0}")]
    Orchestration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BenchError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        BenchError::Config(message.into())
    }

    /// Create a configuration error for a missing required field
    pub fn missing_config(field: &str) -> Self {
        BenchError::Config(format!("missing required field '{field}'"))
    }

    /// Create a not-implemented error
    pub fn not_implemented(message: impl Into<String>) -> Self {
        BenchError::NotImplemented(message.into())
    }

    /// Create an orchestration error
    pub fn orchestration(message: impl Into<String>) -> Self {
        BenchError::Orchestration(message.into())
    }

    /// Numeric error code for this error
    pub fn code(&self) -> i32 {
        match self {
            BenchError::Config(_) | BenchError::Parse { .. } => codes::BAD_ARGUMENTS,
            BenchError::MissingFile(_) => codes::FILE_DOESNT_EXIST,
            BenchError::NotImplemented(_) => codes::NOT_IMPLEMENTED,
            BenchError::Client(e) => e.code(),
            BenchError::Orchestration(_) => codes::LOGICAL_ERROR,
            BenchError::Io(_) => codes::CANNOT_OPEN_FILE,
        }
    }

    /// Whether this error comes from test configuration rather than the environment
    pub fn is_config(&self) -> bool {
        matches!(self, BenchError::Config(_) | BenchError::Parse { .. })
    }
}

/// Result type alias
pub type BenchResult<T> = std::result::Result<T, BenchError>;
