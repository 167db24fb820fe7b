//! Error types for ESPM.
//!
//! Library crates use [`EspmError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ESPM operations.
#[derive(Debug, thiserror::Error)]
pub enum EspmError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed input record (JSON line, snapshot row, etc.).
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Data validation error (bad argument, inconsistent snapshot, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// A required lookup found nothing.
    #[error("missing {kind}: {key}")]
    Missing { kind: &'static str, key: String },

    /// A query was attempted before the offline build finished.
    #[error("taxonomy build has not completed")]
    BuildIncomplete,

    /// A query exceeded its time budget.
    #[error("query timed out after {elapsed_ms} ms")]
    Timeout { elapsed_ms: u128 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, EspmError>;

impl EspmError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a missing-entity error.
    pub fn missing(kind: &'static str, key: impl Into<String>) -> Self {
        Self::Missing {
            kind,
            key: key.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap any storage-backend error.
    pub fn storage(err: impl std::fmt::Display) -> Self {
        Self::Storage(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = EspmError::config("missing root title");
        assert_eq!(err.to_string(), "config error: missing root title");

        let err = EspmError::missing("category", "Physics");
        assert_eq!(err.to_string(), "missing category: Physics");

        let err = EspmError::Timeout { elapsed_ms: 5001 };
        assert!(err.to_string().contains("5001"));
    }
}
