//! Error types for lazylist.
//!
//! Library crates use [`LazyListError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all lazylist operations.
#[derive(Debug, thiserror::Error)]
pub enum LazyListError {
    /// Missing or invalid configuration (credentials, model id, config file).
    #[error("config error: {message}")]
    Config { message: String },

    /// Caller input rejected before any browser or engine work.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Initial page load, or a bounded wait step, failed or timed out.
    #[error("navigation error: {0}")]
    Navigation(String),

    /// Browser session could not be opened or torn down.
    #[error("session error: {0}")]
    Session(String),

    /// Extraction engine failed or returned output that breaks the schema.
    #[error("extraction engine error: {0}")]
    ExtractionEngine(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, LazyListError>;

impl LazyListError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a navigation error from any displayable message.
    pub fn navigation(msg: impl Into<String>) -> Self {
        Self::Navigation(msg.into())
    }

    /// Create a session error from any displayable message.
    pub fn session(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create an extraction engine error from any displayable message.
    pub fn engine(msg: impl Into<String>) -> Self {
        Self::ExtractionEngine(msg.into())
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from the browser session lifecycle.
    pub fn is_session(&self) -> bool {
        matches!(self, Self::Session(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = LazyListError::config("OPENAI_API_KEY is not set");
        assert_eq!(err.to_string(), "config error: OPENAI_API_KEY is not set");

        let err = LazyListError::navigation("timed out after 120s");
        assert!(err.to_string().starts_with("navigation error"));
        assert!(!err.is_session());

        let err = LazyListError::session("browser teardown failed");
        assert!(err.is_session());
    }
}
