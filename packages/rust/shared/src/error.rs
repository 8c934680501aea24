//! Error types for ArticleFix.
//!
//! Library crates use [`ArticleFixError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ArticleFix operations.
#[derive(Debug, thiserror::Error)]
pub enum ArticleFixError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Rate-limited or transient failure from the generative model service.
    #[error("transient service error{}: {message}", status_suffix(.status))]
    TransientService { status: Option<u16>, message: String },

    /// Non-retryable failure from the generative model service.
    #[error("service error{}: {message}", status_suffix(.status))]
    PermanentService { status: Option<u16>, message: String },

    /// Model output that could not be parsed into the expected shape.
    #[error("unparseable model response: {0}")]
    ResponseFormat(String),

    /// A candidate failed an invariant check before persisting.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Progress ledger or results log could not be read or written.
    #[error("ledger error: {0}")]
    Ledger(String),

    /// The tag normalizer could not produce derived HTML.
    #[error("render error: {0}")]
    Render(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({s})")).unwrap_or_default()
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ArticleFixError>;

impl ArticleFixError {
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

    /// Create a transient (retryable) service error.
    pub fn transient(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::TransientService {
            status,
            message: msg.into(),
        }
    }

    /// Create a permanent (non-retryable) service error.
    pub fn permanent(status: Option<u16>, msg: impl Into<String>) -> Self {
        Self::PermanentService {
            status,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether the retry loop may try this operation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransientService { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ArticleFixError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ArticleFixError::transient(Some(429), "quota exhausted");
        assert_eq!(err.to_string(), "transient service error (429): quota exhausted");

        let err = ArticleFixError::permanent(None, "bad request");
        assert_eq!(err.to_string(), "service error: bad request");
    }

    #[test]
    fn only_transient_errors_are_retryable() {
        assert!(ArticleFixError::transient(Some(503), "unavailable").is_retryable());
        assert!(!ArticleFixError::permanent(Some(400), "bad").is_retryable());
        assert!(!ArticleFixError::ResponseFormat("nope".into()).is_retryable());
        assert!(!ArticleFixError::Storage("locked".into()).is_retryable());
        assert!(!ArticleFixError::validation("too short").is_retryable());
    }
}
