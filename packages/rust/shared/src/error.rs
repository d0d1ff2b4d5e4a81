//! Error types for Briefdesk.
//!
//! Library crates use [`BriefdeskError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all Briefdesk operations.
#[derive(Debug, thiserror::Error)]
pub enum BriefdeskError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during source retrieval or link validation.
    #[error("network error: {0}")]
    Network(String),

    /// Response parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Generative provider error (API, rate limit, or response shape).
    #[error("llm error: {0}")]
    Llm(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (disallowed field, bad state transition, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Pipeline run aborted by an operator-initiated cancellation.
    #[error("pipeline cancelled")]
    Cancelled,
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BriefdeskError>;

impl BriefdeskError {
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

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error is a rate-limit-class provider error.
    ///
    /// Rate-limit errors are the only class the generative retry policy
    /// will retry; everything else aborts the call immediately.
    pub fn is_rate_limit(&self) -> bool {
        match self {
            Self::Llm(msg) => {
                let lower = msg.to_lowercase();
                lower.contains("429")
                    || lower.contains("rate limit")
                    || lower.contains("resource exhausted")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = BriefdeskError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = BriefdeskError::validation("column 'title' is not updatable");
        assert!(err.to_string().contains("not updatable"));
    }

    #[test]
    fn rate_limit_detection() {
        assert!(BriefdeskError::Llm("HTTP 429 Too Many Requests".into()).is_rate_limit());
        assert!(BriefdeskError::Llm("Resource exhausted, slow down".into()).is_rate_limit());
        assert!(!BriefdeskError::Llm("HTTP 500 internal error".into()).is_rate_limit());
        assert!(!BriefdeskError::Network("429".into()).is_rate_limit());
    }
}
