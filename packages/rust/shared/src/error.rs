//! Error types for ToolHarvest.
//!
//! Library crates use [`ToolHarvestError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all ToolHarvest operations.
#[derive(Debug, thiserror::Error)]
pub enum ToolHarvestError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Network/HTTP error during capture or favicon fetch.
    #[error("network error: {0}")]
    Network(String),

    /// HTML parsing or content extraction error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or storage layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Language-model request or response error.
    #[error("llm error: {0}")]
    Llm(String),

    /// Headless browser launch, navigation or screenshot error.
    #[error("browser error: {0}")]
    Browser(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (invalid URL, bad record shape, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The categorizer hit its attempt ceiling without a valid answer.
    #[error("categorization gave up after {attempts} attempts")]
    CategorizationExhausted { attempts: u32 },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ToolHarvestError>;

impl ToolHarvestError {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = ToolHarvestError::config("missing API key");
        assert_eq!(err.to_string(), "config error: missing API key");

        let err = ToolHarvestError::CategorizationExhausted { attempts: 20 };
        assert_eq!(err.to_string(), "categorization gave up after 20 attempts");

        let err = ToolHarvestError::validation("dataId is empty");
        assert!(err.to_string().contains("dataId is empty"));
    }
}
