//! Error types for AgentCore

use thiserror::Error;

/// Result type alias using AgentCore's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for AgentCore
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// LLM backend error (transport or server side)
    #[error("LLM API error: {0}")]
    Llm(String),

    /// Every configured model and fallback is unavailable
    #[error("Model unavailable: {0}")]
    ModelUnavailable(String),

    /// Rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimit(String),

    /// Unauthorized access
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Requested operation is not supported by the active backend
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Tool is not registered
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Tool name is already registered
    #[error("Duplicate tool: {0}")]
    DuplicateTool(String),

    /// Tool failed registration validation
    #[error("Tool validation failed: {0}")]
    ToolValidation(String),

    /// Tool arguments failed decoding or schema validation
    #[error("Invalid tool argument: {0}")]
    InvalidToolArgument(String),

    /// Tool execution exceeded its timeout, including recovery attempts
    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// Tool execution failed
    #[error("Tool execution failed: {0}")]
    ToolExecution(String),

    /// Agent run exceeded its outer deadline
    #[error("Deadline exceeded: {0}")]
    Deadline(String),

    /// Session has expired
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Session does not exist
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Http(_) | Error::Llm(_) | Error::RateLimit(_) | Error::ToolTimeout(_)
        )
    }

    /// Check if error is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_)
                | Error::InvalidToolArgument(_)
                | Error::NotFound(_)
                | Error::Unauthorized(_)
                | Error::ToolValidation(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::Llm("503".into()).is_retryable());
        assert!(Error::RateLimit("slow down".into()).is_retryable());
        assert!(!Error::ModelUnavailable("gone".into()).is_retryable());
        assert!(!Error::DuplicateTool("time".into()).is_retryable());
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::InvalidToolArgument("bad".into()).is_client_error());
        assert!(!Error::Llm("500".into()).is_client_error());
    }
}
