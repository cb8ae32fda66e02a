//! Error types for the codeloop domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error enum.

use thiserror::Error;

/// The top-level error type for codeloop operations.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Context error: {0}")]
    Context(#[from] ContextError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("API request failed: {message} (status: {status_code})")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limited by provider, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Debug, Clone, Error)]
pub enum ToolError {
    #[error("Tool not found: {0}")]
    NotFound(String),

    #[error("Tool execution failed: {tool_name}: {reason}")]
    ExecutionFailed { tool_name: String, reason: String },

    #[error("{tool_name} timed out after {timeout_secs} seconds")]
    Timeout { tool_name: String, timeout_secs: u64 },

    #[error("Interrupted: {tool_name}")]
    Interrupted { tool_name: String },

    #[error("Permission denied: {tool_name}: {reason}")]
    PermissionDenied { tool_name: String, reason: String },

    #[error("Invalid tool arguments: {0}")]
    InvalidArguments(String),

    /// A calling convention the wrapped tool does not implement.
    #[error("Calling convention not supported: {0}")]
    Unsupported(String),

    #[error("All execution methods failed for {tool_name}: {}", attempts.join("; "))]
    AllMethodsFailed {
        tool_name: String,
        attempts: Vec<String>,
    },
}

impl ToolError {
    /// Timeouts and interruptions are transient, everything else is a logical failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ToolError::Timeout { .. } | ToolError::Interrupted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("Path is not tracked in the context store: {0}")]
    NotTracked(String),

    #[error("Path was forgotten and will not be tracked: {0}")]
    Forgotten(String),
}
