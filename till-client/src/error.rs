//! Client error types

use thiserror::Error;

/// Client error type
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend row did not match the data contract
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Authentication required
    #[error("Authentication required")]
    Unauthorized,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Rejected locally before any network call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Precondition failed (e.g. deleting an occupied table)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A save is already in flight for this session
    #[error("Another save is already in progress")]
    Busy,

    /// Gateway call did not finish in time
    #[error("Timed out: {0}")]
    Timeout(String),

    /// No table or quick sale selected
    #[error("No active session")]
    NoSession,

    /// Backend reported a failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse error classification shown to the operator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Network,
    Conflict,
    Busy,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Validation(_) | ClientError::NoSession | ClientError::Config(_) => {
                ErrorKind::Validation
            }
            ClientError::Conflict(_) => ErrorKind::Conflict,
            ClientError::Busy => ErrorKind::Busy,
            ClientError::Http(_)
            | ClientError::Serialization(_)
            | ClientError::InvalidResponse(_)
            | ClientError::Unauthorized
            | ClientError::NotFound(_)
            | ClientError::Timeout(_)
            | ClientError::Backend(_) => ErrorKind::Network,
        }
    }

    /// Short operator-facing text
    pub fn user_message(&self) -> String {
        match self {
            ClientError::Validation(msg) | ClientError::Conflict(msg) => msg.clone(),
            ClientError::Busy => "Please wait, saving is in progress".to_string(),
            ClientError::Timeout(_) => "The server did not answer in time, try again".to_string(),
            ClientError::NoSession => "Select a table first".to_string(),
            ClientError::Unauthorized => "Session expired, please sign in again".to_string(),
            ClientError::NotFound(what) => format!("{} no longer exists", what),
            ClientError::Config(msg) => format!("Misconfigured: {}", msg),
            ClientError::Http(_)
            | ClientError::Serialization(_)
            | ClientError::InvalidResponse(_)
            | ClientError::Backend(_) => "Could not reach the server, try again".to_string(),
        }
    }
}

/// Result type for client operations
pub type ClientResult<T> = Result<T, ClientError>;
