//! Error types for the autolearn client

use thiserror::Error;

/// Errors that can occur when talking to the autolearn backend
#[derive(Error, Debug)]
pub enum ClientError {
    /// No session token is stored; the caller must log in first
    #[error("Not logged in")]
    MissingToken,

    /// The server rejected the session token (HTTP 401 or WebSocket close 1008)
    #[error("Session expired")]
    SessionExpired,

    /// Network or WebSocket failure unrelated to authentication
    #[error("Transport error: {0}")]
    Transport(String),

    /// Inbound log payload that is neither JSON nor known transport noise
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Server answered with a non-success status
    #[error("Server error ({status}): {detail}")]
    Server { status: u16, detail: String },

    /// Login was refused
    #[error("Login failed: {0}")]
    Login(String),

    /// Token store could not be read or written
    #[error("Storage error: {0}")]
    Storage(String),

    /// Base URL or endpoint could not be parsed
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Failed to serialize/deserialize a body
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Operation timed out
    #[error("Operation timed out")]
    Timeout,
}

impl ClientError {
    /// True for the errors that end the session and require a fresh login
    pub fn requires_login(&self) -> bool {
        matches!(self, ClientError::MissingToken | ClientError::SessionExpired)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ClientError::Timeout
        } else if err.is_decode() {
            ClientError::Transport(format!("invalid response body: {}", err))
        } else {
            ClientError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ClientError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
