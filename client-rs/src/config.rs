//! Configuration for the autolearn client

use crate::error::{ClientError, Result};
use std::time::Duration;
use url::Url;

/// Default path of the log broadcast WebSocket
pub const DEFAULT_LOG_PATH: &str = "/api/tasks/ws/logs";

/// Configuration for connecting to an autolearn backend
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "http://127.0.0.1:8000")
    pub base_url: String,

    /// Path of the log broadcast WebSocket endpoint
    pub log_path: String,

    /// Timeout for REST requests
    pub request_timeout: Duration,

    /// Timeout for the WebSocket handshake
    pub connect_timeout: Duration,
}

impl ClientConfig {
    /// Create a new configuration for the given backend URL
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            log_path: DEFAULT_LOG_PATH.to_string(),
            request_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
        }
    }

    /// Set the log stream endpoint path
    pub fn log_path(mut self, path: impl Into<String>) -> Self {
        self.log_path = path.into();
        self
    }

    /// Set the REST request timeout
    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the WebSocket connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Resolve a REST endpoint against the base URL
    pub fn endpoint_url(&self, endpoint: &str) -> Result<Url> {
        let base = Url::parse(&self.base_url)?;
        Ok(base.join(endpoint)?)
    }

    /// Build the log stream URL, carrying the token as a query parameter.
    ///
    /// `http` maps to `ws` and `https` to `wss`.
    pub fn log_stream_url(&self, token: &str) -> Result<Url> {
        let mut url = self.endpoint_url(&self.log_path)?;
        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(ClientError::Transport(format!(
                    "unsupported URL scheme: {}",
                    other
                )))
            }
        };
        url.set_scheme(scheme)
            .map_err(|_| ClientError::Transport(format!("cannot use scheme {}", scheme)))?;
        url.query_pairs_mut().append_pair("token", token);
        Ok(url)
    }
}
