//! autolearn Rust client
//!
//! Session handling and live log streaming for the autolearn backend. Every
//! authenticated call goes through a shared [`Session`]: REST requests carry
//! its bearer token, and the log stream authenticates with the same token.
//! A rejected token (HTTP 401, WebSocket close 1008) clears the session and
//! signals redirect-to-login.
//!
//! # Example
//!
//! ```no_run
//! use autolearn_client::{ApiClient, ClientConfig, LogStream, MemorySink, Session};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ClientConfig::new("http://127.0.0.1:8000");
//!     let session = Session::in_memory();
//!
//!     let api = ApiClient::new(config.clone(), session.clone())?;
//!     api.login("alice", "secret").await?;
//!     println!("Logged in as {}", api.current_user().await?.username);
//!
//!     // Tail the live log
//!     let sink = MemorySink::new();
//!     let stream = LogStream::new(config, session, sink.clone());
//!     stream.connect().await?;
//!     let state = stream.closed().await;
//!     println!("Stream ended: {:?}, {} lines", state, sink.lines().len());
//!
//!     Ok(())
//! }
//! ```

mod api;
mod config;
mod error;
mod filter;
mod messages;
mod progress;
mod session;
mod sink;
mod stream;

pub use api::{ensure_success, ApiClient, RequestOptions};
pub use config::{ClientConfig, DEFAULT_LOG_PATH};
pub use error::{ClientError, Result};
pub use filter::{Action, FilterPolicy, Pattern, Rule, DEFAULT_RUN_TAG};
pub use messages::{LogEntry, SystemUser, Task, Video};
pub use progress::Progress;
pub use session::{MemoryTokenStore, Session, SessionEvent, TokenStore};
pub use sink::{DisplayLine, LogSink, MemorySink, Notice};
pub use stream::{LogStream, StreamEvent, StreamState, ABNORMAL_CLOSURE, POLICY_VIOLATION};

pub use reqwest::{Method, StatusCode};
