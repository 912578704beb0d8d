//! autolearn - command-line client for the autolearn backend
//!
//! Logs in, keeps the session token on disk and tails the live backend log
//! over a WebSocket. The protocol side lives in `autolearn_client`; this
//! crate adds the file token store, terminal rendering and the CLI.

pub mod cli;
pub mod render;
pub mod storage;

pub use render::{DisplayMode, TerminalSink};
pub use storage::FileTokenStore;
