//! Token persistence for the command-line client
//!
//! - File: token kept in a single file under the user config directory

mod file;

pub use file::FileTokenStore;
