//! CLI command definitions

use autolearn_client::{Method, DEFAULT_RUN_TAG};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "autolearn")]
#[command(about = "Client for the autolearn backend: login, live logs and task progress", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backend base URL
    #[arg(long, env = "AUTOLEARN_SERVER", default_value = "http://127.0.0.1:8000", global = true)]
    pub server: String,

    /// File holding the session token (defaults to the user config directory)
    #[arg(long, env = "AUTOLEARN_TOKEN_FILE", global = true)]
    pub token_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in and store the session token
    Login {
        /// Username or phone number
        #[arg(short, long)]
        username: String,

        /// Password
        #[arg(long, env = "AUTOLEARN_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Forget the stored session token
    Logout,

    /// Show the logged-in user
    Whoami,

    /// Follow the live backend log
    ///
    /// Runs until the server closes the stream or Ctrl-C is pressed. A
    /// closed stream is not reopened; run the command again to reconnect.
    Tail {
        /// Show timestamp, level, user and IP columns
        #[arg(long)]
        table: bool,

        /// Run-tag component stripped from the start of each line
        #[arg(long, default_value = DEFAULT_RUN_TAG)]
        run_tag: String,
    },

    /// Show task progress for a credential
    Tasks {
        /// Credential ID
        credential_id: i64,
    },

    /// Stop the running auto-watch task
    Stop,

    /// Send a raw authenticated request and print the response
    ///
    /// Examples:
    ///   autolearn request GET /api/credentials/all
    ///   autolearn request POST /api/users/approve-user --data '{"user_id": 4}'
    Request {
        /// HTTP method
        #[arg(value_parser = parse_method)]
        method: Method,

        /// Endpoint path, e.g. /api/users/me
        endpoint: String,

        /// JSON request body
        #[arg(long)]
        data: Option<String>,
    },
}

fn parse_method(s: &str) -> Result<Method, String> {
    Method::from_bytes(s.to_uppercase().as_bytes())
        .map_err(|_| format!("Invalid HTTP method: {}", s))
}
