//! Command handlers

pub mod commands;

pub use commands::{Cli, Commands};

use crate::render::{DisplayMode, TerminalSink};
use crate::storage::FileTokenStore;
use anyhow::{bail, Context, Result};
use autolearn_client::{
    ApiClient, ClientConfig, FilterPolicy, LogStream, Method, Progress,
    RequestOptions, Session, SessionEvent, StreamState, POLICY_VIOLATION,
};
use tokio::sync::broadcast;
use tracing::{debug, info};

/// Run a parsed command line
pub async fn run(cli: Cli) -> Result<()> {
    let token_path = match cli.token_file {
        Some(path) => path,
        None => FileTokenStore::default_path()
            .context("Cannot determine the config directory; pass --token-file")?,
    };
    debug!(path = %token_path.display(), "Using token file");

    let session = Session::new(FileTokenStore::new(token_path));
    let config = ClientConfig::new(cli.server);

    let mut events = session.subscribe();
    let result = dispatch(cli.command, config, session).await;
    report_session_events(&mut events);
    result
}

async fn dispatch(command: Commands, config: ClientConfig, session: Session) -> Result<()> {
    match command {
        Commands::Login { username, password } => {
            let password =
                password.context("A password is required (--password or AUTOLEARN_PASSWORD)")?;
            login(api(config, session)?, &username, &password).await
        }
        Commands::Logout => logout(&session),
        Commands::Whoami => whoami(api(config, session)?).await,
        Commands::Tail { table, run_tag } => {
            let mode = if table {
                DisplayMode::Table
            } else {
                DisplayMode::Compact
            };
            tail(config, session, mode, &run_tag).await
        }
        Commands::Tasks { credential_id } => tasks(api(config, session)?, credential_id).await,
        Commands::Stop => stop(api(config, session)?).await,
        Commands::Request {
            method,
            endpoint,
            data,
        } => request(api(config, session)?, method, &endpoint, data).await,
    }
}

fn api(config: ClientConfig, session: Session) -> Result<ApiClient> {
    ApiClient::new(config, session).context("Failed to build HTTP client")
}

/// Print a hint for every redirect-to-login signal raised during the command
fn report_session_events(events: &mut broadcast::Receiver<SessionEvent>) {
    while let Ok(event) = events.try_recv() {
        match event {
            SessionEvent::Expired => eprintln!("Session expired."),
            SessionEvent::RedirectToLogin => eprintln!("Run `autolearn login` to sign in again."),
            SessionEvent::LoggedIn | SessionEvent::LoggedOut => {}
        }
    }
}

async fn login(api: ApiClient, username: &str, password: &str) -> Result<()> {
    api.login(username, password).await?;
    println!("Logged in as {}", username);
    Ok(())
}

fn logout(session: &Session) -> Result<()> {
    session.logout().context("Failed to remove the stored token")?;
    println!("Logged out");
    Ok(())
}

async fn whoami(api: ApiClient) -> Result<()> {
    let user = api.current_user().await?;
    if user.is_admin() {
        println!("{} (id {}, admin)", user.username, user.id);
    } else {
        println!("{} (id {})", user.username, user.id);
    }
    Ok(())
}

async fn tail(config: ClientConfig, session: Session, mode: DisplayMode, run_tag: &str) -> Result<()> {
    let policy = FilterPolicy::with_run_tag(run_tag)
        .with_context(|| format!("Invalid run tag: {}", run_tag))?;
    let stream = LogStream::with_filter(config, session, TerminalSink::stdout(mode), policy);

    stream.connect().await?;
    info!("Tailing log stream");

    let state = tokio::select! {
        state = stream.closed() => state,
        _ = tokio::signal::ctrl_c() => {
            stream.close().await?;
            stream.state()
        }
    };

    match state {
        StreamState::Closed {
            code: POLICY_VIOLATION,
            ..
        } => bail!("The log stream rejected the session token"),
        _ => Ok(()),
    }
}

async fn tasks(api: ApiClient, credential_id: i64) -> Result<()> {
    let tasks = api
        .credential_tasks(credential_id)
        .await
        .with_context(|| format!("Failed to fetch tasks for credential {}", credential_id))?;

    if tasks.is_empty() {
        println!("No tasks for credential {}", credential_id);
        return Ok(());
    }

    let progress = Progress::from_tasks(&tasks);
    println!("Progress: {}", progress);
    println!("Study hours: {}", progress.study_hours);
    Ok(())
}

async fn stop(api: ApiClient) -> Result<()> {
    let message = api.stop_auto_watching().await?;
    println!("{}", message);
    Ok(())
}

async fn request(api: ApiClient, method: Method, endpoint: &str, data: Option<String>) -> Result<()> {
    let mut options = RequestOptions::new();
    if let Some(data) = data {
        let body: serde_json::Value =
            serde_json::from_str(&data).context("--data must be valid JSON")?;
        options = options.json(&body)?;
    }

    let response = api.authenticated_request(method, endpoint, options).await?;
    let status = response.status();
    let text = response.text().await.context("Failed to read response body")?;

    println!("{}", status);
    match serde_json::from_str::<serde_json::Value>(&text) {
        Ok(json) => println!("{}", serde_json::to_string_pretty(&json)?),
        Err(_) if !text.is_empty() => println!("{}", text),
        Err(_) => {}
    }

    if !status.is_success() {
        bail!("Request failed with {}", status);
    }
    Ok(())
}
