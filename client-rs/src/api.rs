//! Authenticated REST access
//!
//! [`ApiClient::authenticated_request`] is the only path to authenticated
//! endpoints: it attaches the bearer token and turns a 401 into session
//! expiry. Every typed helper below is built on it.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::messages::{ErrorBody, MessageResponse, SystemUser, Task, TokenResponse};
use crate::session::Session;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Caller-supplied parts of an authenticated request
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    headers: HeaderMap,
    body: Option<Vec<u8>>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a header. `Content-Type` overrides the JSON default;
    /// `Authorization` is always replaced by the session token.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Serialize `body` as the JSON request body
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        self.body = Some(serde_json::to_vec(body)?);
        Ok(self)
    }

    /// Use raw bytes as the request body
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// REST client bound to a session
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    session: Session,
}

impl ApiClient {
    pub fn new(config: ClientConfig, session: Session) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            http,
            config,
            session,
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Send a request carrying the session's bearer token.
    ///
    /// Fails with `MissingToken` before sending anything if there is no
    /// token. A 401 clears the token, signals redirect-to-login and fails
    /// with `SessionExpired`. Every other status is returned untouched.
    pub async fn authenticated_request(
        &self,
        method: Method,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<Response> {
        let token = self.session.require_token()?;
        let url = self.config.endpoint_url(endpoint)?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.extend(options.headers);
        headers.insert(AUTHORIZATION, bearer(&token)?);

        let mut request = self.http.request(method.clone(), url).headers(headers);
        if let Some(body) = options.body {
            request = request.body(body);
        }

        debug!(%method, endpoint, "Sending authenticated request");
        let response = request.send().await?;

        if response.status() == StatusCode::UNAUTHORIZED {
            warn!(endpoint, "Server rejected the session token");
            self.session.expire(&token);
            return Err(ClientError::SessionExpired);
        }

        Ok(response)
    }

    /// GET an endpoint and decode a successful JSON response
    pub async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T> {
        let response = self
            .authenticated_request(Method::GET, endpoint, RequestOptions::new())
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// POST a JSON body and decode a successful JSON response
    pub async fn post_json<B, T>(&self, endpoint: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let options = RequestOptions::new().json(body)?;
        let response = self
            .authenticated_request(Method::POST, endpoint, options)
            .await?;
        Ok(ensure_success(response).await?.json().await?)
    }

    /// The logged-in user
    pub async fn current_user(&self) -> Result<SystemUser> {
        self.get_json("/api/users/me").await
    }

    /// Tasks recorded for one credential
    pub async fn credential_tasks(&self, credential_id: i64) -> Result<Vec<Task>> {
        self.get_json(&format!("/api/tasks/credentials/{}/tasks", credential_id))
            .await
    }

    /// Ask the backend to stop the running watcher; returns its message
    pub async fn stop_auto_watching(&self) -> Result<String> {
        let response = self
            .authenticated_request(
                Method::POST,
                "/api/tasks/stop-auto-watching",
                RequestOptions::new(),
            )
            .await?;
        let body: MessageResponse = ensure_success(response).await?.json().await?;
        Ok(body.message)
    }

    /// Exchange credentials for a token and store it in the session
    pub async fn login(&self, username: &str, password: &str) -> Result<()> {
        let url = self.config.endpoint_url("/api/users/token")?;
        let response = self
            .http
            .post(url)
            .form(&[("username", username), ("password", password)])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClientError::Login(error_detail(response).await));
        }

        let body: TokenResponse = response.json().await?;
        self.session.login_with(&body.access_token)?;
        info!(username, "Logged in");
        Ok(())
    }

    /// Drop the stored token
    pub fn logout(&self) -> Result<()> {
        self.session.logout()
    }
}

/// Turn a non-2xx response into `ClientError::Server`
pub async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    Err(ClientError::Server {
        status: status.as_u16(),
        detail: error_detail(response).await,
    })
}

async fn error_detail(response: Response) -> String {
    let status = response.status();
    let text = match response.text().await {
        Ok(text) => text,
        Err(_) => return status.to_string(),
    };

    serde_json::from_str::<ErrorBody>(&text)
        .ok()
        .and_then(|body| body.describe())
        .unwrap_or_else(|| {
            if text.trim().is_empty() {
                status.canonical_reason().unwrap_or("").to_string()
            } else {
                text
            }
        })
}

fn bearer(token: &str) -> Result<HeaderValue> {
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|_| ClientError::Transport("session token is not a valid header value".into()))?;
    value.set_sensitive(true);
    Ok(value)
}
