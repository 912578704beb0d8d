//! Session context shared by every network-calling component
//!
//! The token lives behind a [`TokenStore`]. The store is the single source of
//! truth; `Session` only adds the expiry bookkeeping and the event bus that
//! carries redirect-to-login signals.

use crate::error::{ClientError, Result};

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Persistent storage for the session token
pub trait TokenStore: Send + Sync {
    /// Read the stored token, if any
    fn load(&self) -> Option<String>;

    /// Replace the stored token
    fn save(&self, token: &str) -> Result<()>;

    /// Remove the stored token
    fn clear(&self) -> Result<()>;
}

/// In-memory token store
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: Mutex::new(Some(token.into())),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<String> {
        self.token.lock().clone()
    }

    fn save(&self, token: &str) -> Result<()> {
        *self.token.lock() = Some(token.to_string());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.token.lock() = None;
        Ok(())
    }
}

/// Signals emitted when the session changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// A token was stored after login
    LoggedIn,
    /// The token was cleared by an explicit logout
    LoggedOut,
    /// The server rejected the token; it has been cleared
    Expired,
    /// The user must log in before continuing
    RedirectToLogin,
}

struct SessionInner {
    store: Box<dyn TokenStore>,
    // Serializes compare-and-clear against the store
    write_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

/// Shared session context
///
/// Cheaply cloneable; all clones see the same token and event bus.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session backed by the given token store
    pub fn new(store: impl TokenStore + 'static) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            inner: Arc::new(SessionInner {
                store: Box::new(store),
                write_lock: Mutex::new(()),
                events,
            }),
        }
    }

    /// Session with an in-memory store and no token
    pub fn in_memory() -> Self {
        Self::new(MemoryTokenStore::new())
    }

    /// Current token; empty strings count as absent
    pub fn token(&self) -> Option<String> {
        self.inner.store.load().filter(|t| !t.is_empty())
    }

    /// Whether a token is present
    pub fn is_authenticated(&self) -> bool {
        self.token().is_some()
    }

    /// Receive session events
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Store a freshly issued token
    pub fn login_with(&self, token: &str) -> Result<()> {
        if token.is_empty() {
            return Err(ClientError::Login("server returned an empty token".into()));
        }
        let _guard = self.inner.write_lock.lock();
        self.inner.store.save(token)?;
        self.emit(SessionEvent::LoggedIn);
        Ok(())
    }

    /// Clear the token on explicit logout
    pub fn logout(&self) -> Result<()> {
        let _guard = self.inner.write_lock.lock();
        self.inner.store.clear()?;
        info!("Logged out");
        self.emit(SessionEvent::LoggedOut);
        Ok(())
    }

    /// Return the token, or signal redirect-to-login and fail
    pub fn require_token(&self) -> Result<String> {
        match self.token() {
            Some(token) => Ok(token),
            None => {
                debug!("No session token, redirecting to login");
                self.emit(SessionEvent::RedirectToLogin);
                Err(ClientError::MissingToken)
            }
        }
    }

    /// Handle a server-side rejection of `used_token`.
    ///
    /// Clears the store only if it still holds `used_token`, so concurrent
    /// rejections of the same token produce a single `Expired` +
    /// `RedirectToLogin` pair. Returns whether this call cleared the token.
    pub fn expire(&self, used_token: &str) -> bool {
        let _guard = self.inner.write_lock.lock();
        if self.inner.store.load().as_deref() != Some(used_token) {
            return false;
        }
        if let Err(e) = self.inner.store.clear() {
            // Still signal: the server has rejected this token regardless
            warn!("Failed to clear expired token: {}", e);
        }
        info!("Session expired");
        self.emit(SessionEvent::Expired);
        self.emit(SessionEvent::RedirectToLogin);
        true
    }

    fn emit(&self, event: SessionEvent) {
        // No receivers is fine
        let _ = self.inner.events.send(event);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
