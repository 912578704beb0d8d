//! Live log stream consumer
//!
//! One [`LogStream`] owns at most one WebSocket to the log broadcast endpoint.
//! Transport callbacks are turned into [`StreamEvent`]s and applied to the
//! state machine by [`LogStream::handle`], which is also where rendering
//! happens. There is no automatic reconnect; a closed stream reopens only
//! through another call to [`LogStream::connect`].

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::filter::FilterPolicy;
use crate::messages::LogEntry;
use crate::session::Session;
use crate::sink::{DisplayLine, LogSink, Notice};

use futures_util::StreamExt;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close code the server uses to reject the token
pub const POLICY_VIOLATION: u16 = 1008;
/// Close code reported when the socket ends without a close frame
pub const ABNORMAL_CLOSURE: u16 = 1006;
const NORMAL_CLOSURE: u16 = 1000;
const NO_STATUS: u16 = 1005;
const CLIENT_CLOSED: &str = "client closed";

/// Lifecycle of a log stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// Never connected
    Idle,
    /// Handshake in progress
    Connecting,
    /// Receiving messages
    Open,
    /// Terminal until the caller connects again
    Closed { code: u16, reason: String },
}

impl StreamState {
    pub fn is_open(&self) -> bool {
        matches!(self, StreamState::Open)
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, StreamState::Closed { .. })
    }
}

/// Transition events fed into the state machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Opened,
    Message(String),
    Closed { code: u16, reason: String },
    Error(String),
}

struct StreamInner {
    config: ClientConfig,
    session: Session,
    structured: FilterPolicy,
    raw: FilterPolicy,
    sink: Mutex<Box<dyn LogSink>>,
    state: watch::Sender<StreamState>,
    state_rx: watch::Receiver<StreamState>,

    // Token the current socket authenticated with
    token: Mutex<Option<String>>,

    // Stops the reader task of the current socket, or the pending handshake
    control: Mutex<Control>,

    // Serializes connect attempts so only one socket is ever opened
    connect_lock: tokio::sync::Mutex<()>,
}

#[derive(Default)]
struct Control {
    shutdown: Option<oneshot::Sender<()>>,
    // Set by close() while the handshake is still running
    close_requested: bool,
}

/// Consumer of the server's live log broadcast
///
/// Cheaply cloneable; clones drive the same socket and sink.
#[derive(Clone)]
pub struct LogStream {
    inner: Arc<StreamInner>,
}

impl LogStream {
    /// Create a stream with the default structured filter policy
    pub fn new(config: ClientConfig, session: Session, sink: impl LogSink + 'static) -> Self {
        Self::with_filter(config, session, sink, FilterPolicy::structured())
    }

    /// Create a stream with a custom policy for structured entries
    pub fn with_filter(
        config: ClientConfig,
        session: Session,
        sink: impl LogSink + 'static,
        structured: FilterPolicy,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(StreamState::Idle);

        Self {
            inner: Arc::new(StreamInner {
                config,
                session,
                structured,
                raw: FilterPolicy::raw_noise(),
                sink: Mutex::new(Box::new(sink)),
                state: state_tx,
                state_rx,
                token: Mutex::new(None),
                control: Mutex::new(Control::default()),
                connect_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> StreamState {
        self.inner.state_rx.borrow().clone()
    }

    /// Receiver for state changes
    pub fn state_receiver(&self) -> watch::Receiver<StreamState> {
        self.inner.state_rx.clone()
    }

    /// Open the socket.
    ///
    /// No-op while a socket is connecting or open. Without a session token
    /// nothing is attempted: the sink gets [`Notice::MustAuthenticate`], the
    /// session signals redirect-to-login and `MissingToken` is returned.
    pub async fn connect(&self) -> Result<()> {
        let _guard = self.inner.connect_lock.lock().await;

        match self.state() {
            StreamState::Open | StreamState::Connecting => {
                debug!("Log stream already connected");
                return Ok(());
            }
            StreamState::Idle | StreamState::Closed { .. } => {}
        }

        let token = match self.inner.session.require_token() {
            Ok(token) => token,
            Err(e) => {
                self.inner.sink.lock().notice(Notice::MustAuthenticate);
                return Err(e);
            }
        };
        let url = self.inner.config.log_stream_url(&token)?;

        *self.inner.token.lock() = Some(token);
        self.inner.control.lock().close_requested = false;
        self.inner.set_state(StreamState::Connecting);
        debug!("Connecting to {}", self.inner.config.log_path);

        let mut ws = match timeout(self.inner.config.connect_timeout, connect_async(url.as_str())).await
        {
            Ok(Ok((ws, _response))) => ws,
            Ok(Err(tungstenite::Error::Http(response)))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                self.handle(StreamEvent::Closed {
                    code: POLICY_VIOLATION,
                    reason: format!("handshake rejected with {}", response.status()),
                });
                return Err(ClientError::SessionExpired);
            }
            Ok(Err(e)) => return Err(self.fail_connect(e.to_string())),
            Err(_) => {
                return Err(self.fail_connect(format!(
                    "connection timeout after {:?}",
                    self.inner.config.connect_timeout
                )))
            }
        };

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let close_requested = {
            let mut control = self.inner.control.lock();
            if control.close_requested {
                control.close_requested = false;
                true
            } else {
                control.shutdown = Some(shutdown_tx);
                false
            }
        };

        if close_requested {
            debug!("Close requested during handshake");
            if let Err(e) = ws.close(Some(client_close_frame())).await {
                debug!("Close handshake failed: {}", e);
            }
            self.handle(StreamEvent::Closed {
                code: NORMAL_CLOSURE,
                reason: CLIENT_CLOSED.to_string(),
            });
            return Ok(());
        }

        self.handle(StreamEvent::Opened);

        let stream = self.clone();
        tokio::spawn(async move {
            stream.read_loop(ws, shutdown_rx).await;
        });

        Ok(())
    }

    /// Close the socket from this side. Does not reconnect.
    ///
    /// While the handshake is running the close is recorded and applied as
    /// soon as the socket opens, so the stream never reaches Open.
    pub async fn close(&self) -> Result<()> {
        let wait = {
            let mut control = self.inner.control.lock();
            match control.shutdown.take() {
                // Fails when the reader already ended
                Some(tx) => tx.send(()).is_ok(),
                None if self.state() == StreamState::Connecting => {
                    control.close_requested = true;
                    true
                }
                None => false,
            }
        };
        if wait {
            self.closed().await;
        }
        Ok(())
    }

    /// Wait until the stream is closed and return the final state.
    ///
    /// Returns immediately for a stream that was never connected.
    pub async fn closed(&self) -> StreamState {
        let mut rx = self.inner.state_rx.clone();
        loop {
            {
                let state = rx.borrow_and_update();
                if matches!(*state, StreamState::Idle | StreamState::Closed { .. }) {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }

    /// Apply one event to the state machine.
    ///
    /// Sink updates happen before the state is published, so a caller that
    /// observes a new state also observes its rendering.
    pub fn handle(&self, event: StreamEvent) {
        let state = self.state();

        match event {
            StreamEvent::Opened => {
                if state != StreamState::Connecting {
                    warn!("Ignoring open event in state {:?}", state);
                    return;
                }
                self.inner.sink.lock().clear();
                self.inner.set_state(StreamState::Open);
                info!("Log stream open");
            }

            StreamEvent::Message(frame) => {
                if !state.is_open() {
                    debug!("Dropping message received while {:?}", state);
                    return;
                }
                if let Some(line) = render_frame(&self.inner.structured, &self.inner.raw, &frame) {
                    let mut sink = self.inner.sink.lock();
                    sink.append(line);
                    sink.scroll_to_end();
                }
            }

            StreamEvent::Error(message) => {
                if !matches!(state, StreamState::Connecting | StreamState::Open) {
                    return;
                }
                warn!("Log stream error: {}", message);
                self.inner.sink.lock().notice(Notice::TransportError(message));
            }

            StreamEvent::Closed { code, reason } => {
                if !matches!(state, StreamState::Connecting | StreamState::Open) {
                    return;
                }
                let token = self.inner.token.lock().take();

                if code == POLICY_VIOLATION {
                    warn!("Log stream rejected the session token");
                    self.inner.sink.lock().notice(Notice::AuthenticationFailed);
                    if let Some(token) = token {
                        self.inner.session.expire(&token);
                    }
                } else {
                    info!(code, reason = %reason, "Log stream closed");
                    self.inner.sink.lock().notice(Notice::ConnectionClosed {
                        code,
                        reason: reason.clone(),
                    });
                }

                self.inner.control.lock().shutdown = None;
                self.inner.set_state(StreamState::Closed { code, reason });
            }
        }
    }

    fn fail_connect(&self, message: String) -> ClientError {
        self.handle(StreamEvent::Error(message.clone()));
        self.handle(StreamEvent::Closed {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
        });
        ClientError::Transport(message)
    }

    async fn read_loop(self, mut ws: WsStream, mut shutdown_rx: oneshot::Receiver<()>) {
        let closed = loop {
            tokio::select! {
                frame = ws.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        self.handle(StreamEvent::Message(text.to_string()));
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break match frame {
                            Some(frame) => StreamEvent::Closed {
                                code: u16::from(frame.code),
                                reason: frame.reason.to_string(),
                            },
                            None => StreamEvent::Closed {
                                code: NO_STATUS,
                                reason: String::new(),
                            },
                        };
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("Ignoring {} byte binary frame", data.len());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        self.handle(StreamEvent::Error(e.to_string()));
                        break StreamEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                        };
                    }
                    None => {
                        break StreamEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: String::new(),
                        };
                    }
                },

                _ = &mut shutdown_rx => {
                    if let Err(e) = ws.close(Some(client_close_frame())).await {
                        debug!("Close handshake failed: {}", e);
                    }
                    break StreamEvent::Closed {
                        code: NORMAL_CLOSURE,
                        reason: CLIENT_CLOSED.to_string(),
                    };
                }
            }
        };

        self.handle(closed);
    }
}

fn client_close_frame() -> CloseFrame<'static> {
    CloseFrame {
        code: CloseCode::Normal,
        reason: CLIENT_CLOSED.into(),
    }
}

impl StreamInner {
    fn set_state(&self, state: StreamState) {
        let _ = self.state.send(state);
    }
}

/// Turn one text frame into a display line, or `None` if it is filtered out
fn render_frame(structured: &FilterPolicy, raw: &FilterPolicy, frame: &str) -> Option<DisplayLine> {
    match LogEntry::parse(frame) {
        Ok(entry) => {
            let text = structured.apply(&entry.message)?;
            Some(DisplayLine::Entry { entry, text })
        }
        Err(e) => {
            let text = raw.apply(frame)?;
            debug!("Showing unparsed log frame: {}", e);
            Some(DisplayLine::Raw(text))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{MemoryTokenStore, SessionEvent};
    use crate::sink::MemorySink;

    fn stream_with_token(token: Option<&str>) -> (LogStream, MemorySink, Session) {
        let store = match token {
            Some(t) => MemoryTokenStore::with_token(t),
            None => MemoryTokenStore::new(),
        };
        let session = Session::new(store);
        let sink = MemorySink::new();
        let stream = LogStream::new(
            ClientConfig::new("http://127.0.0.1:9"),
            session.clone(),
            sink.clone(),
        );
        (stream, sink, session)
    }

    // Drive the machine to Open without a socket
    fn open(stream: &LogStream, token: &str) {
        *stream.inner.token.lock() = Some(token.to_string());
        stream.inner.set_state(StreamState::Connecting);
        stream.handle(StreamEvent::Opened);
    }

    fn msg(json: &str) -> StreamEvent {
        StreamEvent::Message(json.to_string())
    }

    #[test]
    fn test_initial_state() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        assert_eq!(stream.state(), StreamState::Idle);
        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_render_strips_prefix() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        stream.handle(msg(
            r#"{"message":"2025-08-21 19:33:27,308 - backend.main - INFO - Hello"}"#,
        ));

        assert_eq!(sink.texts(), vec!["Hello"]);
        assert_eq!(sink.scroll_position(), Some(0));
    }

    #[test]
    fn test_render_drops_ignored() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        stream.handle(msg(r#"{"message":"系统日志广播任务已启动。"}"#));

        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_render_raw_and_noise() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        stream.handle(msg("INFO:     connection open"));
        stream.handle(msg("plain text line"));

        assert_eq!(
            sink.lines(),
            vec![DisplayLine::Raw("plain text line".to_string())]
        );
    }

    #[test]
    fn test_render_keeps_order() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        for i in 0..20 {
            stream.handle(msg(&format!(r#"{{"message":"line {}"}}"#, i)));
        }

        let expected: Vec<String> = (0..20).map(|i| format!("line {}", i)).collect();
        assert_eq!(sink.texts(), expected);
        assert_eq!(sink.scroll_position(), Some(19));
    }

    #[test]
    fn test_open_clears_view() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");
        stream.handle(msg(r#"{"message":"first"}"#));
        stream.handle(StreamEvent::Closed {
            code: 1000,
            reason: String::new(),
        });

        open(&stream, "tok");
        assert!(sink.lines().is_empty());
        assert_eq!(sink.clears(), 2);
    }

    #[test]
    fn test_messages_before_open_are_dropped() {
        let (stream, sink, _) = stream_with_token(Some("tok"));

        stream.handle(msg(r#"{"message":"too early"}"#));
        stream.inner.set_state(StreamState::Connecting);
        stream.handle(msg(r#"{"message":"still early"}"#));
        stream.handle(StreamEvent::Opened);
        stream.handle(msg(r#"{"message":"on time"}"#));

        assert_eq!(sink.texts(), vec!["on time"]);
    }

    #[test]
    fn test_messages_after_close_are_dropped() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");
        stream.handle(StreamEvent::Closed {
            code: 1000,
            reason: String::new(),
        });
        stream.handle(msg(r#"{"message":"late"}"#));

        assert!(sink.lines().is_empty());
    }

    #[test]
    fn test_close_1008_expires_session() {
        let (stream, sink, session) = stream_with_token(Some("tok"));
        let mut events = session.subscribe();
        open(&stream, "tok");

        stream.handle(StreamEvent::Closed {
            code: POLICY_VIOLATION,
            reason: "bad token".to_string(),
        });

        assert_eq!(sink.notices(), vec![Notice::AuthenticationFailed]);
        assert_eq!(session.token(), None);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::RedirectToLogin);
        assert!(stream.state().is_closed());
    }

    #[test]
    fn test_other_close_is_neutral() {
        let (stream, sink, session) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        stream.handle(StreamEvent::Closed {
            code: 1001,
            reason: "going away".to_string(),
        });

        assert_eq!(
            sink.notices(),
            vec![Notice::ConnectionClosed {
                code: 1001,
                reason: "going away".to_string()
            }]
        );
        assert_eq!(session.token().as_deref(), Some("tok"));
        assert_eq!(
            stream.state(),
            StreamState::Closed {
                code: 1001,
                reason: "going away".to_string()
            }
        );
    }

    #[test]
    fn test_error_shows_notice() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        stream.handle(StreamEvent::Error("reset by peer".to_string()));

        assert_eq!(
            sink.notices(),
            vec![Notice::TransportError("reset by peer".to_string())]
        );
        assert!(stream.state().is_open());
    }

    #[test]
    fn test_second_close_is_ignored() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        stream.handle(StreamEvent::Closed {
            code: 1000,
            reason: String::new(),
        });
        stream.handle(StreamEvent::Closed {
            code: POLICY_VIOLATION,
            reason: String::new(),
        });

        assert_eq!(sink.notices().len(), 1);
    }

    #[test]
    fn test_custom_filter_policy() {
        let session = Session::new(MemoryTokenStore::with_token("tok"));
        let sink = MemorySink::new();
        let stream = LogStream::with_filter(
            ClientConfig::new("http://127.0.0.1:9"),
            session,
            sink.clone(),
            FilterPolicy::with_run_tag("Scheduler").unwrap(),
        );
        open(&stream, "tok");

        stream.handle(msg(r#"{"message":"[Scheduler] tick"}"#));

        assert_eq!(sink.texts(), vec!["tick"]);
    }

    #[tokio::test]
    async fn test_connect_without_token() {
        let (stream, sink, session) = stream_with_token(None);
        let mut events = session.subscribe();

        let result = stream.connect().await;

        assert!(matches!(result, Err(ClientError::MissingToken)));
        assert_eq!(sink.notices(), vec![Notice::MustAuthenticate]);
        assert_eq!(events.try_recv().unwrap(), SessionEvent::RedirectToLogin);
        assert_eq!(stream.state(), StreamState::Idle);
    }

    #[tokio::test]
    async fn test_connect_when_open_is_noop() {
        let (stream, sink, _) = stream_with_token(Some("tok"));
        open(&stream, "tok");

        // Port 9 is never reached: an open stream does not reconnect
        stream.connect().await.unwrap();

        assert!(stream.state().is_open());
        assert_eq!(sink.clears(), 1);
    }

    #[tokio::test]
    async fn test_connect_refused_reports_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let session = Session::new(MemoryTokenStore::with_token("tok"));
        let sink = MemorySink::new();
        let stream = LogStream::new(
            ClientConfig::new(format!("http://{}", addr)),
            session.clone(),
            sink.clone(),
        );

        let result = stream.connect().await;

        assert!(matches!(result, Err(ClientError::Transport(_))));
        let notices = sink.notices();
        assert!(matches!(notices[0], Notice::TransportError(_)));
        assert_eq!(
            notices[1],
            Notice::ConnectionClosed {
                code: ABNORMAL_CLOSURE,
                reason: String::new()
            }
        );
        assert!(stream.state().is_closed());
        assert_eq!(session.token().as_deref(), Some("tok"));
    }

    #[tokio::test]
    async fn test_closed_on_idle_returns_immediately() {
        let (stream, _, _) = stream_with_token(Some("tok"));
        assert_eq!(stream.closed().await, StreamState::Idle);
    }

    #[tokio::test]
    async fn test_close_during_handshake_is_recorded() {
        let (stream, _, _) = stream_with_token(Some("tok"));
        stream.inner.set_state(StreamState::Connecting);

        let closer = stream.clone();
        let pending = tokio::spawn(async move { closer.close().await });
        for _ in 0..100 {
            if stream.inner.control.lock().close_requested {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(stream.inner.control.lock().close_requested);
        assert!(!pending.is_finished());

        // The handshake ends; close() returns once the stream is closed
        stream.handle(StreamEvent::Closed {
            code: NORMAL_CLOSURE,
            reason: CLIENT_CLOSED.to_string(),
        });
        pending.await.unwrap().unwrap();
        assert!(stream.state().is_closed());
    }

    #[tokio::test]
    async fn test_close_when_not_connected() {
        let (stream, _, _) = stream_with_token(Some("tok"));
        assert!(stream.close().await.is_ok());
        assert_eq!(stream.state(), StreamState::Idle);
    }
}
