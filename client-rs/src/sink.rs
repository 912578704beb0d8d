//! Rendering targets for the live log view

use crate::messages::LogEntry;

use parking_lot::Mutex;
use std::sync::Arc;

/// A line appended to the log view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayLine {
    /// Structured entry with its cleaned message text
    Entry { entry: LogEntry, text: String },
    /// Payload that was not valid JSON, shown as received
    Raw(String),
}

impl DisplayLine {
    /// Text shown in compact views
    pub fn text(&self) -> &str {
        match self {
            DisplayLine::Entry { text, .. } => text,
            DisplayLine::Raw(raw) => raw,
        }
    }
}

/// User-visible indicators that are not log lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// No token; the user has to log in before the stream can open
    MustAuthenticate,
    /// Server closed the socket with 1008
    AuthenticationFailed,
    /// Socket closed for any other reason
    ConnectionClosed { code: u16, reason: String },
    /// Transport-level failure
    TransportError(String),
}

/// Receives rendered output from a log stream
pub trait LogSink: Send {
    /// Reset the view when a connection opens
    fn clear(&mut self);

    /// Append one line at the end of the view
    fn append(&mut self, line: DisplayLine);

    /// Bring the newest line into view
    fn scroll_to_end(&mut self) {}

    /// Show an indicator
    fn notice(&mut self, notice: Notice);
}

#[derive(Debug, Default)]
struct MemoryView {
    lines: Vec<DisplayLine>,
    notices: Vec<Notice>,
    clears: usize,
    scroll: Option<usize>,
}

/// Sink that keeps everything in memory
///
/// Clones share the same view, so one handle can be given to a stream and
/// another kept for inspection.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    view: Arc<Mutex<MemoryView>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<DisplayLine> {
        self.view.lock().lines.clone()
    }

    /// Texts of all lines in display order
    pub fn texts(&self) -> Vec<String> {
        self.view
            .lock()
            .lines
            .iter()
            .map(|l| l.text().to_string())
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.view.lock().notices.clone()
    }

    /// How many times the view was cleared
    pub fn clears(&self) -> usize {
        self.view.lock().clears
    }

    /// Index of the line scrolled into view
    pub fn scroll_position(&self) -> Option<usize> {
        self.view.lock().scroll
    }
}

impl LogSink for MemorySink {
    fn clear(&mut self) {
        let mut view = self.view.lock();
        view.lines.clear();
        view.scroll = None;
        view.clears += 1;
    }

    fn append(&mut self, line: DisplayLine) {
        self.view.lock().lines.push(line);
    }

    fn scroll_to_end(&mut self) {
        let mut view = self.view.lock();
        view.scroll = view.lines.len().checked_sub(1);
    }

    fn notice(&mut self, notice: Notice) {
        self.view.lock().notices.push(notice);
    }
}
