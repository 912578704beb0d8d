//! Terminal rendering of the live log stream

use autolearn_client::{DisplayLine, LogSink, Notice};
use std::io::{self, Stderr, Stdout, Write};
use tracing::warn;

/// How log lines are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayMode {
    /// One cleaned message per line
    Compact,
    /// Timestamp, level, message, user ID, username and IP columns
    Table,
}

const TABLE_HEADER: &str = "timestamp | level | message | user_id | username | ip_address";

/// Writes log lines to one stream and notices to another
pub struct TerminalSink<W: Write + Send, E: Write + Send> {
    out: W,
    err: E,
    mode: DisplayMode,
}

impl TerminalSink<Stdout, Stderr> {
    pub fn stdout(mode: DisplayMode) -> Self {
        Self::new(io::stdout(), io::stderr(), mode)
    }
}

impl<W: Write + Send, E: Write + Send> TerminalSink<W, E> {
    pub fn new(out: W, err: E, mode: DisplayMode) -> Self {
        Self { out, err, mode }
    }

    pub fn into_inner(self) -> (W, E) {
        (self.out, self.err)
    }

    fn format(&self, line: &DisplayLine) -> String {
        match (self.mode, line) {
            (DisplayMode::Compact, DisplayLine::Entry { text, .. }) => text.clone(),
            (DisplayMode::Compact, DisplayLine::Raw(raw)) => format!("[unparsed] {}", raw),
            (DisplayMode::Table, DisplayLine::Entry { entry, text }) => format!(
                "{} | {} | {} | {} | {} | {}",
                entry.timestamp,
                entry.level,
                text,
                entry.user_id.map(|id| id.to_string()).unwrap_or_default(),
                entry.username.as_deref().unwrap_or(""),
                entry.ip_address.as_deref().unwrap_or(""),
            ),
            (DisplayMode::Table, DisplayLine::Raw(raw)) => {
                format!(" |  | [unparsed] {} |  |  | ", raw)
            }
        }
    }
}

impl<W: Write + Send, E: Write + Send> LogSink for TerminalSink<W, E> {
    fn clear(&mut self) {
        if self.mode == DisplayMode::Table {
            if let Err(e) = writeln!(self.out, "{}", TABLE_HEADER) {
                warn!(error = %e, "Failed to write table header");
            }
        }
    }

    fn append(&mut self, line: DisplayLine) {
        let text = self.format(&line);
        if let Err(e) = writeln!(self.out, "{}", text) {
            warn!(error = %e, "Failed to write log line");
        }
    }

    fn scroll_to_end(&mut self) {
        let _ = self.out.flush();
    }

    fn notice(&mut self, notice: Notice) {
        let text = match notice {
            Notice::MustAuthenticate => "Not logged in. Run `autolearn login` first.".to_string(),
            Notice::AuthenticationFailed => {
                "Authentication failed, please log in again.".to_string()
            }
            Notice::ConnectionClosed { code, reason } if reason.is_empty() => {
                format!("Connection closed ({})", code)
            }
            Notice::ConnectionClosed { code, reason } => {
                format!("Connection closed ({}): {}", code, reason)
            }
            Notice::TransportError(message) => format!("Connection error: {}", message),
        };
        let _ = writeln!(self.err, "{}", text);
        let _ = self.err.flush();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autolearn_client::LogEntry;

    fn entry(text: &str) -> DisplayLine {
        DisplayLine::Entry {
            entry: LogEntry {
                timestamp: "2024-05-01 10:00:00".to_string(),
                level: "INFO".to_string(),
                message: format!("raw {}", text),
                user_id: Some(3),
                username: Some("alice".to_string()),
                ip_address: None,
            },
            text: text.to_string(),
        }
    }

    fn output(sink: TerminalSink<Vec<u8>, Vec<u8>>) -> (String, String) {
        let (out, err) = sink.into_inner();
        (
            String::from_utf8(out).unwrap(),
            String::from_utf8(err).unwrap(),
        )
    }

    #[test]
    fn test_compact_lines() {
        let mut sink = TerminalSink::new(Vec::new(), Vec::new(), DisplayMode::Compact);
        sink.clear();
        sink.append(entry("视频播放完成"));
        sink.append(DisplayLine::Raw("not json".to_string()));
        sink.scroll_to_end();

        let (out, err) = output(sink);
        assert_eq!(out, "视频播放完成\n[unparsed] not json\n");
        assert!(err.is_empty());
    }

    #[test]
    fn test_table_lines() {
        let mut sink = TerminalSink::new(Vec::new(), Vec::new(), DisplayMode::Table);
        sink.clear();
        sink.append(entry("done"));

        let (out, _) = output(sink);
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], TABLE_HEADER);
        assert_eq!(lines[1], "2024-05-01 10:00:00 | INFO | done | 3 | alice | ");
    }

    #[test]
    fn test_notices_go_to_stderr() {
        let mut sink = TerminalSink::new(Vec::new(), Vec::new(), DisplayMode::Compact);
        sink.notice(Notice::MustAuthenticate);
        sink.notice(Notice::AuthenticationFailed);
        sink.notice(Notice::ConnectionClosed {
            code: 1000,
            reason: "bye".to_string(),
        });
        sink.notice(Notice::ConnectionClosed {
            code: 1006,
            reason: String::new(),
        });
        sink.notice(Notice::TransportError("refused".to_string()));

        let (out, err) = output(sink);
        assert!(out.is_empty());
        assert_eq!(
            err.lines().collect::<Vec<_>>(),
            vec![
                "Not logged in. Run `autolearn login` first.",
                "Authentication failed, please log in again.",
                "Connection closed (1000): bye",
                "Connection closed (1006)",
                "Connection error: refused",
            ]
        );
    }
}
