//! Wire types for the log broadcast stream and the REST API

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};

/// One log record pushed by the server
///
/// Only `message` is required; the server fills the rest when it knows them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub level: String,
    pub message: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
}

impl LogEntry {
    /// Parse a text frame as a structured entry
    pub fn parse(frame: &str) -> Result<Self> {
        serde_json::from_str(frame).map_err(|e| ClientError::MalformedMessage(e.to_string()))
    }
}

/// Response of `POST /api/users/token`
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// The logged-in system user
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SystemUser {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub is_approved: Option<bool>,
}

impl SystemUser {
    pub fn is_admin(&self) -> bool {
        self.username == "admin"
    }
}

/// A learning task under one credential
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Task {
    pub id: i64,
    pub task_name: String,
    #[serde(default)]
    pub current_progress: Option<String>,
    #[serde(default)]
    pub study_hours: Option<String>,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub last_watched_video_index: Option<i64>,
    #[serde(default)]
    pub videos: Vec<Video>,
}

/// A video inside a task
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Video {
    pub id: i64,
    pub video_title: String,
    #[serde(default)]
    pub current_progress_seconds: f64,
    #[serde(default)]
    pub total_duration_seconds: f64,
    #[serde(default)]
    pub is_completed: bool,
}

/// Generic `{ "message": ... }` acknowledgement
#[derive(Debug, Clone, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Error body returned by the API
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ErrorBody {
    /// Best human-readable description, `detail` first
    pub fn describe(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => self.message.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_entry_full() {
        let json = r#"{"timestamp":"2025-08-21 19:33:27","level":"INFO","message":"hi","user_id":3,"username":"alice","ip_address":"10.0.0.1"}"#;
        let entry = LogEntry::parse(json).unwrap();
        assert_eq!(entry.timestamp, "2025-08-21 19:33:27");
        assert_eq!(entry.level, "INFO");
        assert_eq!(entry.message, "hi");
        assert_eq!(entry.user_id, Some(3));
        assert_eq!(entry.username.as_deref(), Some("alice"));
        assert_eq!(entry.ip_address.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_log_entry_message_only() {
        let entry = LogEntry::parse(r#"{"message":"hi"}"#).unwrap();
        assert_eq!(entry.message, "hi");
        assert!(entry.level.is_empty());
        assert_eq!(entry.user_id, None);
    }

    #[test]
    fn test_log_entry_nulls() {
        let json = r#"{"timestamp":"t","level":"INFO","message":"m","user_id":null,"username":null,"ip_address":null}"#;
        let entry = LogEntry::parse(json).unwrap();
        assert_eq!(entry.username, None);
    }

    #[test]
    fn test_log_entry_not_json() {
        let err = LogEntry::parse("INFO:     connection open").unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));
    }

    #[test]
    fn test_log_entry_missing_message() {
        let err = LogEntry::parse(r#"{"level":"INFO"}"#).unwrap_err();
        assert!(matches!(err, ClientError::MalformedMessage(_)));
    }

    #[test]
    fn test_task_deserialization() {
        let json = r#"{"id":1,"task_name":"Safety","current_progress":"50%","study_hours":"3小时","is_completed":false,"videos":[{"id":7,"video_title":"Intro","current_progress_seconds":30,"total_duration_seconds":120,"is_completed":false}]}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.task_name, "Safety");
        assert_eq!(task.videos.len(), 1);
        assert_eq!(task.videos[0].total_duration_seconds, 120.0);
    }

    #[test]
    fn test_error_body_describe() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail":"用户名或密码错误"}"#).unwrap();
        assert_eq!(body.describe().as_deref(), Some("用户名或密码错误"));

        let body: ErrorBody = serde_json::from_str(r#"{"message":"nope"}"#).unwrap();
        assert_eq!(body.describe().as_deref(), Some("nope"));

        let body: ErrorBody = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(body.describe(), None);
    }

    #[test]
    fn test_admin_user() {
        let user: SystemUser = serde_json::from_str(r#"{"id":1,"username":"admin"}"#).unwrap();
        assert!(user.is_admin());
    }
}
