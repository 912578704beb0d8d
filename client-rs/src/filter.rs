//! Declarative noise filtering and prefix stripping for log lines
//!
//! A [`FilterPolicy`] is an ordered list of `(pattern, action)` rules applied
//! to each message. `Drop` discards the whole message on the first match;
//! `Strip` removes the matched text and evaluation continues.

use once_cell::sync::Lazy;
use regex::Regex;

/// Housekeeping lines the backend emits about the log pipeline itself
pub const IGNORED_SUBSTRINGS: &[&str] = &[
    "系统日志 WebSocket",
    "日志广播任务已启动",
    "WebSocket连接已清理",
    "Application startup: Initializing database",
    "管理员用户 'admin' 已存在。",
    "INFO:     connection open",
    "INFO:     connection closed",
];

/// Uvicorn connection notices that arrive as bare text frames
pub const TRANSPORT_NOISE: &[&str] = &["INFO:     connection open", "INFO:     connection closed"];

/// Run tag used by the backend's watcher process
pub const DEFAULT_RUN_TAG: &str = "AutoWatcherRunner";

const TIMESTAMP_PREFIX: &str = r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3} - [a-zA-Z0-9._]+ - (?:INFO|WARNING|ERROR|DEBUG|CRITICAL) - ";

static TIMESTAMP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(TIMESTAMP_PREFIX).expect("timestamp prefix pattern is valid"));

static DEFAULT_RUN_TAG_RE: Lazy<Regex> = Lazy::new(|| {
    run_tag_regex(DEFAULT_RUN_TAG).expect("run tag pattern is valid")
});

fn run_tag_regex(component: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!(
        r"^\s*\[{}\](?:\[(?:User|用户) \d+\])?\s*",
        regex::escape(component)
    ))
}

/// What a rule looks for
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Plain substring anywhere in the text
    Contains(String),
    /// Regular expression; strip rules should anchor it with `^`
    Regex(Regex),
}

impl Pattern {
    fn find(&self, text: &str) -> Option<std::ops::Range<usize>> {
        match self {
            Pattern::Contains(needle) => text.find(needle.as_str()).map(|i| i..i + needle.len()),
            Pattern::Regex(re) => re.find(text).map(|m| m.range()),
        }
    }
}

/// What to do when a rule matches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Drop,
    Strip,
}

/// A single filtering rule
#[derive(Debug, Clone)]
pub struct Rule {
    pub pattern: Pattern,
    pub action: Action,
}

impl Rule {
    pub fn drop_containing(needle: impl Into<String>) -> Self {
        Self {
            pattern: Pattern::Contains(needle.into()),
            action: Action::Drop,
        }
    }

    pub fn strip(re: Regex) -> Self {
        Self {
            pattern: Pattern::Regex(re),
            action: Action::Strip,
        }
    }

    pub fn strip_regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::strip(Regex::new(pattern)?))
    }
}

/// Ordered rule list applied to every message
#[derive(Debug, Clone, Default)]
pub struct FilterPolicy {
    rules: Vec<Rule>,
}

impl FilterPolicy {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    /// Policy for structured entries: ignored substrings, then the
    /// timestamp/module/level prefix, then the default run tag
    pub fn structured() -> Self {
        Self::structured_with(DEFAULT_RUN_TAG_RE.clone())
    }

    /// Structured policy for a different run-tag component name
    pub fn with_run_tag(component: &str) -> Result<Self, regex::Error> {
        Ok(Self::structured_with(run_tag_regex(component)?))
    }

    fn structured_with(run_tag: Regex) -> Self {
        let mut rules: Vec<Rule> = IGNORED_SUBSTRINGS
            .iter()
            .map(|s| Rule::drop_containing(*s))
            .collect();
        rules.push(Rule::strip(TIMESTAMP_RE.clone()));
        rules.push(Rule::strip(run_tag));
        Self { rules }
    }

    /// Policy for payloads that are not JSON
    pub fn raw_noise() -> Self {
        Self {
            rules: TRANSPORT_NOISE
                .iter()
                .map(|s| Rule::drop_containing(*s))
                .collect(),
        }
    }

    /// Append a rule after the existing ones
    pub fn push(&mut self, rule: Rule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run the rules over `text`; `None` means the message is dropped
    pub fn apply(&self, text: &str) -> Option<String> {
        let mut out = text.to_string();
        for rule in &self.rules {
            let Some(range) = rule.pattern.find(&out) else {
                continue;
            };
            match rule.action {
                Action::Drop => return None,
                Action::Strip => out.replace_range(range, ""),
            }
        }
        Some(out.trim().to_string())
    }
}
