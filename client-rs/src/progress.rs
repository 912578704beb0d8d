//! Progress summary for a credential's task list

use crate::messages::Task;
use std::fmt;

/// Completed/total counts with the study hours they add up to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Progress {
    pub completed: usize,
    pub total: usize,
    pub study_hours: u32,
}

impl Progress {
    pub fn new(completed: usize, total: usize) -> Self {
        Self {
            completed,
            total,
            study_hours: 0,
        }
    }

    /// Summarize a task list
    pub fn from_tasks(tasks: &[Task]) -> Self {
        Self {
            completed: tasks.iter().filter(|t| t.is_completed).count(),
            total: tasks.len(),
            study_hours: tasks
                .iter()
                .filter_map(|t| t.study_hours.as_deref())
                .map(parse_hours)
                .fold(0, u32::saturating_add),
        }
    }

    /// Percentage with two decimals, `0.00%` for an empty list
    pub fn percentage(&self) -> String {
        if self.total == 0 {
            return "0.00%".to_string();
        }
        format!("{:.2}%", self.completed as f64 / self.total as f64 * 100.0)
    }
}

impl fmt::Display for Progress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {} ({})", self.completed, self.total, self.percentage())
    }
}

/// Leading integer of a study-hours label such as "3小时"; 0 if absent
fn parse_hours(label: &str) -> u32 {
    let label = label.trim_start();
    let digits = label
        .char_indices()
        .take_while(|(_, c)| c.is_ascii_digit())
        .last()
        .map(|(i, c)| &label[..i + c.len_utf8()])
        .unwrap_or("");
    digits.parse().unwrap_or(0)
}
