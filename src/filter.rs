//! Search and filter projections. Pure functions, no state.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::models::{Task, TaskStatus, display_cmp, task::deserialize_due_date};

pub const ALL_CATEGORIES: &str = "all";

fn all_categories() -> String {
    ALL_CATEGORIES.to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FilterCriteria {
    #[serde(default)]
    pub search: String,
    #[serde(default = "all_categories")]
    pub category: String,
    #[serde(default, deserialize_with = "deserialize_due_date")]
    pub due_date: Option<NaiveDate>,
}

impl Default for FilterCriteria {
    fn default() -> Self {
        Self {
            search: String::new(),
            category: all_categories(),
            due_date: None,
        }
    }
}

impl FilterCriteria {
    pub fn matches(&self, task: &Task) -> bool {
        self.matches_search(task) && self.matches_category(task) && self.matches_due_date(task)
    }

    fn matches_search(&self, task: &Task) -> bool {
        if self.search.is_empty() {
            return true;
        }
        let needle = self.search.to_lowercase();
        [
            task.title.as_str(),
            task.category.as_str(),
            task.status.as_str(),
            task.status.label(),
        ]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
    }

    fn matches_category(&self, task: &Task) -> bool {
        self.category.eq_ignore_ascii_case(ALL_CATEGORIES)
            || self.category.eq_ignore_ascii_case(task.category.as_str())
    }

    fn matches_due_date(&self, task: &Task) -> bool {
        match self.due_date {
            None => true,
            Some(wanted) => task.due_date == Some(wanted),
        }
    }
}

/// Tasks passing every predicate, in their input order.
pub fn filter_tasks(tasks: &[Task], criteria: &FilterCriteria) -> Vec<Task> {
    tasks.iter().filter(|t| criteria.matches(t)).cloned().collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct Section {
    pub status: TaskStatus,
    pub title: &'static str,
    /// Number of tasks left after filtering.
    pub count: usize,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub todo: Section,
    pub in_progress: Section,
    pub completed: Section,
}

/// Splits tasks into status partitions in display order and filters each one.
pub fn board_view(tasks: &[Task], criteria: &FilterCriteria) -> BoardView {
    let section = |status: TaskStatus| {
        let mut members: Vec<Task> = tasks.iter().filter(|t| t.status == status).cloned().collect();
        members.sort_by(display_cmp);
        let tasks = filter_tasks(&members, criteria);
        Section {
            status,
            title: status.label(),
            count: tasks.len(),
            tasks,
        }
    };

    BoardView {
        todo: section(TaskStatus::Todo),
        in_progress: section(TaskStatus::InProgress),
        completed: section(TaskStatus::Completed),
    }
}
