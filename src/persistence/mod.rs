pub mod firestore;
pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use thiserror::Error;

use crate::models::{ActivityEntry, Attachment, ReorderItem, Task, TaskCategory, TaskStatus};

pub use firestore::{FirestoreConfig, FirestorePersistence};
pub use memory::MemoryPersistence;
pub use sqlite::SqlitePersistence;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("task {0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("backend rejected request: {0}")]
    Backend(String),

    #[error("failed to decode stored task: {0}")]
    Decode(String),
}

/// A task as handed to the backend, before it has an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub description: String,
    pub due_date: Option<NaiveDate>,
    pub status: TaskStatus,
    pub category: TaskCategory,
    pub order: i64,
    pub attachments: Vec<Attachment>,
    pub activity_log: Vec<ActivityEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NewTask {
    pub fn into_task(self, id: String, user_id: String) -> Task {
        Task {
            id,
            user_id,
            title: self.title,
            description: self.description,
            due_date: self.due_date,
            status: self.status,
            category: self.category,
            order: self.order,
            attachments: self.attachments,
            activity_log: self.activity_log,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Field changes for a single task. `None` leaves a field untouched;
/// `append_activity` is added to the end of the stored log.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_date: Option<Option<NaiveDate>>,
    pub status: Option<TaskStatus>,
    pub category: Option<TaskCategory>,
    pub order: Option<i64>,
    pub attachments: Option<Vec<Attachment>>,
    pub append_activity: Vec<ActivityEntry>,
    pub updated_at: DateTime<Utc>,
}

impl TaskPatch {
    pub fn new(updated_at: DateTime<Utc>) -> Self {
        Self {
            title: None,
            description: None,
            due_date: None,
            status: None,
            category: None,
            order: None,
            attachments: None,
            append_activity: Vec::new(),
            updated_at,
        }
    }

    pub fn status(updated_at: DateTime<Utc>, status: TaskStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::new(updated_at)
        }
    }

    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(status) = self.status {
            task.status = status;
        }
        if let Some(category) = self.category {
            task.category = category;
        }
        if let Some(order) = self.order {
            task.order = order;
        }
        if let Some(attachments) = &self.attachments {
            task.attachments = attachments.clone();
        }
        task.activity_log.extend(self.append_activity.iter().cloned());
        task.updated_at = self.updated_at;
    }
}

/// Durable storage for tasks. Every call is scoped to one user; an id that
/// belongs to someone else behaves exactly like a missing id.
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, PersistenceError>;

    async fn create(&self, user_id: &str, task: NewTask) -> Result<String, PersistenceError>;

    async fn update(&self, user_id: &str, id: &str, patch: &TaskPatch) -> Result<(), PersistenceError>;

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), PersistenceError>;

    /// Applies every item or none of them.
    async fn batch_reorder(
        &self,
        user_id: &str,
        items: &[ReorderItem],
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError>;
}
