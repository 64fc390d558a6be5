use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, error, info, warn};

use crate::error::AppError;
use crate::models::{
    ActivityEntry, NewTaskRequest, ReorderItem, Task, TaskCategory, TaskStatus, UpdateTaskRequest,
    display_cmp,
};
use crate::persistence::{NewTask, PersistencePort, TaskPatch};
use crate::reorder::{MoveEvent, Reordered, reorder};
use crate::services::UsageRecorder;

/// One user's tasks, held in display order, with every write going through
/// the persistence port.
pub struct TaskStore {
    user_id: String,
    tasks: Vec<Task>,
    port: Arc<dyn PersistencePort>,
    usage: Arc<dyn UsageRecorder>,
}

impl TaskStore {
    pub fn new(
        user_id: impl Into<String>,
        port: Arc<dyn PersistencePort>,
        usage: Arc<dyn UsageRecorder>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            tasks: Vec::new(),
            port,
            usage,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Replaces the in-memory state with the backend's.
    pub async fn load(&mut self) -> Result<(), AppError> {
        let mut tasks = self.port.list(&self.user_id).await.map_err(AppError::Load)?;
        self.usage.record_reads(tasks.len() as u64);

        // order desc / id desc, reversed
        tasks.sort_by(|a, b| display_cmp(b, a));
        tasks.reverse();

        debug!("loaded {} tasks for {}", tasks.len(), self.user_id);
        self.tasks = tasks;
        Ok(())
    }

    fn sort_for_display(&mut self) {
        self.tasks.sort_by(display_cmp);
    }

    fn next_order(&self, status: TaskStatus) -> i64 {
        self.tasks
            .iter()
            .filter(|t| t.status == status)
            .map(|t| t.order)
            .max()
            .map_or(0, |highest| highest + 1)
    }

    pub async fn create(&mut self, req: NewTaskRequest) -> Result<Task, AppError> {
        let title = req.title.trim();
        if title.is_empty() {
            return Err(AppError::Validation("Title is required".to_string()));
        }

        let now = Utc::now();
        let new_task = NewTask {
            title: title.to_string(),
            description: req.description,
            due_date: req.due_date,
            status: req.status,
            category: req.category,
            order: req.order.unwrap_or_else(|| self.next_order(req.status)),
            attachments: req.attachments,
            activity_log: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        let id = self.port.create(&self.user_id, new_task.clone()).await?;
        self.usage.record_writes(1);

        let task = new_task.into_task(id, self.user_id.clone());
        info!("created task {} ({}) in {}", task.id, task.title, task.status.as_str());
        self.tasks.push(task.clone());
        self.sort_for_display();
        Ok(task)
    }

    /// Returns the merged record when it was loaded, `None` when only the
    /// backend held it.
    pub async fn update_fields(
        &mut self,
        id: &str,
        req: UpdateTaskRequest,
    ) -> Result<Option<Task>, AppError> {
        if let Some(title) = &req.title {
            if title.trim().is_empty() {
                return Err(AppError::Validation("Title is required".to_string()));
            }
        }

        let now = Utc::now();
        let append_activity = describe_changes(self.get(id), &req, now);
        let patch = TaskPatch {
            title: req.title.map(|t| t.trim().to_string()),
            description: req.description,
            due_date: req.due_date,
            status: req.status,
            category: req.category,
            order: None,
            attachments: req.attachments,
            append_activity,
            updated_at: now,
        };

        self.port.update(&self.user_id, id, &patch).await?;
        self.usage.record_writes(1);
        debug!("updated task {} ({} activity entries)", id, patch.append_activity.len());

        Ok(self.apply_local(id, &patch))
    }

    fn apply_local(&mut self, id: &str, patch: &TaskPatch) -> Option<Task> {
        let task = self.tasks.iter_mut().find(|t| t.id == id)?;
        patch.apply_to(task);
        let updated = task.clone();
        self.sort_for_display();
        Some(updated)
    }

    pub async fn set_status(&mut self, id: &str, status: TaskStatus) -> Result<Option<Task>, AppError> {
        let patch = TaskPatch::status(Utc::now(), status);
        self.port.update(&self.user_id, id, &patch).await?;
        self.usage.record_writes(1);
        debug!("task {} -> {}", id, status.as_str());
        Ok(self.apply_local(id, &patch))
    }

    /// Checking a task completes it; unchecking sends it back to To-Do.
    pub async fn set_completed(&mut self, id: &str, completed: bool) -> Result<Option<Task>, AppError> {
        let status = if completed { TaskStatus::Completed } else { TaskStatus::Todo };
        self.set_status(id, status).await
    }

    pub async fn remove(&mut self, id: &str) -> Result<(), AppError> {
        self.port.delete(&self.user_id, id).await?;
        self.usage.record_deletes(1);
        self.tasks.retain(|t| t.id != id);
        info!("deleted task {}", id);
        Ok(())
    }

    /// Sequential and non-transactional: items before a failure stay applied.
    pub async fn bulk_set_status(&mut self, ids: &[String], status: TaskStatus) -> Result<usize, AppError> {
        for (done, id) in ids.iter().enumerate() {
            if let Err(e) = self.set_status(id, status).await {
                warn!("bulk status update stopped at {} after {} item(s): {}", id, done, e);
                return Err(AppError::PartialBulk {
                    completed: done,
                    failed_id: id.clone(),
                    source: Box::new(e),
                });
            }
        }
        Ok(ids.len())
    }

    pub async fn bulk_remove(&mut self, ids: &[String]) -> Result<usize, AppError> {
        for (done, id) in ids.iter().enumerate() {
            if let Err(e) = self.remove(id).await {
                warn!("bulk delete stopped at {} after {} item(s): {}", id, done, e);
                return Err(AppError::PartialBulk {
                    completed: done,
                    failed_id: id.clone(),
                    source: Box::new(e),
                });
            }
        }
        Ok(ids.len())
    }

    /// Applies a drag-and-drop move optimistically and persists its write-set
    /// in one batch. If the batch fails the store reloads from the backend.
    pub async fn move_task(&mut self, event: &MoveEvent) -> Result<Vec<ReorderItem>, AppError> {
        let Reordered { tasks, writes } = reorder(&self.tasks, event).map_err(|e| {
            if self.get(&event.task_id).is_none() {
                AppError::NotFound(event.task_id.clone())
            } else {
                AppError::Validation(e.to_string())
            }
        })?;
        if writes.is_empty() {
            return Ok(writes);
        }

        let now = Utc::now();
        self.tasks = tasks;
        for task in &mut self.tasks {
            if writes.iter().any(|w| w.id == task.id) {
                task.updated_at = now;
            }
        }
        self.sort_for_display();

        let persisted = self.port.batch_reorder(&self.user_id, &writes, now).await;
        if let Err(e) = persisted {
            warn!("reorder of {} failed, reloading: {}", event.task_id, e);
            if let Err(reload) = self.load().await {
                error!("reload after failed reorder also failed: {}", reload);
            }
            return Err(e.into());
        }
        self.usage.record_writes(writes.len() as u64);
        debug!("moved task {} with {} writes", event.task_id, writes.len());
        Ok(writes)
    }

    /// Creates the starter tasks shown to a new user.
    pub async fn seed_samples(&mut self) -> Result<Vec<Task>, AppError> {
        let samples = [
            ("Complete Project Documentation", (2024, 3, 15), TaskStatus::Todo, TaskCategory::Work),
            ("Gym Workout", (2024, 3, 10), TaskStatus::InProgress, TaskCategory::Personal),
            ("Team Meeting", (2024, 3, 12), TaskStatus::Todo, TaskCategory::Work),
            ("Grocery Shopping", (2024, 3, 11), TaskStatus::Completed, TaskCategory::Personal),
            ("Review Pull Requests", (2024, 3, 14), TaskStatus::InProgress, TaskCategory::Work),
            ("Read Book", (2024, 3, 13), TaskStatus::Todo, TaskCategory::Personal),
        ];

        let mut created = Vec::with_capacity(samples.len());
        for (title, (y, m, d), status, category) in samples {
            let task = self
                .create(NewTaskRequest {
                    title: title.to_string(),
                    due_date: NaiveDate::from_ymd_opt(y, m, d),
                    status,
                    category,
                    ..Default::default()
                })
                .await?;
            created.push(task);
        }
        Ok(created)
    }
}

/// Activity entries for an edit, compared against the loaded record when there is one.
fn describe_changes(current: Option<&Task>, req: &UpdateTaskRequest, at: DateTime<Utc>) -> Vec<ActivityEntry> {
    let mut entries = Vec::new();
    let changed = |differs: bool| current.is_none() || differs;

    if let Some(title) = &req.title {
        if changed(current.is_some_and(|t| t.title != title.trim())) {
            entries.push(ActivityEntry::new("Updated task title", at));
        }
    }
    if let Some(description) = &req.description {
        if changed(current.is_some_and(|t| &t.description != description)) {
            entries.push(ActivityEntry::new("Changed description", at));
        }
    }
    if let Some(category) = req.category {
        if changed(current.is_some_and(|t| t.category != category)) {
            entries.push(ActivityEntry::new(format!("Changed category to {}", category.as_str()), at));
        }
    }
    if let Some(due_date) = req.due_date {
        if changed(current.is_some_and(|t| t.due_date != due_date)) {
            entries.push(ActivityEntry::new("Updated due date", at));
        }
    }
    if let Some(status) = req.status {
        if changed(current.is_some_and(|t| t.status != status)) {
            entries.push(ActivityEntry::new(format!("Changed status to {}", status.as_str()), at));
        }
    }
    if let Some(attachments) = &req.attachments {
        let previous = current.map(|t| t.attachments.as_slice()).unwrap_or(&[]);
        let added = attachments.iter().filter(|a| !previous.contains(a)).count();
        if added > 0 {
            entries.push(ActivityEntry::new(format!("Added {} file(s)", added), at));
        }
        for removed in previous.iter().filter(|a| !attachments.contains(a)) {
            entries.push(ActivityEntry::new(format!("Removed file: {}", removed.name), at));
        }
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Attachment;

    fn loaded() -> Task {
        let now = Utc::now();
        Task {
            id: "t1".to_string(),
            user_id: "u1".to_string(),
            title: "Read Book".to_string(),
            description: String::new(),
            due_date: None,
            status: TaskStatus::Todo,
            category: TaskCategory::Personal,
            order: 0,
            attachments: vec![Attachment {
                name: "old.txt".to_string(),
                mime_type: "text/plain".to_string(),
                size: 3,
                last_modified: 0,
                path: "old.txt".to_string(),
                uploaded_at: now,
            }],
            activity_log: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn actions(entries: &[ActivityEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.action.as_str()).collect()
    }

    #[test]
    fn unchanged_fields_are_not_logged() {
        let task = loaded();
        let req = UpdateTaskRequest {
            title: Some("Read Book".to_string()),
            status: Some(TaskStatus::InProgress),
            category: Some(TaskCategory::Personal),
            ..Default::default()
        };
        let entries = describe_changes(Some(&task), &req, Utc::now());
        assert_eq!(actions(&entries), vec!["Changed status to IN-PROGRESS"]);
    }

    #[test]
    fn attachment_changes_are_diffed() {
        let task = loaded();
        let mut new_file = task.attachments[0].clone();
        new_file.name = "new.txt".to_string();
        let req = UpdateTaskRequest {
            attachments: Some(vec![new_file]),
            ..Default::default()
        };
        let entries = describe_changes(Some(&task), &req, Utc::now());
        assert_eq!(actions(&entries), vec!["Added 1 file(s)", "Removed file: old.txt"]);
    }

    #[test]
    fn unloaded_task_logs_every_requested_change() {
        let req = UpdateTaskRequest {
            title: Some("x".to_string()),
            due_date: Some(None),
            ..Default::default()
        };
        let entries = describe_changes(None, &req, Utc::now());
        assert_eq!(actions(&entries), vec!["Updated task title", "Updated due date"]);
    }
}
