use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{NewTask, PersistenceError, PersistencePort, TaskPatch};
use crate::models::{ReorderItem, Task};

/// Process-local backend, used for development and tests.
#[derive(Default)]
pub struct MemoryPersistence {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

fn owned_mut<'a>(
    tasks: &'a mut HashMap<String, Task>,
    user_id: &str,
    id: &str,
) -> Result<&'a mut Task, PersistenceError> {
    tasks
        .get_mut(id)
        .filter(|task| task.user_id == user_id)
        .ok_or_else(|| PersistenceError::NotFound(id.to_string()))
}

#[async_trait]
impl PersistencePort for MemoryPersistence {
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, PersistenceError> {
        let tasks = self.tasks.read().await;
        Ok(tasks
            .values()
            .filter(|task| task.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn create(&self, user_id: &str, task: NewTask) -> Result<String, PersistenceError> {
        let id = Uuid::new_v4().simple().to_string();
        let task = task.into_task(id.clone(), user_id.to_string());
        self.tasks.write().await.insert(id.clone(), task);
        Ok(id)
    }

    async fn update(&self, user_id: &str, id: &str, patch: &TaskPatch) -> Result<(), PersistenceError> {
        let mut tasks = self.tasks.write().await;
        let task = owned_mut(&mut tasks, user_id, id)?;
        patch.apply_to(task);
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), PersistenceError> {
        let mut tasks = self.tasks.write().await;
        owned_mut(&mut tasks, user_id, id)?;
        tasks.remove(id);
        Ok(())
    }

    async fn batch_reorder(
        &self,
        user_id: &str,
        items: &[ReorderItem],
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let mut tasks = self.tasks.write().await;
        // Validate the whole batch before touching anything.
        for item in items {
            owned_mut(&mut tasks, user_id, &item.id)?;
        }
        for item in items {
            let task = owned_mut(&mut tasks, user_id, &item.id)?;
            task.order = item.order;
            if let Some(status) = item.status {
                task.status = status;
            }
            task.updated_at = updated_at;
        }
        Ok(())
    }
}
