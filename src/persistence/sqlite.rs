use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use super::{NewTask, PersistenceError, PersistencePort, TaskPatch};
use crate::models::{ActivityEntry, Attachment, ReorderItem, Task, TaskCategory, TaskStatus};

const SELECT_TASKS: &str = r#"
    SELECT id, user_id, title, description, due_date, status, category,
        sort_order, attachments, activity_log, created_at, updated_at
    FROM tasks
"#;

pub struct SqlitePersistence {
    db: SqlitePool,
}

impl SqlitePersistence {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn migrate(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.db)
            .await
            .map_err(|e| PersistenceError::Database(e.into()))
    }
}

#[derive(Debug, FromRow)]
struct TaskRow {
    id: String,
    user_id: String,
    title: String,
    description: String,
    due_date: Option<String>,
    status: String,
    category: String,
    sort_order: i64,
    attachments: String,
    activity_log: String,
    created_at: String,
    updated_at: String,
}

impl TaskRow {
    fn into_task(self) -> Result<Task, PersistenceError> {
        let status = TaskStatus::parse(&self.status)
            .ok_or_else(|| PersistenceError::Decode(format!("unknown status {}", self.status)))?;
        let category = TaskCategory::parse(&self.category)
            .ok_or_else(|| PersistenceError::Decode(format!("unknown category {}", self.category)))?;
        let due_date = self
            .due_date
            .as_deref()
            .map(|raw| {
                NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                    .map_err(|e| PersistenceError::Decode(format!("due_date {}: {}", raw, e)))
            })
            .transpose()?;

        Ok(Task {
            id: self.id,
            user_id: self.user_id,
            title: self.title,
            description: self.description,
            due_date,
            status,
            category,
            order: self.sort_order,
            attachments: from_json::<Vec<Attachment>>(&self.attachments)?,
            activity_log: from_json::<Vec<ActivityEntry>>(&self.activity_log)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

fn from_json<T: serde::de::DeserializeOwned>(raw: &str) -> Result<T, PersistenceError> {
    serde_json::from_str(raw).map_err(|e| PersistenceError::Decode(e.to_string()))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, PersistenceError> {
    serde_json::to_string(value).map_err(|e| PersistenceError::Decode(e.to_string()))
}

fn parse_timestamp(ts: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Decode(format!("timestamp {}: {}", ts, e)))
}

/// `activity_log` with `count` entries appended, bound from `?first` onwards.
fn append_activity_sql(count: usize, first: usize) -> String {
    if count == 0 {
        return "activity_log".to_string();
    }
    let pairs: Vec<String> = (first..first + count)
        .map(|n| format!("'$[#]', json(?{})", n))
        .collect();
    format!("json_insert(activity_log, {})", pairs.join(", "))
}

fn format_date(date: Option<NaiveDate>) -> Option<String> {
    date.map(|d| d.format("%Y-%m-%d").to_string())
}

#[async_trait]
impl PersistencePort for SqlitePersistence {
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, PersistenceError> {
        let rows = sqlx::query_as::<_, TaskRow>(&format!(
            "{} WHERE user_id = ? ORDER BY sort_order DESC, id DESC",
            SELECT_TASKS
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        rows.into_iter().map(TaskRow::into_task).collect()
    }

    async fn create(&self, user_id: &str, task: NewTask) -> Result<String, PersistenceError> {
        let id = Uuid::new_v4().to_string();

        sqlx::query(
            r#"
            INSERT INTO tasks
                (id, user_id, title, description, due_date, status, category,
                sort_order, attachments, activity_log, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(&id)
        .bind(user_id)
        .bind(&task.title)
        .bind(&task.description)
        .bind(format_date(task.due_date))
        .bind(task.status.as_str())
        .bind(task.category.as_str())
        .bind(task.order)
        .bind(to_json(&task.attachments)?)
        .bind(to_json(&task.activity_log)?)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .execute(&self.db)
        .await?;

        Ok(id)
    }

    async fn update(&self, user_id: &str, id: &str, patch: &TaskPatch) -> Result<(), PersistenceError> {
        // One statement, so concurrent patches never lose each other's log entries.
        let sql = format!(
            r#"
            UPDATE tasks
            SET title = COALESCE(?1, title),
                description = COALESCE(?2, description),
                due_date = CASE WHEN ?3 THEN ?4 ELSE due_date END,
                status = COALESCE(?5, status),
                category = COALESCE(?6, category),
                sort_order = COALESCE(?7, sort_order),
                attachments = COALESCE(?8, attachments),
                activity_log = {},
                updated_at = ?9
            WHERE id = ?10 AND user_id = ?11
            "#,
            append_activity_sql(patch.append_activity.len(), 12)
        );

        let mut query = sqlx::query(&sql)
            .bind(patch.title.as_deref())
            .bind(patch.description.as_deref())
            .bind(patch.due_date.is_some())
            .bind(format_date(patch.due_date.flatten()))
            .bind(patch.status.map(|s| s.as_str()))
            .bind(patch.category.map(|c| c.as_str()))
            .bind(patch.order)
            .bind(patch.attachments.as_ref().map(to_json).transpose()?)
            .bind(patch.updated_at.to_rfc3339())
            .bind(id)
            .bind(user_id);
        for entry in &patch.append_activity {
            query = query.bind(to_json(entry)?);
        }

        let result = query.execute(&self.db).await?.rows_affected();

        if result == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), PersistenceError> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await?
            .rows_affected();

        if result == 0 {
            return Err(PersistenceError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn batch_reorder(
        &self,
        user_id: &str,
        items: &[ReorderItem],
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        let now = updated_at.to_rfc3339();
        let mut tx = self.db.begin().await?;

        for item in items {
            let result = sqlx::query(
                r#"
                UPDATE tasks
                SET sort_order = ?1,
                    status = COALESCE(?2, status),
                    updated_at = ?3
                WHERE id = ?4 AND user_id = ?5
                "#,
            )
            .bind(item.order)
            .bind(item.status.map(|s| s.as_str()))
            .bind(&now)
            .bind(&item.id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if result == 0 {
                // Dropping the transaction rolls back the earlier rows.
                return Err(PersistenceError::NotFound(item.id.clone()));
            }
        }

        tx.commit().await?;
        Ok(())
    }
}
