pub mod dto;

use std::collections::BTreeMap;
use std::env;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder, Response, StatusCode};

use self::dto::{ArrayValue, MapValue, Value};
use super::{NewTask, PersistenceError, PersistencePort, TaskPatch};
use crate::error::AppError;
use crate::models::{ActivityEntry, Attachment, ReorderItem, Task, TaskCategory, TaskStatus};

const FIRESTORE_API: &str = "https://firestore.googleapis.com/v1";
const TASKS_COLLECTION: &str = "tasks";

#[derive(Clone, Debug)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub database: String,
    pub access_token: String,
}

impl FirestoreConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        let project_id = env::var("FIRESTORE_PROJECT_ID")
            .map_err(|_| AppError::Config("FIRESTORE_PROJECT_ID is not set".to_string()))?;
        let access_token = env::var("FIRESTORE_ACCESS_TOKEN")
            .map_err(|_| AppError::Config("FIRESTORE_ACCESS_TOKEN is not set".to_string()))?;
        let database = env::var("FIRESTORE_DATABASE").unwrap_or_else(|_| "(default)".to_string());

        Ok(Self {
            project_id,
            database,
            access_token,
        })
    }

    fn database_path(&self) -> String {
        format!("projects/{}/databases/{}", self.project_id, self.database)
    }
}

/// Tasks live at `users/{uid}/tasks/{id}`, so the path itself scopes every call.
pub struct FirestorePersistence {
    client: Client,
    config: FirestoreConfig,
}

impl FirestorePersistence {
    pub fn new(config: FirestoreConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn user_path(&self, user_id: &str) -> String {
        format!("{}/documents/users/{}", self.config.database_path(), user_id)
    }

    fn task_name(&self, user_id: &str, id: &str) -> String {
        format!("{}/{}/{}", self.user_path(user_id), TASKS_COLLECTION, id)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.header("Authorization", format!("Bearer {}", self.config.access_token))
    }

    async fn commit(&self, writes: Vec<dto::Write>, context: &str) -> Result<(), PersistenceError> {
        let url = format!("{}/{}/documents:commit", FIRESTORE_API, self.config.database_path());
        let response = self
            .authorized(self.client.post(&url))
            .json(&dto::CommitRequest { writes })
            .send()
            .await?;

        check_response(response, Some(context)).await?;
        Ok(())
    }
}

/// `document` names the task a 404 refers to; collection-level calls pass
/// `None` so a missing project or database surfaces as a backend error.
async fn check_response(response: Response, document: Option<&str>) -> Result<Response, PersistenceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, body, document))
}

fn status_error(status: StatusCode, body: String, document: Option<&str>) -> PersistenceError {
    if let (StatusCode::NOT_FOUND, Some(id)) = (status, document) {
        return PersistenceError::NotFound(id.to_string());
    }

    let message = serde_json::from_str::<dto::ErrorResponse>(&body)
        .map(|e| format!("{} {}", e.error.status, e.error.message))
        .unwrap_or(body);
    PersistenceError::Backend(format!("Firestore error {}: {}", status, message))
}

fn string_value(value: impl Into<String>) -> Value {
    Value::StringValue(value.into())
}

fn integer_value(value: i64) -> Value {
    Value::IntegerValue(value.to_string())
}

fn timestamp_value(value: DateTime<Utc>) -> Value {
    Value::TimestampValue(value.to_rfc3339_opts(SecondsFormat::Micros, true))
}

fn due_date_value(value: Option<NaiveDate>) -> Value {
    match value {
        Some(date) => string_value(date.format("%Y-%m-%d").to_string()),
        None => Value::NullValue(()),
    }
}

fn map_value(fields: BTreeMap<String, Value>) -> Value {
    Value::MapValue(MapValue { fields })
}

fn attachment_value(attachment: &Attachment) -> Value {
    map_value(BTreeMap::from([
        ("name".to_string(), string_value(&attachment.name)),
        ("type".to_string(), string_value(&attachment.mime_type)),
        ("size".to_string(), integer_value(attachment.size as i64)),
        ("lastModified".to_string(), integer_value(attachment.last_modified)),
        ("path".to_string(), string_value(&attachment.path)),
        ("uploadedAt".to_string(), timestamp_value(attachment.uploaded_at)),
    ]))
}

fn activity_value(entry: &ActivityEntry) -> Value {
    map_value(BTreeMap::from([
        ("action".to_string(), string_value(&entry.action)),
        ("timestamp".to_string(), timestamp_value(entry.timestamp)),
    ]))
}

fn attachments_value(attachments: &[Attachment]) -> Value {
    Value::ArrayValue(ArrayValue {
        values: attachments.iter().map(attachment_value).collect(),
    })
}

pub(crate) fn new_task_fields(user_id: &str, task: &NewTask) -> BTreeMap<String, Value> {
    BTreeMap::from([
        ("title".to_string(), string_value(&task.title)),
        ("description".to_string(), string_value(&task.description)),
        ("dueDate".to_string(), due_date_value(task.due_date)),
        ("status".to_string(), string_value(task.status.as_str())),
        ("category".to_string(), string_value(task.category.as_str())),
        ("order".to_string(), integer_value(task.order)),
        ("userId".to_string(), string_value(user_id)),
        ("attachments".to_string(), attachments_value(&task.attachments)),
        (
            "activityLog".to_string(),
            Value::ArrayValue(ArrayValue {
                values: task.activity_log.iter().map(activity_value).collect(),
            }),
        ),
        ("createdAt".to_string(), timestamp_value(task.created_at)),
        ("updatedAt".to_string(), timestamp_value(task.updated_at)),
    ])
}

/// Fields and mask for a patch; the activity log is appended via a transform.
pub(crate) fn patch_write(name: String, patch: &TaskPatch) -> dto::Write {
    let mut fields = BTreeMap::new();
    if let Some(title) = &patch.title {
        fields.insert("title".to_string(), string_value(title));
    }
    if let Some(description) = &patch.description {
        fields.insert("description".to_string(), string_value(description));
    }
    if let Some(due_date) = patch.due_date {
        fields.insert("dueDate".to_string(), due_date_value(due_date));
    }
    if let Some(status) = patch.status {
        fields.insert("status".to_string(), string_value(status.as_str()));
    }
    if let Some(category) = patch.category {
        fields.insert("category".to_string(), string_value(category.as_str()));
    }
    if let Some(order) = patch.order {
        fields.insert("order".to_string(), integer_value(order));
    }
    if let Some(attachments) = &patch.attachments {
        fields.insert("attachments".to_string(), attachments_value(attachments));
    }
    fields.insert("updatedAt".to_string(), timestamp_value(patch.updated_at));

    let update_transforms = if patch.append_activity.is_empty() {
        Vec::new()
    } else {
        vec![dto::FieldTransform {
            field_path: "activityLog".to_string(),
            append_missing_elements: ArrayValue {
                values: patch.append_activity.iter().map(activity_value).collect(),
            },
        }]
    };

    dto::Write {
        update_mask: dto::DocumentMask {
            field_paths: fields.keys().cloned().collect(),
        },
        update: dto::Document {
            name,
            fields,
            ..Default::default()
        },
        update_transforms,
        current_document: dto::Precondition { exists: true },
    }
}

fn reorder_write(name: String, item: &ReorderItem, updated_at: DateTime<Utc>) -> dto::Write {
    let patch = TaskPatch {
        order: Some(item.order),
        status: item.status,
        ..TaskPatch::new(updated_at)
    };
    patch_write(name, &patch)
}

fn get_string(fields: &BTreeMap<String, Value>, key: &str) -> Result<String, PersistenceError> {
    match fields.get(key) {
        Some(Value::StringValue(s)) => Ok(s.clone()),
        _ => Err(PersistenceError::Decode(format!("missing string field: {}", key))),
    }
}

fn get_integer(fields: &BTreeMap<String, Value>, key: &str) -> Option<i64> {
    match fields.get(key)? {
        Value::IntegerValue(s) => s.parse().ok(),
        Value::DoubleValue(d) => Some(*d as i64),
        _ => None,
    }
}

fn get_timestamp(fields: &BTreeMap<String, Value>, key: &str) -> Option<DateTime<Utc>> {
    match fields.get(key)? {
        Value::TimestampValue(ts) | Value::StringValue(ts) => DateTime::parse_from_rfc3339(ts)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        _ => None,
    }
}

fn get_array<'a>(fields: &'a BTreeMap<String, Value>, key: &str) -> &'a [Value] {
    match fields.get(key) {
        Some(Value::ArrayValue(array)) => &array.values,
        _ => &[],
    }
}

fn parse_attachment(value: &Value) -> Option<Attachment> {
    let Value::MapValue(map) = value else {
        return None;
    };
    Some(Attachment {
        name: get_string(&map.fields, "name").ok()?,
        mime_type: get_string(&map.fields, "type").unwrap_or_default(),
        size: get_integer(&map.fields, "size").unwrap_or(0).max(0) as u64,
        last_modified: get_integer(&map.fields, "lastModified").unwrap_or(0),
        path: get_string(&map.fields, "path").unwrap_or_default(),
        uploaded_at: get_timestamp(&map.fields, "uploadedAt")?,
    })
}

fn parse_activity(value: &Value) -> Option<ActivityEntry> {
    let Value::MapValue(map) = value else {
        return None;
    };
    Some(ActivityEntry {
        action: get_string(&map.fields, "action").ok()?,
        timestamp: get_timestamp(&map.fields, "timestamp")?,
    })
}

pub(crate) fn task_from_document(user_id: &str, document: &dto::Document) -> Result<Task, PersistenceError> {
    let fields = &document.fields;
    let id = document
        .id()
        .ok_or_else(|| PersistenceError::Decode(format!("document without id: {}", document.name)))?;

    let status = get_string(fields, "status")?;
    let status = TaskStatus::parse(&status)
        .ok_or_else(|| PersistenceError::Decode(format!("unknown status {}", status)))?;
    let category = get_string(fields, "category")?;
    let category = TaskCategory::parse(&category)
        .ok_or_else(|| PersistenceError::Decode(format!("unknown category {}", category)))?;
    let due_date = get_string(fields, "dueDate")
        .ok()
        .and_then(|raw| crate::models::parse_calendar_date(&raw));

    let now = Utc::now();
    Ok(Task {
        id: id.to_string(),
        user_id: user_id.to_string(),
        title: get_string(fields, "title")?,
        description: get_string(fields, "description").unwrap_or_default(),
        due_date,
        status,
        category,
        order: get_integer(fields, "order").unwrap_or(0),
        attachments: get_array(fields, "attachments").iter().filter_map(parse_attachment).collect(),
        activity_log: get_array(fields, "activityLog").iter().filter_map(parse_activity).collect(),
        created_at: get_timestamp(fields, "createdAt").unwrap_or(now),
        updated_at: get_timestamp(fields, "updatedAt").unwrap_or(now),
    })
}

/// Every returned document must decode; one bad record fails the whole list.
pub(crate) fn tasks_from_query(
    user_id: &str,
    items: &[dto::RunQueryResponseItem],
) -> Result<Vec<Task>, PersistenceError> {
    items
        .iter()
        .filter_map(|item| item.document.as_ref())
        .map(|document| {
            task_from_document(user_id, document).map_err(|e| {
                tracing::error!("Failed to decode task document {}: {}", document.name, e);
                e
            })
        })
        .collect()
}

#[async_trait]
impl PersistencePort for FirestorePersistence {
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, PersistenceError> {
        let url = format!("{}/{}:runQuery", FIRESTORE_API, self.user_path(user_id));
        let request_body = dto::RunQueryRequest {
            structured_query: dto::StructuredQuery {
                from: vec![dto::CollectionSelector {
                    collection_id: TASKS_COLLECTION.to_string(),
                }],
            },
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&request_body)
            .send()
            .await?;
        let response = check_response(response, None).await?;
        let items: Vec<dto::RunQueryResponseItem> = response.json().await?;

        tasks_from_query(user_id, &items)
    }

    async fn create(&self, user_id: &str, task: NewTask) -> Result<String, PersistenceError> {
        let url = format!("{}/{}/{}", FIRESTORE_API, self.user_path(user_id), TASKS_COLLECTION);
        let request_body = dto::Document {
            fields: new_task_fields(user_id, &task),
            ..Default::default()
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&request_body)
            .send()
            .await?;
        let response = check_response(response, None).await?;
        let created: dto::Document = response.json().await?;

        created
            .id()
            .map(str::to_string)
            .ok_or_else(|| PersistenceError::Decode("created document has no name".to_string()))
    }

    async fn update(&self, user_id: &str, id: &str, patch: &TaskPatch) -> Result<(), PersistenceError> {
        let write = patch_write(self.task_name(user_id, id), patch);
        self.commit(vec![write], id).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), PersistenceError> {
        let url = format!(
            "{}/{}?currentDocument.exists=true",
            FIRESTORE_API,
            self.task_name(user_id, id)
        );
        let response = self.authorized(self.client.delete(&url)).send().await?;
        check_response(response, Some(id)).await?;
        Ok(())
    }

    async fn batch_reorder(
        &self,
        user_id: &str,
        items: &[ReorderItem],
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        if items.is_empty() {
            return Ok(());
        }
        let writes = items
            .iter()
            .map(|item| reorder_write(self.task_name(user_id, &item.id), item, updated_at))
            .collect();
        let context = items.iter().map(|item| item.id.as_str()).collect::<Vec<_>>().join(",");
        self.commit(writes, &context).await
    }
}
