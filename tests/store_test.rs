use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskboard::error::AppError;
use taskboard::models::{NewTaskRequest, ReorderItem, Task, TaskStatus, UpdateTaskRequest};
use taskboard::persistence::{
    MemoryPersistence, NewTask, PersistenceError, PersistencePort, TaskPatch,
};
use taskboard::reorder::{MoveEvent, TaskPosition};
use taskboard::services::{UsageCounters, UsageRecorder, UsageSnapshot};
use taskboard::store::TaskStore;

/// Memory backend that records every call and can be told to fail.
#[derive(Default)]
struct RecordingPort {
    inner: MemoryPersistence,
    calls: Mutex<Vec<String>>,
    fail_delete_of: Mutex<Option<String>>,
    fail_reorder: AtomicBool,
    fail_list: AtomicBool,
}

impl RecordingPort {
    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PersistencePort for RecordingPort {
    async fn list(&self, user_id: &str) -> Result<Vec<Task>, PersistenceError> {
        self.record(format!("list {}", user_id));
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("unavailable".to_string()));
        }
        self.inner.list(user_id).await
    }

    async fn create(&self, user_id: &str, task: NewTask) -> Result<String, PersistenceError> {
        self.record(format!("create {}", task.title));
        self.inner.create(user_id, task).await
    }

    async fn update(&self, user_id: &str, id: &str, patch: &TaskPatch) -> Result<(), PersistenceError> {
        self.record(format!("update {}", id));
        self.inner.update(user_id, id, patch).await
    }

    async fn delete(&self, user_id: &str, id: &str) -> Result<(), PersistenceError> {
        self.record(format!("delete {}", id));
        if self.fail_delete_of.lock().unwrap().as_deref() == Some(id) {
            return Err(PersistenceError::Backend("permission denied".to_string()));
        }
        self.inner.delete(user_id, id).await
    }

    async fn batch_reorder(
        &self,
        user_id: &str,
        items: &[ReorderItem],
        updated_at: DateTime<Utc>,
    ) -> Result<(), PersistenceError> {
        self.record(format!("batch_reorder {}", items.len()));
        if self.fail_reorder.load(Ordering::SeqCst) {
            return Err(PersistenceError::Backend("batch rejected".to_string()));
        }
        self.inner.batch_reorder(user_id, items, updated_at).await
    }
}

fn setup() -> (Arc<RecordingPort>, Arc<UsageCounters>, TaskStore) {
    let port = Arc::new(RecordingPort::default());
    let usage = Arc::new(UsageCounters::new());
    let store = TaskStore::new("alice", port.clone(), usage.clone());
    (port, usage, store)
}

fn request(title: &str, status: TaskStatus) -> NewTaskRequest {
    NewTaskRequest {
        title: title.to_string(),
        status,
        ..Default::default()
    }
}

fn titles_in(store: &TaskStore, status: TaskStatus) -> Vec<(String, i64)> {
    store
        .tasks()
        .iter()
        .filter(|t| t.status == status)
        .map(|t| (t.title.clone(), t.order))
        .collect()
}

fn id_of(store: &TaskStore, title: &str) -> String {
    store.tasks().iter().find(|t| t.title == title).unwrap().id.clone()
}

#[tokio::test]
async fn empty_title_is_rejected_before_any_backend_call() {
    let (port, _, mut store) = setup();

    for title in ["", "   "] {
        let err = store.create(request(title, TaskStatus::Todo)).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
    assert!(port.calls().is_empty());
}

#[tokio::test]
async fn create_appends_to_the_end_of_its_partition() {
    let (_, _, mut store) = setup();
    store.load().await.unwrap();

    store.create(request("a", TaskStatus::Todo)).await.unwrap();
    store.create(request("b", TaskStatus::Todo)).await.unwrap();
    let c = store.create(request("c", TaskStatus::InProgress)).await.unwrap();

    assert_eq!(
        titles_in(&store, TaskStatus::Todo),
        vec![("a".to_string(), 0), ("b".to_string(), 1)]
    );
    assert_eq!(c.order, 0);
    assert!(c.activity_log.is_empty());
}

#[tokio::test]
async fn load_returns_tasks_in_ascending_order() {
    let (port, _, mut store) = setup();
    for (title, order) in [("third", 2), ("first", 0), ("second", 1)] {
        store
            .create(NewTaskRequest {
                title: title.to_string(),
                order: Some(order),
                ..Default::default()
            })
            .await
            .unwrap();
    }

    let mut fresh = TaskStore::new("alice", port.clone(), Arc::new(UsageCounters::new()));
    fresh.load().await.unwrap();
    let titles: Vec<&str> = fresh.tasks().iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["first", "second", "third"]);
}

#[tokio::test]
async fn load_failure_is_a_load_error() {
    let (port, _, mut store) = setup();
    port.fail_list.store(true, Ordering::SeqCst);

    let err = store.load().await.unwrap_err();
    assert!(matches!(err, AppError::Load(_)));
}

#[tokio::test]
async fn bulk_remove_stops_at_first_failure_and_keeps_earlier_deletes() {
    let (port, _, mut store) = setup();
    for title in ["a", "b", "c"] {
        store.create(request(title, TaskStatus::Todo)).await.unwrap();
    }
    let ids: Vec<String> = ["a", "b", "c"].iter().map(|t| id_of(&store, t)).collect();
    *port.fail_delete_of.lock().unwrap() = Some(ids[1].clone());

    let err = store.bulk_remove(&ids).await.unwrap_err();
    match err {
        AppError::PartialBulk { completed, failed_id, .. } => {
            assert_eq!(completed, 1);
            assert_eq!(failed_id, ids[1]);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let deletes: Vec<String> = port.calls().into_iter().filter(|c| c.starts_with("delete")).collect();
    assert_eq!(deletes, vec![format!("delete {}", ids[0]), format!("delete {}", ids[1])]);

    let remaining = port.inner.list("alice").await.unwrap();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|t| t.id != ids[0]));
}

#[tokio::test]
async fn bulk_remove_issues_one_delete_per_id() {
    let (port, usage, mut store) = setup();
    for title in ["a", "b", "c"] {
        store.create(request(title, TaskStatus::Todo)).await.unwrap();
    }
    let ids: Vec<String> = store.tasks().iter().map(|t| t.id.clone()).collect();

    assert_eq!(store.bulk_remove(&ids).await.unwrap(), 3);
    assert_eq!(port.calls().iter().filter(|c| c.starts_with("delete")).count(), 3);
    assert!(store.tasks().is_empty());
    assert_eq!(usage.snapshot().deletes, 3);
}

#[tokio::test]
async fn bulk_status_updates_every_selected_task() {
    let (port, _, mut store) = setup();
    for title in ["a", "b"] {
        store.create(request(title, TaskStatus::Todo)).await.unwrap();
    }
    let ids: Vec<String> = store.tasks().iter().map(|t| t.id.clone()).collect();

    store.bulk_set_status(&ids, TaskStatus::Completed).await.unwrap();

    let stored = port.inner.list("alice").await.unwrap();
    assert!(stored.iter().all(|t| t.is_completed()));
    assert!(store.tasks().iter().all(|t| t.status == TaskStatus::Completed));
}

#[tokio::test]
async fn move_within_partition_persists_renumbered_orders() {
    let (port, _, mut store) = setup();
    for title in ["a", "b", "c"] {
        store.create(request(title, TaskStatus::Todo)).await.unwrap();
    }
    let a = id_of(&store, "a");

    let writes = store
        .move_task(&MoveEvent {
            task_id: a.clone(),
            source: TaskPosition { status: TaskStatus::Todo, index: 0 },
            destination: TaskPosition { status: TaskStatus::Todo, index: 2 },
        })
        .await
        .unwrap();
    assert_eq!(writes.len(), 3);

    let mut fresh = TaskStore::new("alice", port.clone(), Arc::new(UsageCounters::new()));
    fresh.load().await.unwrap();
    assert_eq!(
        titles_in(&fresh, TaskStatus::Todo),
        vec![("b".to_string(), 0), ("c".to_string(), 1), ("a".to_string(), 2)]
    );
    assert_eq!(titles_in(&store, TaskStatus::Todo), titles_in(&fresh, TaskStatus::Todo));
}

#[tokio::test]
async fn move_to_the_same_slot_makes_no_backend_call() {
    let (port, _, mut store) = setup();
    let a = store.create(request("a", TaskStatus::Todo)).await.unwrap();

    let writes = store
        .move_task(&MoveEvent {
            task_id: a.id,
            source: TaskPosition { status: TaskStatus::Todo, index: 0 },
            destination: TaskPosition { status: TaskStatus::Todo, index: 0 },
        })
        .await
        .unwrap();

    assert!(writes.is_empty());
    assert!(!port.calls().iter().any(|c| c.starts_with("batch_reorder")));
}

#[tokio::test]
async fn failed_move_reloads_authoritative_state() {
    let (port, _, mut store) = setup();
    for title in ["a", "b"] {
        store.create(request(title, TaskStatus::Todo)).await.unwrap();
    }
    let a = id_of(&store, "a");
    port.fail_reorder.store(true, Ordering::SeqCst);

    let err = store
        .move_task(&MoveEvent {
            task_id: a,
            source: TaskPosition { status: TaskStatus::Todo, index: 0 },
            destination: TaskPosition { status: TaskStatus::InProgress, index: 0 },
        })
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Persistence(_)));
    assert_eq!(port.calls().last().map(String::as_str), Some("list alice"));
    assert_eq!(
        titles_in(&store, TaskStatus::Todo),
        vec![("a".to_string(), 0), ("b".to_string(), 1)]
    );
    assert!(titles_in(&store, TaskStatus::InProgress).is_empty());
}

#[tokio::test]
async fn moving_an_unknown_task_is_not_found() {
    let (_, _, mut store) = setup();
    store.load().await.unwrap();

    let err = store
        .move_task(&MoveEvent {
            task_id: "ghost".to_string(),
            source: TaskPosition { status: TaskStatus::Todo, index: 0 },
            destination: TaskPosition { status: TaskStatus::Completed, index: 0 },
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn update_of_missing_task_surfaces_not_found() {
    let (_, _, mut store) = setup();
    let err = store
        .update_fields("missing", UpdateTaskRequest {
            title: Some("x".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(id) if id == "missing"));
}

#[tokio::test]
async fn update_merges_fields_and_appends_activity() {
    let (port, _, mut store) = setup();
    let task = store.create(request("Read Book", TaskStatus::Todo)).await.unwrap();

    let updated = store
        .update_fields(&task.id, UpdateTaskRequest {
            title: Some("  Read Two Books ".to_string()),
            status: Some(TaskStatus::InProgress),
            ..Default::default()
        })
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.title, "Read Two Books");
    assert_eq!(updated.status, TaskStatus::InProgress);
    assert!(updated.updated_at >= task.updated_at);
    let actions: Vec<&str> = updated.activity_log.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, vec!["Updated task title", "Changed status to IN-PROGRESS"]);

    let stored = port.inner.list("alice").await.unwrap();
    assert_eq!(stored[0].activity_log.len(), 2);
}

#[tokio::test]
async fn update_with_blank_title_is_rejected() {
    let (port, _, mut store) = setup();
    let task = store.create(request("a", TaskStatus::Todo)).await.unwrap();
    let before = port.calls().len();

    let err = store
        .update_fields(&task.id, UpdateTaskRequest {
            title: Some(" ".to_string()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert_eq!(port.calls().len(), before);
}

#[tokio::test]
async fn completion_toggle_drives_status() {
    let (_, _, mut store) = setup();
    let task = store.create(request("a", TaskStatus::InProgress)).await.unwrap();

    let done = store.set_completed(&task.id, true).await.unwrap().unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert!(done.is_completed());

    let reopened = store.set_completed(&task.id, false).await.unwrap().unwrap();
    assert_eq!(reopened.status, TaskStatus::Todo);
}

#[tokio::test]
async fn other_users_tasks_are_invisible() {
    let (port, _, mut alice) = setup();
    let task = alice.create(request("private", TaskStatus::Todo)).await.unwrap();

    let mut bob = TaskStore::new("bob", port.clone(), Arc::new(UsageCounters::new()));
    bob.load().await.unwrap();
    assert!(bob.tasks().is_empty());

    let err = bob.remove(&task.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert_eq!(port.inner.list("alice").await.unwrap().len(), 1);
}

#[tokio::test]
async fn usage_is_recorded_per_backend_operation() {
    let (_, usage, mut store) = setup();
    store.seed_samples().await.unwrap();
    store.load().await.unwrap();

    assert_eq!(
        usage.snapshot(),
        UsageSnapshot {
            reads: 6,
            writes: 6,
            deletes: 0
        }
    );
    assert_eq!(titles_in(&store, TaskStatus::Todo).len(), 3);
}
