use axum::extract::{Path, Query};
use axum::middleware;
use axum::routing::{patch, post};
use axum::{Extension, Json, Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthUser, require_user};
use crate::error::AppError;
use crate::filter::{BoardView, FilterCriteria, Section, board_view, filter_tasks};
use crate::models::*;
use crate::reorder::MoveEvent;
use crate::services::UsageSnapshot;
use crate::state::AppState;

#[derive(Deserialize)]
struct StatusRequest {
    status: TaskStatus,
}

#[derive(Deserialize)]
struct CompletedRequest {
    completed: bool,
}

#[derive(Deserialize)]
struct BulkStatusRequest {
    ids: Vec<String>,
    status: TaskStatus,
}

#[derive(Deserialize)]
struct BulkDeleteRequest {
    ids: Vec<String>,
}

#[derive(Debug, Serialize)]
struct BulkResponse {
    affected: usize,
}

#[derive(Debug, Serialize)]
struct MoveResponse {
    writes: Vec<ReorderItem>,
}

/// A task as returned to clients, with the derived completion flag.
#[derive(Debug, Serialize)]
pub struct TaskView {
    #[serde(flatten)]
    pub task: Task,
    pub completed: bool,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        let completed = task.is_completed();
        Self { task, completed }
    }
}

#[derive(Debug, Serialize)]
pub struct SectionView {
    pub status: TaskStatus,
    pub title: &'static str,
    pub count: usize,
    pub tasks: Vec<TaskView>,
}

impl From<Section> for SectionView {
    fn from(section: Section) -> Self {
        Self {
            status: section.status,
            title: section.title,
            count: section.count,
            tasks: section.tasks.into_iter().map(TaskView::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BoardResponse {
    pub todo: SectionView,
    pub in_progress: SectionView,
    pub completed: SectionView,
}

impl From<BoardView> for BoardResponse {
    fn from(board: BoardView) -> Self {
        Self {
            todo: board.todo.into(),
            in_progress: board.in_progress.into(),
            completed: board.completed.into(),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/me", get(me))
        .route("/usage", get(usage))
        .route("/tasks", get(list_tasks).post(create_task))
        .route("/tasks/board", get(board))
        .route("/tasks/samples", post(seed_samples))
        .route("/tasks/move", post(move_task))
        .route("/tasks/bulk/status", post(bulk_status))
        .route("/tasks/bulk/delete", post(bulk_delete))
        .route("/tasks/{id}", patch(update_task).delete(delete_task))
        .route("/tasks/{id}/status", patch(set_status))
        .route("/tasks/{id}/completed", patch(set_completed))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_user));

    Router::new()
        .route("/health", get(health))
        .merge(protected)
        .with_state(state)
}

async fn health() -> StatusCode {
    StatusCode::OK
}

async fn me(Extension(user): Extension<AuthUser>) -> Json<AuthUser> {
    Json(user)
}

async fn usage(State(state): State<AppState>) -> Json<UsageSnapshot> {
    Json(state.usage.snapshot())
}

async fn list_tasks(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(criteria): Query<FilterCriteria>,
) -> Result<Json<Vec<TaskView>>, AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let tasks = filter_tasks(store.tasks(), &criteria);
    Ok(Json(tasks.into_iter().map(TaskView::from).collect()))
}

async fn board(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(criteria): Query<FilterCriteria>,
) -> Result<Json<BoardResponse>, AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    Ok(Json(board_view(store.tasks(), &criteria).into()))
}

async fn create_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<NewTaskRequest>,
) -> Result<(StatusCode, Json<TaskView>), AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let task = store.create(req).await?;
    Ok((StatusCode::CREATED, Json(task.into())))
}

async fn seed_samples(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<(StatusCode, Json<Vec<TaskView>>), AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let tasks = store.seed_samples().await?;
    Ok((StatusCode::CREATED, Json(tasks.into_iter().map(TaskView::from).collect())))
}

async fn update_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<UpdateTaskRequest>,
) -> Result<Json<TaskView>, AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let task = store
        .update_fields(&id, req)
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(task.into()))
}

async fn set_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<StatusRequest>,
) -> Result<Json<TaskView>, AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let task = store
        .set_status(&id, req.status)
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(task.into()))
}

async fn set_completed(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(req): Json<CompletedRequest>,
) -> Result<Json<TaskView>, AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let task = store
        .set_completed(&id, req.completed)
        .await?
        .ok_or(AppError::NotFound(id))?;
    Ok(Json(task.into()))
}

async fn delete_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    let mut store = state.store_for(&user);
    store.remove(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn bulk_status(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<BulkStatusRequest>,
) -> Result<Json<BulkResponse>, AppError> {
    let mut store = state.store_for(&user);
    let affected = store.bulk_set_status(&req.ids, req.status).await?;
    Ok(Json(BulkResponse { affected }))
}

async fn bulk_delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(req): Json<BulkDeleteRequest>,
) -> Result<Json<BulkResponse>, AppError> {
    let mut store = state.store_for(&user);
    let affected = store.bulk_remove(&req.ids).await?;
    Ok(Json(BulkResponse { affected }))
}

async fn move_task(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(event): Json<MoveEvent>,
) -> Result<Json<MoveResponse>, AppError> {
    let mut store = state.store_for(&user);
    store.load().await?;
    let writes = store.move_task(&event).await?;
    Ok(Json(MoveResponse { writes }))
}
