use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Router,
};
use time::OffsetDateTime;
use tracing::{info, instrument};

use crate::{
    auth::extractors::SessionUser,
    error::{AppResult, Json, MessageBody},
    state::AppState,
    tasks::{
        dto::{CreateTaskRequest, RestoreRequest, RestoreResponse, UpdateTaskRequest},
        repo::TaskError,
        repo_types::{Task, TrashEntry},
    },
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/api/tasks", get(list_tasks).post(create_task))
        .route(
            "/api/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
        .route("/api/tasks/:id/toggle", put(toggle_task))
}

pub fn trash_routes() -> Router<AppState> {
    Router::new()
        .route("/api/trash", get(list_trash))
        .route("/api/trash/restore", post(restore_trash))
}

/// Ids that are not integers cannot name a task.
fn parse_id(raw: &str) -> Result<u64, TaskError> {
    raw.parse().map_err(|_| TaskError::NotFound)
}

#[instrument(skip(state))]
pub async fn list_tasks(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
) -> Json<Vec<Task>> {
    let tasks = state.store.read(|doc| doc.tasks(&username).to_vec()).await;
    Json(tasks)
}

#[instrument(skip(state))]
pub async fn get_task(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    let id = parse_id(&id)?;
    let task = state
        .store
        .read(|doc| doc.task(&username, id).cloned())
        .await
        .ok_or(TaskError::NotFound)?;
    Ok(Json(task))
}

#[instrument(skip(state, payload))]
pub async fn create_task(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
    Json(payload): Json<CreateTaskRequest>,
) -> AppResult<Json<Task>> {
    let now = OffsetDateTime::now_utc();
    let task = state
        .store
        .write(|doc| {
            doc.create_task(
                &username,
                payload.title.as_deref(),
                payload.description.as_deref(),
                now,
            )
        })
        .await?;
    info!(%username, task_id = task.id, "task created");
    Ok(Json(task))
}

#[instrument(skip(state, payload))]
pub async fn update_task(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTaskRequest>,
) -> AppResult<Json<Task>> {
    let id = parse_id(&id)?;
    let task = state
        .store
        .write(|doc| doc.update_task(&username, id, payload.into()))
        .await?;
    info!(%username, task_id = id, "task updated");
    Ok(Json(task))
}

#[instrument(skip(state))]
pub async fn toggle_task(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
    Path(id): Path<String>,
) -> AppResult<Json<Task>> {
    let id = parse_id(&id)?;
    let task = state
        .store
        .write(|doc| doc.toggle_task(&username, id))
        .await?;
    info!(%username, task_id = id, completed = task.completed, "task toggled");
    Ok(Json(task))
}

#[instrument(skip(state))]
pub async fn delete_task(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
    Path(id): Path<String>,
) -> AppResult<Json<MessageBody>> {
    let id = parse_id(&id)?;
    let now = OffsetDateTime::now_utc();
    state
        .store
        .write(|doc| doc.delete_task(&username, id, now))
        .await?;
    info!(%username, task_id = id, "task moved to trash");
    Ok(Json(MessageBody::new("Task moved to trash")))
}

#[instrument(skip(state))]
pub async fn list_trash(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
) -> AppResult<Json<Vec<TrashEntry>>> {
    let retention = state.config.trash_retention();
    let now = OffsetDateTime::now_utc();
    let (entries, purged) = state
        .store
        .write_if(|doc| {
            let purged = doc.sweep_trash(&username, retention, now);
            ((doc.trash(&username).to_vec(), purged), purged > 0)
        })
        .await?;
    if purged > 0 {
        info!(%username, purged, "expired trash purged");
    }
    Ok(Json(entries))
}

#[instrument(skip(state, payload))]
pub async fn restore_trash(
    State(state): State<AppState>,
    SessionUser(username): SessionUser,
    Json(payload): Json<RestoreRequest>,
) -> AppResult<Json<RestoreResponse>> {
    let ids = payload.task_ids()?;
    let retention = state.config.trash_retention();
    let now = OffsetDateTime::now_utc();
    let restored = state
        .store
        .write(|doc| {
            doc.sweep_trash(&username, retention, now);
            Ok::<_, TaskError>(doc.restore_tasks(&username, &ids))
        })
        .await?;
    info!(%username, restored = restored.len(), "tasks restored from trash");
    Ok(Json(RestoreResponse { restored }))
}
