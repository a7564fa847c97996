use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};

use super::{
    error::ApiError,
    models::{ClearCompletedResponse, HealthResponse, ListQuery, TaskSummary, TaskView},
    state::AppState,
    utils::{read_body, require_json},
};
use crate::export::ExportOptions;
use crate::task::TaskSpec;

/// Create a task (POST /tasks)
///
/// Body is a JSON task spec; gzip bodies are decompressed by middleware
/// before the size limit applies. Returns 201 with the new task.
pub async fn create_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    require_json(&headers)?;
    let bytes = read_body(body, state.max_payload_bytes()).await?;
    let spec: TaskSpec = serde_json::from_slice(&bytes)?;

    let task = state.scheduler.create_task(spec).await?;
    Ok((StatusCode::CREATED, Json(TaskView::from(&task))))
}

/// List tasks newest first (GET /tasks?status=all|downloaded|downloading|failed|pending)
pub async fn list_tasks(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Json<Vec<TaskSummary>> {
    let tasks = state.scheduler.list_by_status(query.status).await;
    Json(tasks.iter().map(TaskSummary::from).collect())
}

/// GET /tasks/{id}
pub async fn get_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state.scheduler.get_task(&id).await?;
    Ok(Json(TaskView::from(&task)))
}

/// DELETE /tasks/{id}
pub async fn delete_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.scheduler.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state.scheduler.start(&id).await?;
    Ok(Json(TaskView::from(&task)))
}

pub async fn resume_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state.scheduler.resume(&id).await?;
    Ok(Json(TaskView::from(&task)))
}

pub async fn pause_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state.scheduler.pause(&id).await?;
    Ok(Json(TaskView::from(&task)))
}

pub async fn cancel_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state.scheduler.cancel(&id).await?;
    Ok(Json(TaskView::from(&task)))
}

/// Reset one failed chapter (POST /tasks/{id}/chapters/{index}/retry)
pub async fn retry_chapter(
    State(state): State<AppState>,
    Path((id, index)): Path<(String, usize)>,
) -> Result<Json<TaskView>, ApiError> {
    let task = state.scheduler.retry_chapter(&id, index).await?;
    Ok(Json(TaskView::from(&task)))
}

/// Export a task (POST /tasks/{id}/export)
///
/// An empty body exports plain text and requires every chapter to be completed.
pub async fn export_task(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<impl IntoResponse, ApiError> {
    let bytes = read_body(body, state.max_payload_bytes()).await?;
    let options = if bytes.is_empty() {
        ExportOptions::default()
    } else {
        require_json(&headers)?;
        serde_json::from_slice(&bytes)?
    };

    let handle = state.scheduler.export(&id, options).await?;
    Ok((StatusCode::CREATED, Json(handle)))
}

/// GET /stats
pub async fn stats(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.scheduler.stats().await)
}

/// POST /tasks/clear-completed
pub async fn clear_completed(State(state): State<AppState>) -> Json<ClearCompletedResponse> {
    let removed = state.scheduler.clear_completed().await;
    Json(ClearCompletedResponse { removed })
}

/// Health check endpoint (GET /health)
///
/// Reports the active and queued tasks and the scheduler counters.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_task: state.scheduler.active_task(),
        queued_tasks: state.scheduler.queued_tasks(),
        metrics: state.scheduler.metrics(),
    })
}
