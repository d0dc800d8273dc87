use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use seatkeeper_core::scheduler::TaskStore;
use seatkeeper_core::task::{NewTask, Task, TaskPatch};
use seatkeeper_core::SeatError;
use std::sync::Arc;

use crate::error::AppError;
use crate::state::AppState;

/// Run a blocking store operation off the async runtime.
async fn blocking<T, F>(store: Arc<dyn TaskStore>, f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce(&dyn TaskStore) -> seatkeeper_core::Result<T> + Send + 'static,
{
    let result = tokio::task::spawn_blocking(move || f(store.as_ref()))
        .await
        .map_err(|e| AppError(anyhow::anyhow!("task join error: {e}")))??;
    Ok(result)
}

/// Load task `id`, treating another user's task as missing.
fn owned_task(store: &dyn TaskStore, user: &str, id: u64) -> seatkeeper_core::Result<Task> {
    let task = store.get_task(id)?;
    if task.user != user {
        return Err(SeatError::TaskNotFound(id));
    }
    Ok(task)
}

/// GET /api/accounts/{user}/tasks
pub async fn list_tasks(
    State(app): State<AppState>,
    Path(user): Path<String>,
) -> Result<Json<Vec<Task>>, AppError> {
    app.account(&user)?;
    let tasks = blocking(app.store.clone(), move |s| s.tasks_for(&user)).await?;
    Ok(Json(tasks))
}

/// POST /api/accounts/{user}/tasks: the owner is always the path user.
pub async fn create_task(
    State(app): State<AppState>,
    Path(user): Path<String>,
    Json(mut body): Json<NewTask>,
) -> Result<(StatusCode, Json<Task>), AppError> {
    app.account(&user)?;
    body.user = user;
    let task = blocking(app.store.clone(), move |s| s.create_task(body)).await?;
    tracing::info!(task_id = task.id, user = %task.user, "task created");
    Ok((StatusCode::CREATED, Json(task)))
}

/// PUT /api/accounts/{user}/tasks/{id}
pub async fn update_task(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, u64)>,
    Json(patch): Json<TaskPatch>,
) -> Result<Json<Task>, AppError> {
    let task = blocking(app.store.clone(), move |s| {
        owned_task(s, &user, id)?;
        s.update_task(id, &patch)
    })
    .await?;
    Ok(Json(task))
}

/// DELETE /api/accounts/{user}/tasks/{id}
pub async fn delete_task(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, u64)>,
) -> Result<StatusCode, AppError> {
    blocking(app.store.clone(), move |s| {
        owned_task(s, &user, id)?;
        s.delete_task(id)
    })
    .await?;
    tracing::info!(task_id = id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/accounts/{user}/tasks/{id}/toggle
pub async fn toggle_task(
    State(app): State<AppState>,
    Path((user, id)): Path<(String, u64)>,
) -> Result<Json<Task>, AppError> {
    let task = blocking(app.store.clone(), move |s| {
        owned_task(s, &user, id)?;
        s.toggle_task(id)
    })
    .await?;
    Ok(Json(task))
}
