use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::app::manager::TaskManager;
use crate::app::model::{AnalysisRequest, Task, TaskStatus};

#[derive(Clone)]
struct AppState {
    manager: Arc<TaskManager>,
}

pub fn router(manager: Arc<TaskManager>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/v1/analyze", post(create_task))
        .route("/api/v1/tasks/:task_id", get(task_status))
        .route("/api/v1/tasks/:task_id/result", get(task_result))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { manager })
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
struct CreatedTask {
    task_id: String,
    status: TaskStatus,
    message: String,
    status_url: String,
}

/// A task without its (possibly large) result.
#[derive(Debug, Serialize)]
struct TaskView {
    task_id: String,
    status: TaskStatus,
    progress: u32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    finished_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result_url: Option<String>,
}

impl From<Task> for TaskView {
    fn from(task: Task) -> Self {
        let result_url = (task.status == TaskStatus::Completed)
            .then(|| format!("/api/v1/tasks/{}/result", task.task_id));
        Self {
            task_id: task.task_id,
            status: task.status,
            progress: task.progress,
            message: task.message,
            error: task.error,
            created_at: task.created_at,
            started_at: task.started_at,
            finished_at: task.finished_at,
            result_url,
        }
    }
}

async fn healthz(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "tasks": state.manager.task_count(),
    }))
}

async fn create_task(
    State(state): State<AppState>,
    payload: Result<Json<AnalysisRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => {
            return error(StatusCode::UNPROCESSABLE_ENTITY, rejection.body_text());
        }
    };

    match state.manager.create(request).await {
        Ok(task_id) => Json(CreatedTask {
            status_url: format!("/api/v1/tasks/{task_id}"),
            message: "analysis task created".to_string(),
            status: TaskStatus::Pending,
            task_id,
        })
        .into_response(),
        Err(err) => error(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()),
    }
}

async fn task_status(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.manager.get_status(&task_id) {
        Some(task) => Json(TaskView::from(task)).into_response(),
        None => error(StatusCode::NOT_FOUND, format!("task not found: {task_id}")),
    }
}

async fn task_result(State(state): State<AppState>, Path(task_id): Path<String>) -> Response {
    match state.manager.get_result(&task_id) {
        Some(result) => Json(result).into_response(),
        None => error(
            StatusCode::NOT_FOUND,
            format!("no completed result for task: {task_id}"),
        ),
    }
}
