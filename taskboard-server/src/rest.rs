//! REST handlers: webhook intake, task moves, project CRUD.
//!
//! Request bodies are deserialized loosely (optional/string fields) and
//! validated explicitly so that callers get per-field error details
//! instead of an opaque parse failure. Error mapping follows the
//! taxonomy: validation → 400 with details, unknown project/task → 404,
//! storage failure → 500 with a generic body (details go to the log).

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use taskboard_proto::project::Project;
use taskboard_proto::task::TaskStatus;
use taskboard_proto::webhook::{FieldError, SyncPayload};
use uuid::Uuid;

use crate::engine::SyncError;
use crate::server::AppState;

/// `POST /webhook/{projectSlug}` — full-collection sync from the external
/// tool.
pub async fn receive_sync(
    State(state): State<AppState>,
    Path(slug): Path<String>,
    Json(payload): Json<SyncPayload>,
) -> Response {
    let tasks = match payload.validate() {
        Ok(tasks) => tasks,
        Err(details) => return validation_response("Invalid payload", details),
    };

    let Some(project) = state.projects.get_by_slug(&slug).await else {
        return not_found("Project not found");
    };

    match state.engine.apply_external_sync(project.id, tasks).await {
        Ok(outcome) => Json(json!({
            "success": true,
            "synced": outcome.synced,
            "deleted": outcome.deleted,
        }))
        .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Body of `PUT /tasks/{taskId}/move`, unvalidated.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    #[serde(default)]
    new_status: Option<String>,
    #[serde(default)]
    project_id: Option<String>,
}

/// `PUT /tasks/{taskId}/move` — status-only move of one task.
pub async fn move_task(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    Json(body): Json<MoveRequest>,
) -> Response {
    let mut details = Vec::new();
    let new_status = match body.new_status.as_deref() {
        None => {
            details.push(FieldError {
                field: "newStatus".to_string(),
                message: "required".to_string(),
            });
            None
        }
        Some(raw) => {
            let parsed = TaskStatus::parse(raw);
            if parsed.is_none() {
                details.push(FieldError {
                    field: "newStatus".to_string(),
                    message: "expected pending, in_progress or completed".to_string(),
                });
            }
            parsed
        }
    };
    let project_id = match body.project_id.as_deref() {
        None => {
            details.push(FieldError {
                field: "projectId".to_string(),
                message: "required".to_string(),
            });
            None
        }
        Some(raw) => {
            let parsed = Uuid::parse_str(raw).ok();
            if parsed.is_none() {
                details.push(FieldError {
                    field: "projectId".to_string(),
                    message: "invalid uuid".to_string(),
                });
            }
            parsed
        }
    };
    let (Some(new_status), Some(project_id)) = (new_status, project_id) else {
        return validation_response("Invalid request", details);
    };

    match state.engine.apply_move(project_id, &task_id, new_status).await {
        Ok(task) => Json(json!({ "success": true, "task": task })).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Body of `POST /projects/create`, unvalidated.
#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

/// `POST /projects/create` — creates a project and its empty document.
pub async fn create_project(
    State(state): State<AppState>,
    Json(body): Json<CreateProjectRequest>,
) -> Response {
    let name = body.name.as_deref().unwrap_or_default();
    if let Err(message) = Project::validate_name(name) {
        return validation_response(
            "Validation error",
            vec![FieldError {
                field: "name".to_string(),
                message,
            }],
        );
    }

    let project = match state.projects.create(name, body.description).await {
        Ok(project) => project,
        Err(e) => {
            tracing::error!(error = %e, "project creation failed");
            return internal_error();
        }
    };
    if let Err(e) = state.docs.ensure_exists(&project.slug, &project.name).await {
        tracing::error!(slug = %project.slug, error = %e, "failed to create project document");
        return internal_error();
    }

    let url = format!("{}/{}", state.public_base_url, project.slug);
    Json(json!({ "success": true, "project": project, "url": url })).into_response()
}

/// Query string of `GET /projects`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    limit: Option<usize>,
}

/// `GET /projects` — lists projects, most recently synced first.
pub async fn list_projects(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Response {
    let limit = query.limit.unwrap_or(state.list_limit);
    let projects = state
        .projects
        .search(query.search.as_deref().filter(|s| !s.is_empty()), limit)
        .await;
    Json(json!({
        "success": true,
        "count": projects.len(),
        "projects": projects,
    }))
    .into_response()
}

fn validation_response(error: &str, details: Vec<FieldError>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": error, "details": details })),
    )
        .into_response()
}

fn not_found(message: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": message }))).into_response()
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}

fn error_response(error: &SyncError) -> Response {
    match error {
        SyncError::Validation(details) => validation_response("Invalid payload", details.clone()),
        SyncError::ProjectNotFound => not_found("Project not found"),
        SyncError::TaskNotFound(_) => not_found("Task not found"),
        SyncError::Storage(e) => {
            tracing::error!(error = %e, "storage failure");
            internal_error()
        }
    }
}
