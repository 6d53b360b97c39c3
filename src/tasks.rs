use crate::auth::{self, SharedState};
use crate::checklist;
use crate::error::ApiError;
use crate::models::{
    AssigneeResponse, ChecklistItem, CreateTaskRequest, Task, TaskResponse, TaskStatus,
    UpdateTaskRequest, User,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

// Load all users into an id → assignee-details map (avoids N+1 lookups)
fn load_assignees(state: &SharedState) -> Result<HashMap<Uuid, AssigneeResponse>, ApiError> {
    let users = state.db.list_users()?;
    Ok(users
        .into_iter()
        .map(|u| {
            (
                u.id,
                AssigneeResponse {
                    id: u.id,
                    name: u.name,
                    email: u.email,
                    profile_image: u.profile_image,
                },
            )
        })
        .collect())
}

// Resolve assignee ids to user details. Ids that no longer resolve
// (deleted accounts) are skipped.
fn task_to_response(task: Task, assignees: &HashMap<Uuid, AssigneeResponse>) -> TaskResponse {
    let assigned_to = task
        .assigned_to
        .iter()
        .filter_map(|id| assignees.get(id).cloned())
        .collect();

    TaskResponse {
        id: task.id,
        title: task.title,
        description: task.description,
        status: task.status,
        priority: task.priority,
        due_date: task.due_date,
        assigned_to,
        created_by: task.created_by,
        attachments: task.attachments,
        todo_checklists: task.todo_checklists,
        progress: task.progress,
        created_at: task.created_at,
        updated_at: task.updated_at,
    }
}

/// Merge a partial update into a task. Present fields overwrite, absent
/// fields are untouched. A checklist in the patch re-derives progress and
/// status through the engine.
fn apply_update(task: &mut Task, patch: UpdateTaskRequest) -> Result<(), ApiError> {
    if let Some(title) = patch.title {
        if title.trim().is_empty() {
            return Err(ApiError::validation("Task title is required"));
        }
        task.title = title;
    }
    if let Some(description) = patch.description {
        task.description = description;
    }
    if let Some(priority) = patch.priority {
        task.priority = priority;
    }
    if let Some(due_date) = patch.due_date {
        task.due_date = due_date;
    }
    if let Some(assigned_to) = patch.assigned_to {
        if assigned_to.is_empty() {
            return Err(ApiError::validation("Assigned user is required"));
        }
        task.assigned_to = assigned_to;
    }
    if let Some(attachments) = patch.attachments {
        task.attachments = attachments;
    }
    if let Some(items) = patch.todo_checklists {
        checklist::validate_checklist(&items)?;
        checklist::replace_checklist(task, items);
    }
    Ok(())
}

// ── List ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
}

#[derive(Debug, Serialize)]
pub struct StatusSummary {
    pub all: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskListResponse {
    pub tasks: Vec<TaskResponse>,
    pub status_summary: StatusSummary,
}

// GET /api/tasks — admins see everything, users only their assignments.
// The summary counts the caller's whole scope, ignoring the status filter.
pub async fn list_tasks(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Query(query): Query<TaskListQuery>,
) -> Result<Json<TaskListResponse>, ApiError> {
    let scope = if user.is_admin() { None } else { Some(user.id) };

    let tasks = state.db.list_tasks_filtered(query.status, scope)?;
    let assignees = load_assignees(&state)?;
    let tasks = tasks
        .into_iter()
        .map(|t| task_to_response(t, &assignees))
        .collect();

    let status_summary = StatusSummary {
        all: state.db.count_tasks(scope, None)?,
        pending_tasks: state.db.count_tasks(scope, Some(TaskStatus::Pending))?,
        in_progress_tasks: state.db.count_tasks(scope, Some(TaskStatus::InProgress))?,
        completed_tasks: state.db.count_tasks(scope, Some(TaskStatus::Completed))?,
    };

    Ok(Json(TaskListResponse {
        tasks,
        status_summary,
    }))
}

// ── CRUD ───────────────────────────────────────────────────────

// POST /api/tasks (admin only)
pub async fn create_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Json(payload): Json<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), ApiError> {
    auth::require_admin(&user)?;

    if payload.title.trim().is_empty() {
        return Err(ApiError::validation("Task title is required"));
    }
    let due_date = payload
        .due_date
        .ok_or_else(|| ApiError::validation("Due date is required"))?;
    if payload.assigned_to.is_empty() {
        return Err(ApiError::validation("Assigned user is required"));
    }
    checklist::validate_checklist(&payload.todo_checklists)?;

    // Status and progress are not taken from the caller — they are derived
    // from the checklist, so the invariant holds from birth.
    let (progress, status) = checklist::derive(&payload.todo_checklists);

    let now = Utc::now();
    let task = Task {
        id: Uuid::new_v4(),
        title: payload.title,
        description: payload.description.unwrap_or_default(),
        status,
        priority: payload.priority,
        due_date,
        assigned_to: payload.assigned_to,
        created_by: user.id,
        attachments: payload.attachments,
        todo_checklists: payload.todo_checklists,
        progress,
        created_at: now,
        updated_at: now,
    };

    state.db.create_task(&task)?;
    tracing::info!(task = %task.id, title = %task.title, "task created");

    let assignees = load_assignees(&state)?;
    Ok((StatusCode::CREATED, Json(task_to_response(task, &assignees))))
}

// GET /api/tasks/:id
pub async fn get_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, ApiError> {
    let task = state
        .db
        .get_task(id)?
        .ok_or(ApiError::NotFound("Task not found"))?;

    // Non-admin reads are scoped to assigned tasks
    checklist::authorize_assignee(&task, &user)?;

    let assignees = load_assignees(&state)?;
    Ok(Json(task_to_response(task, &assignees)))
}

// PUT /api/tasks/:id (admin only — assigned users go through the
// status/checklist endpoints)
pub async fn update_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    auth::require_admin(&user)?;

    let mut task = state
        .db
        .get_task(id)?
        .ok_or(ApiError::NotFound("Task not found"))?;

    apply_update(&mut task, payload)?;
    task.updated_at = Utc::now();

    state.db.update_task(&task)?;

    let assignees = load_assignees(&state)?;
    Ok(Json(task_to_response(task, &assignees)))
}

// DELETE /api/tasks/:id (admin only). Unconditional hard delete.
pub async fn delete_task(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth::require_admin(&user)?;

    if !state.db.delete_task(id)? {
        return Err(ApiError::NotFound("Task not found"));
    }

    tracing::info!(task = %id, "task deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Status & checklist (assigned users or admin) ───────────────

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<TaskStatus>,
}

// PUT /api/tasks/:id/status
pub async fn update_task_status(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateStatusRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let mut task = state
        .db
        .get_task(id)?
        .ok_or(ApiError::NotFound("Task not found"))?;

    checklist::authorize_assignee(&task, &user)?;

    let status = payload
        .status
        .ok_or_else(|| ApiError::validation("Status is required"))?;

    checklist::set_status(&mut task, status);
    task.updated_at = Utc::now();

    state.db.update_task(&task)?;

    let assignees = load_assignees(&state)?;
    Ok(Json(task_to_response(task, &assignees)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateChecklistRequest {
    pub todo_checklists: Option<Vec<ChecklistItem>>,
}

// PUT /api/tasks/:id/todo
pub async fn update_task_checklist(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateChecklistRequest>,
) -> Result<Json<TaskResponse>, ApiError> {
    let mut task = state
        .db
        .get_task(id)?
        .ok_or(ApiError::NotFound("Task not found"))?;

    let items = payload
        .todo_checklists
        .ok_or_else(|| ApiError::validation("Checklist data missing or invalid"))?;

    checklist::authorize_assignee(&task, &user)?;
    checklist::validate_checklist(&items)?;

    checklist::replace_checklist(&mut task, items);
    task.updated_at = Utc::now();

    state.db.update_task(&task)?;

    // Re-read so the response reflects the stored document, assignees resolved
    let task = state
        .db
        .get_task(id)?
        .ok_or(ApiError::NotFound("Task not found"))?;
    let assignees = load_assignees(&state)?;
    Ok(Json(task_to_response(task, &assignees)))
}

// ── Tests ──────────────────────────────────────────────────────
