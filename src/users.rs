use crate::auth::{self, SharedState};
use crate::error::ApiError;
use crate::models::{Role, Task, TaskStatus, User, UserResponse};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
pub struct UserWithTaskCounts {
    #[serde(flatten)]
    pub user: UserResponse,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
}

#[derive(Debug, Serialize)]
pub struct UserDetailResponse {
    pub user: UserResponse,
    pub tasks: Vec<Task>,
}

/// Assigned-task tallies for one user, counted through the status enum.
fn task_counts(user_id: Uuid, tasks: &[Task]) -> (u64, u64, u64) {
    let count = |status: TaskStatus| {
        tasks
            .iter()
            .filter(|t| t.status == status && t.assigned_to.contains(&user_id))
            .count() as u64
    };
    (
        count(TaskStatus::Pending),
        count(TaskStatus::InProgress),
        count(TaskStatus::Completed),
    )
}

// GET /api/users (admin only) — member accounts with their task tallies.
// Tasks are loaded once and tallied in memory rather than counted per user.
pub async fn list_users(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<Vec<UserWithTaskCounts>>, ApiError> {
    auth::require_admin(&user)?;

    let tasks = state.db.list_tasks()?;
    let users = state.db.list_users()?;

    let members = users
        .into_iter()
        .filter(|u| u.role == Role::User)
        .map(|u| {
            let (pending_tasks, in_progress_tasks, completed_tasks) = task_counts(u.id, &tasks);
            UserWithTaskCounts {
                user: u.to_response(),
                pending_tasks,
                in_progress_tasks,
                completed_tasks,
            }
        })
        .collect();

    Ok(Json(members))
}

// GET /api/users/:id — a user plus the tasks assigned to them
pub async fn get_user(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<UserDetailResponse>, ApiError> {
    let user = state
        .db
        .get_user(id)?
        .ok_or(ApiError::NotFound("User not found"))?;

    let tasks = state.db.list_tasks_filtered(None, Some(user.id))?;

    Ok(Json(UserDetailResponse {
        user: user.to_response(),
        tasks,
    }))
}

// DELETE /api/users/:id (admin only). Removes the user document only —
// tasks keep their assignee ids, and unresolvable ids are skipped when
// responses are built.
pub async fn delete_user(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    auth::require_admin(&user)?;

    if !state.db.delete_user(id)? {
        return Err(ApiError::NotFound("User not found"));
    }

    tracing::info!(user = %id, "user deleted");
    Ok(StatusCode::NO_CONTENT)
}

// ── Tests ──────────────────────────────────────────────────────
