//! Tabular exports.
//!
//! Two read-model projections — all tasks with resolved assignees, and all
//! users with their per-status task tallies — rendered as CSV attachments.

use crate::auth::{self, SharedState};
use crate::error::ApiError;
use crate::models::{Task, TaskStatus, User};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension,
};
use chrono::Utc;
use std::collections::HashMap;
use std::fmt::Write;
use uuid::Uuid;

/// Quote a field when it contains a comma, quote, or newline.
fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn csv_row(fields: &[String]) -> String {
    fields
        .iter()
        .map(|f| csv_escape(f))
        .collect::<Vec<_>>()
        .join(",")
}

/// One row per task, assignee names and e-mails resolved (multi-assignee
/// values joined with "; ").
fn tasks_csv(tasks: &[Task], users: &HashMap<Uuid, User>) -> String {
    let mut out = String::from(
        "Task ID,Title,Status,Priority,Due Date,Assigned To,Assigned Email,Created At\n",
    );

    for task in tasks {
        let assignees: Vec<&User> = task
            .assigned_to
            .iter()
            .filter_map(|id| users.get(id))
            .collect();
        let names = assignees
            .iter()
            .map(|u| u.name.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let emails = assignees
            .iter()
            .map(|u| u.email.as_str())
            .collect::<Vec<_>>()
            .join("; ");

        let row = csv_row(&[
            task.id.to_string(),
            task.title.clone(),
            task.status.as_str().to_string(),
            task.priority.as_str().to_string(),
            task.due_date.format("%Y-%m-%d").to_string(),
            if names.is_empty() { "N/A".to_string() } else { names },
            if emails.is_empty() { "N/A".to_string() } else { emails },
            task.created_at.format("%Y-%m-%d").to_string(),
        ]);
        let _ = writeln!(out, "{row}");
    }

    out
}

/// One row per user with task tallies — a task counts once for every user
/// it is assigned to.
fn users_csv(users: &[User], tasks: &[Task]) -> String {
    struct Tally {
        total: u64,
        pending: u64,
        in_progress: u64,
        completed: u64,
    }

    let mut tallies: HashMap<Uuid, Tally> = users
        .iter()
        .map(|u| {
            (
                u.id,
                Tally {
                    total: 0,
                    pending: 0,
                    in_progress: 0,
                    completed: 0,
                },
            )
        })
        .collect();

    for task in tasks {
        for assignee in &task.assigned_to {
            if let Some(tally) = tallies.get_mut(assignee) {
                tally.total += 1;
                match task.status {
                    TaskStatus::Pending => tally.pending += 1,
                    TaskStatus::InProgress => tally.in_progress += 1,
                    TaskStatus::Completed => tally.completed += 1,
                }
            }
        }
    }

    let mut out = String::from(
        "User ID,Name,Email,Total Tasks,Pending Tasks,In Progress Tasks,Completed Tasks\n",
    );

    for user in users {
        let tally = &tallies[&user.id];
        let row = csv_row(&[
            user.id.to_string(),
            user.name.clone(),
            user.email.clone(),
            tally.total.to_string(),
            tally.pending.to_string(),
            tally.in_progress.to_string(),
            tally.completed.to_string(),
        ]);
        let _ = writeln!(out, "{row}");
    }

    out
}

fn csv_attachment(filename_stem: &str, body: String) -> impl IntoResponse {
    let filename = format!("{filename_stem}_{}.csv", Utc::now().format("%Y-%m-%d"));
    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={filename}"),
            ),
        ],
        body,
    )
}

// ── Handlers ───────────────────────────────────────────────────

// GET /api/reports/export/tasks (admin only)
pub async fn export_tasks(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    auth::require_admin(&user)?;

    let tasks = state.db.list_tasks()?;
    let users: HashMap<Uuid, User> = state
        .db
        .list_users()?
        .into_iter()
        .map(|u| (u.id, u))
        .collect();

    Ok(csv_attachment("tasks_report", tasks_csv(&tasks, &users)))
}

// GET /api/reports/export/users (admin only)
pub async fn export_users(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<impl IntoResponse, ApiError> {
    auth::require_admin(&user)?;

    let users = state.db.list_users()?;
    let tasks = state.db.list_tasks()?;

    Ok(csv_attachment("users_report", users_csv(&users, &tasks)))
}

// ── Tests ──────────────────────────────────────────────────────
