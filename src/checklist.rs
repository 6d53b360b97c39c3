//! Checklist engine.
//!
//! Progress and status are derived state: the ONLY place they are computed
//! is here. Both mutation endpoints (status set, checklist replace) and
//! task creation route through these functions.
//!
//! Invariant: progress = round(100 * completed / total), 0 when the list is
//! empty; status is Completed at 100, InProgress in between, Pending at 0.
//! The one exception is a direct status set to Completed, which force-marks
//! every item and pins progress at 100.

use crate::error::ApiError;
use crate::models::{ChecklistItem, Task, TaskStatus, User};

/// Derive (progress, status) from a checklist.
pub fn derive(checklist: &[ChecklistItem]) -> (u8, TaskStatus) {
    let total = checklist.len();
    if total == 0 {
        return (0, TaskStatus::Pending);
    }

    let completed = checklist.iter().filter(|item| item.completed).count();
    // Round half-up on the percentage
    let progress = ((completed as f64 / total as f64) * 100.0).round() as u8;

    let status = match progress {
        0 => TaskStatus::Pending,
        100 => TaskStatus::Completed,
        _ => TaskStatus::InProgress,
    };

    (progress, status)
}

/// Admin, or a member of the task's assignee set. Everyone else is turned
/// away before any mutation happens.
pub fn authorize_assignee(task: &Task, user: &User) -> Result<(), ApiError> {
    if user.is_admin() || task.assigned_to.contains(&user.id) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Not authorized to update this task"))
    }
}

/// Set the status directly. Completed is a one-way override: every
/// checklist item is marked done and progress pinned at 100. Any other
/// status leaves the checklist and progress untouched, even if that is
/// momentarily inconsistent — the next checklist update re-derives.
pub fn set_status(task: &mut Task, status: TaskStatus) {
    task.status = status;

    if status == TaskStatus::Completed {
        for item in &mut task.todo_checklists {
            item.completed = true;
        }
        task.progress = 100;
    }
}

/// Replace the checklist wholesale and re-derive progress and status from
/// the new list.
pub fn replace_checklist(task: &mut Task, items: Vec<ChecklistItem>) {
    task.todo_checklists = items;
    let (progress, status) = derive(&task.todo_checklists);
    task.progress = progress;
    task.status = status;
}

/// Every item needs text. Runs before a checklist is accepted.
pub fn validate_checklist(items: &[ChecklistItem]) -> Result<(), ApiError> {
    if items.iter().any(|item| item.text.trim().is_empty()) {
        return Err(ApiError::validation("Checklist item text is required"));
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────
