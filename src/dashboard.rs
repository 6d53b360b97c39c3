//! Dashboard aggregation.
//!
//! Statistics are computed over a snapshot of the task collection at call
//! time — concurrent writers make them eventually consistent, which is
//! accepted. Every status and priority appears in the chart maps even at
//! count zero.

use crate::auth::{self, SharedState};
use crate::error::ApiError;
use crate::models::{Priority, Task, TaskStatus, User};
use axum::{extract::State, Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

const RECENT_TASK_LIMIT: usize = 10;

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub total_tasks: u64,
    pub pending_tasks: u64,
    pub in_progress_tasks: u64,
    pub completed_tasks: u64,
    pub overdue_tasks: u64,
}

#[derive(Debug, Serialize)]
pub struct TaskDistribution {
    pub pending: u64,
    #[serde(rename = "in-progress")]
    pub in_progress: u64,
    pub completed: u64,
    #[serde(rename = "All")]
    pub all: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct TaskPriorityLevels {
    pub low: u64,
    pub medium: u64,
    pub high: u64,
}

#[derive(Debug, Serialize)]
pub struct Charts {
    pub task_distribution: TaskDistribution,
    pub task_priority_levels: TaskPriorityLevels,
}

#[derive(Debug, Serialize)]
pub struct Dashboard<T> {
    pub statistics: Statistics,
    pub charts: Charts,
    pub recent_tasks: Vec<T>,
}

/// Reduced projection for the user dashboard's recent-task list.
#[derive(Debug, Serialize)]
pub struct RecentTask {
    pub title: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Due in the past and not completed, judged at `now`.
fn is_overdue(task: &Task, now: DateTime<Utc>) -> bool {
    task.due_date < now && task.status != TaskStatus::Completed
}

fn build_statistics(tasks: &[Task], now: DateTime<Utc>) -> Statistics {
    let count_status =
        |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count() as u64;

    Statistics {
        total_tasks: tasks.len() as u64,
        pending_tasks: count_status(TaskStatus::Pending),
        in_progress_tasks: count_status(TaskStatus::InProgress),
        completed_tasks: count_status(TaskStatus::Completed),
        overdue_tasks: tasks.iter().filter(|t| is_overdue(t, now)).count() as u64,
    }
}

fn build_charts(tasks: &[Task]) -> Charts {
    let count_status =
        |status: TaskStatus| tasks.iter().filter(|t| t.status == status).count() as u64;
    let count_priority =
        |priority: Priority| tasks.iter().filter(|t| t.priority == priority).count() as u64;

    Charts {
        task_distribution: TaskDistribution {
            pending: count_status(TaskStatus::Pending),
            in_progress: count_status(TaskStatus::InProgress),
            completed: count_status(TaskStatus::Completed),
            all: tasks.len() as u64,
        },
        task_priority_levels: TaskPriorityLevels {
            low: count_priority(Priority::Low),
            medium: count_priority(Priority::Medium),
            high: count_priority(Priority::High),
        },
    }
}

/// First N of an already most-recent-first list, projected down.
fn recent_tasks(tasks: &[Task]) -> Vec<RecentTask> {
    tasks
        .iter()
        .take(RECENT_TASK_LIMIT)
        .map(|t| RecentTask {
            title: t.title.clone(),
            status: t.status,
            priority: t.priority,
            due_date: t.due_date,
            created_at: t.created_at,
        })
        .collect()
}

// ── Handlers ───────────────────────────────────────────────────

// GET /api/tasks/dashboard-data (admin only) — global view, full recent tasks
pub async fn dashboard_data(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<Dashboard<Task>>, ApiError> {
    auth::require_admin(&user)?;

    let tasks = state.db.list_tasks()?;
    let now = Utc::now();

    Ok(Json(Dashboard {
        statistics: build_statistics(&tasks, now),
        charts: build_charts(&tasks),
        recent_tasks: tasks.iter().take(RECENT_TASK_LIMIT).cloned().collect(),
    }))
}

// GET /api/tasks/user-dashboard-data — same shape, scoped to the caller
pub async fn user_dashboard_data(
    State(state): State<SharedState>,
    Extension(user): Extension<User>,
) -> Result<Json<Dashboard<RecentTask>>, ApiError> {
    let tasks = state.db.list_tasks_filtered(None, Some(user.id))?;
    let now = Utc::now();

    Ok(Json(Dashboard {
        statistics: build_statistics(&tasks, now),
        charts: build_charts(&tasks),
        recent_tasks: recent_tasks(&tasks),
    }))
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use uuid::Uuid;

    fn task(status: TaskStatus, priority: Priority, due_in_days: i64, age_minutes: i64) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            title: format!("{} task", status.as_str()),
            description: String::new(),
            status,
            priority,
            due_date: now + Duration::days(due_in_days),
            assigned_to: vec![Uuid::new_v4()],
            created_by: Uuid::nil(),
            attachments: Vec::new(),
            todo_checklists: Vec::new(),
            progress: 0,
            created_at: now - Duration::minutes(age_minutes),
            updated_at: now - Duration::minutes(age_minutes),
        }
    }

    #[test]
    fn total_equals_sum_of_distribution() {
        let tasks = vec![
            task(TaskStatus::Pending, Priority::Low, 5, 0),
            task(TaskStatus::Pending, Priority::High, 5, 1),
            task(TaskStatus::InProgress, Priority::Medium, 5, 2),
            task(TaskStatus::Completed, Priority::High, 5, 3),
        ];

        let stats = build_statistics(&tasks, Utc::now());
        let charts = build_charts(&tasks);

        assert_eq!(
            stats.total_tasks,
            charts.task_distribution.pending
                + charts.task_distribution.in_progress
                + charts.task_distribution.completed
        );
        assert_eq!(charts.task_distribution.all, stats.total_tasks);
    }

    #[test]
    fn empty_collection_still_covers_every_bucket() {
        let charts = build_charts(&[]);
        assert_eq!(charts.task_distribution.pending, 0);
        assert_eq!(charts.task_distribution.in_progress, 0);
        assert_eq!(charts.task_distribution.completed, 0);
        assert_eq!(charts.task_distribution.all, 0);
        assert_eq!(charts.task_priority_levels.low, 0);
        assert_eq!(charts.task_priority_levels.medium, 0);
        assert_eq!(charts.task_priority_levels.high, 0);
    }

    #[test]
    fn chart_maps_expose_hyphenated_and_capitalized_keys() {
        let json = serde_json::to_value(build_charts(&[])).unwrap();
        let distribution = &json["task_distribution"];
        assert!(distribution.get("in-progress").is_some());
        assert!(distribution.get("All").is_some());
        let priorities = &json["task_priority_levels"];
        assert!(priorities.get("Low").is_some());
        assert!(priorities.get("High").is_some());
    }

    #[test]
    fn overdue_excludes_completed_tasks() {
        let tasks = vec![
            task(TaskStatus::Pending, Priority::Low, -2, 0), // overdue
            task(TaskStatus::InProgress, Priority::Low, -1, 1), // overdue
            task(TaskStatus::Completed, Priority::Low, -3, 2), // past due but done
            task(TaskStatus::Pending, Priority::Low, 2, 3),  // not yet due
        ];

        let stats = build_statistics(&tasks, Utc::now());
        assert_eq!(stats.overdue_tasks, 2);
    }

    #[test]
    fn recent_tasks_cap_at_ten_most_recent_first() {
        let tasks: Vec<Task> = (0..15)
            .map(|i| task(TaskStatus::Pending, Priority::Medium, 5, i))
            .collect();

        let recent = recent_tasks(&tasks);
        assert_eq!(recent.len(), 10);
        for pair in recent.windows(2) {
            assert!(pair[0].created_at >= pair[1].created_at);
        }
    }

    #[test]
    fn shared_task_counts_once_per_assignee_scope() {
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        let mut shared = task(TaskStatus::Pending, Priority::High, -1, 0);
        shared.assigned_to = vec![u1, u2];
        let all = vec![shared];

        // Each user's scoped view contains the task exactly once
        for user in [u1, u2] {
            let scoped: Vec<Task> = all
                .iter()
                .filter(|t| t.assigned_to.contains(&user))
                .cloned()
                .collect();
            let stats = build_statistics(&scoped, Utc::now());
            assert_eq!(stats.total_tasks, 1);
            assert_eq!(stats.overdue_tasks, 1);
        }
    }
}
