use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Enums ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// Task status is derived from checklist progress (see checklist.rs),
/// except for the one-way force-complete override on a direct status set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in-progress",
            TaskStatus::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
        }
    }
}

// ── Entities ───────────────────────────────────────────────────

/// One sub-task line, owned by its parent Task. No identity of its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecklistItem {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    /// Assignee user ids. Always at least one.
    pub assigned_to: Vec<Uuid>,
    pub created_by: Uuid,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub todo_checklists: Vec<ChecklistItem>,
    /// Percentage of checklist items completed. Derived, 0–100.
    #[serde(default)]
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn to_response(&self) -> UserResponse {
        UserResponse {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            role: self.role,
            profile_image: self.profile_image.clone(),
            created_at: self.created_at,
        }
    }
}

// ── API request/response types ─────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Assignee details resolved into task responses.
#[derive(Debug, Clone, Serialize)]
pub struct AssigneeResponse {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profile_image: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    pub priority: Priority,
    pub due_date: DateTime<Utc>,
    pub assigned_to: Vec<AssigneeResponse>,
    pub created_by: Uuid,
    pub attachments: Vec<String>,
    pub todo_checklists: Vec<ChecklistItem>,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    #[serde(default)]
    pub title: String,
    pub description: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: Priority,
    pub due_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_to: Vec<Uuid>,
    #[serde(default)]
    pub attachments: Vec<String>,
    #[serde(default)]
    pub todo_checklists: Vec<ChecklistItem>,
}

fn default_priority() -> Priority {
    Priority::Medium
}

/// Partial update. An absent field leaves the stored value unchanged; a
/// present field overwrites it, so an explicit empty string or empty list
/// is an intentional clear.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTaskRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub priority: Option<Priority>,
    pub due_date: Option<DateTime<Utc>>,
    pub assigned_to: Option<Vec<Uuid>>,
    pub attachments: Option<Vec<String>>,
    pub todo_checklists: Option<Vec<ChecklistItem>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_serializes_lowercase_hyphenated() {
        assert_eq!(
            serde_json::to_string(&TaskStatus::InProgress).unwrap(),
            "\"in-progress\""
        );
        let parsed: TaskStatus = serde_json::from_str("\"in-progress\"").unwrap();
        assert_eq!(parsed, TaskStatus::InProgress);
    }

    #[test]
    fn mixed_case_status_literal_rejected() {
        // Mixed-case literals must fail loudly instead of matching nothing
        assert!(serde_json::from_str::<TaskStatus>("\"In Progress\"").is_err());
    }

    #[test]
    fn role_and_priority_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&Role::Admin).unwrap(), "\"admin\"");
        assert_eq!(serde_json::to_string(&Priority::High).unwrap(), "\"high\"");
    }

    #[test]
    fn checklist_item_completed_defaults_false() {
        let item: ChecklistItem = serde_json::from_str(r#"{"text":"write docs"}"#).unwrap();
        assert!(!item.completed);
    }
}
