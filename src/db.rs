//! Task/User repository over redb.
//!
//! One table per entity plus an e-mail lookup index, JSON documents as
//! values. A write transaction per mutation gives per-document atomicity;
//! there are no cross-document transactions (dashboard reads are snapshots).

use crate::models::{Role, Task, TaskStatus, User};
use crate::settings::Settings;
use chrono::Utc;
use redb::{Database, ReadableTable, TableDefinition};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

const USERS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("users");
const TASKS_TABLE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("tasks");
const EMAIL_INDEX: TableDefinition<&str, &[u8]> = TableDefinition::new("email_index");

#[derive(Debug, Error)]
pub enum DbError {
    #[error("redb: {0}")]
    Redb(String),
    #[error("decode: {0}")]
    Decode(String),
    #[error("encode: {0}")]
    Encode(String),
}

// redb 2.x has many error types. Blanket them all into DbError::Redb.
macro_rules! from_redb {
    ($($t:ty),*) => {
        $(impl From<$t> for DbError {
            fn from(e: $t) -> Self { DbError::Redb(e.to_string()) }
        })*
    };
}

from_redb!(
    redb::Error,
    redb::DatabaseError,
    redb::TableError,
    redb::TransactionError,
    redb::StorageError,
    redb::CommitError
);

fn encode<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, DbError> {
    serde_json::to_vec(value).map_err(|e| DbError::Encode(e.to_string()))
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, DbError> {
    serde_json::from_slice(bytes).map_err(|e| DbError::Decode(e.to_string()))
}

/// Thin handle to the database file. Cloneable (Arc inside).
#[derive(Clone)]
pub struct Db {
    db: Arc<Database>,
}

impl Db {
    /// Open (or create) the database at the given path.
    /// Creates tables if they don't exist.
    pub fn open(path: &str) -> Result<Self, DbError> {
        let db = Database::create(path)?;

        let txn = db.begin_write()?;
        {
            let _ = txn.open_table(USERS_TABLE)?;
            let _ = txn.open_table(TASKS_TABLE)?;
            let _ = txn.open_table(EMAIL_INDEX)?;
        }
        txn.commit()?;

        Ok(Db { db: Arc::new(db) })
    }

    // ── Users ──────────────────────────────────────────────────

    pub fn create_user(&self, user: &User) -> Result<(), DbError> {
        let txn = self.db.begin_write()?;
        {
            let mut users = txn.open_table(USERS_TABLE)?;
            let mut email_index = txn.open_table(EMAIL_INDEX)?;

            let user_bytes = encode(user)?;
            let id_bytes = user.id.as_bytes();

            users.insert(id_bytes.as_slice(), user_bytes.as_slice())?;
            email_index.insert(user.email.as_str(), id_bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>, DbError> {
        let txn = self.db.begin_read()?;
        let users = txn.open_table(USERS_TABLE)?;

        match users.get(id.as_bytes().as_slice())? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn get_user_by_email(&self, email: &str) -> Result<Option<User>, DbError> {
        let txn = self.db.begin_read()?;
        let email_index = txn.open_table(EMAIL_INDEX)?;

        match email_index.get(email)? {
            Some(id_data) => {
                let users = txn.open_table(USERS_TABLE)?;
                match users.get(id_data.value())? {
                    Some(user_data) => Ok(Some(decode(user_data.value())?)),
                    None => Ok(None),
                }
            }
            None => Ok(None),
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>, DbError> {
        let txn = self.db.begin_read()?;
        let users_table = txn.open_table(USERS_TABLE)?;

        let mut users = Vec::new();
        for entry in users_table.iter()? {
            let (_, value) = entry?;
            users.push(decode(value.value())?);
        }
        Ok(users)
    }

    /// Overwrite a user document, re-pointing the e-mail index when the
    /// address changed. `previous_email` is the address before the edit.
    pub fn update_user(&self, previous_email: &str, user: &User) -> Result<(), DbError> {
        let txn = self.db.begin_write()?;
        {
            let mut users = txn.open_table(USERS_TABLE)?;
            let mut email_index = txn.open_table(EMAIL_INDEX)?;

            let user_bytes = encode(user)?;
            let id_bytes = user.id.as_bytes();

            users.insert(id_bytes.as_slice(), user_bytes.as_slice())?;
            email_index.insert(user.email.as_str(), id_bytes.as_slice())?;
            if previous_email != user.email {
                email_index.remove(previous_email)?;
            }
        }
        txn.commit()?;
        Ok(())
    }

    pub fn delete_user(&self, id: Uuid) -> Result<bool, DbError> {
        let user = match self.get_user(id)? {
            Some(user) => user,
            None => return Ok(false),
        };

        let txn = self.db.begin_write()?;
        {
            let mut email_index = txn.open_table(EMAIL_INDEX)?;
            email_index.remove(user.email.as_str())?;

            let mut users = txn.open_table(USERS_TABLE)?;
            users.remove(user.id.as_bytes().as_slice())?;
        }
        txn.commit()?;
        Ok(true)
    }

    /// Seed an admin account on first boot. Returns true if created.
    pub fn ensure_default_admin(&self, settings: &Settings) -> Result<bool, DbError> {
        if !self.list_users()?.is_empty() {
            return Ok(false);
        }

        use argon2::{
            password_hash::{rand_core::OsRng, SaltString},
            Argon2, PasswordHasher,
        };

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(settings.default_admin_password.as_bytes(), &salt)
            .unwrap()
            .to_string();

        let admin = User {
            id: Uuid::new_v4(),
            name: settings.default_admin_name.clone(),
            email: settings.default_admin_email.clone(),
            password_hash,
            profile_image: None,
            role: Role::Admin,
            created_at: Utc::now(),
        };

        self.create_user(&admin)?;
        Ok(true)
    }

    // ── Tasks ──────────────────────────────────────────────────

    pub fn create_task(&self, task: &Task) -> Result<(), DbError> {
        self.put_task(task)
    }

    pub fn update_task(&self, task: &Task) -> Result<(), DbError> {
        self.put_task(task)
    }

    fn put_task(&self, task: &Task) -> Result<(), DbError> {
        let txn = self.db.begin_write()?;
        {
            let mut tasks = txn.open_table(TASKS_TABLE)?;
            let task_bytes = encode(task)?;
            tasks.insert(task.id.as_bytes().as_slice(), task_bytes.as_slice())?;
        }
        txn.commit()?;
        Ok(())
    }

    pub fn get_task(&self, id: Uuid) -> Result<Option<Task>, DbError> {
        let txn = self.db.begin_read()?;
        let tasks = txn.open_table(TASKS_TABLE)?;

        match tasks.get(id.as_bytes().as_slice())? {
            Some(data) => Ok(Some(decode(data.value())?)),
            None => Ok(None),
        }
    }

    /// All tasks, most recently created first.
    pub fn list_tasks(&self) -> Result<Vec<Task>, DbError> {
        self.list_tasks_filtered(None, None)
    }

    /// Filtered task list. The assignee filter is how caller scoping is
    /// enforced — non-admin callers always pass their own id, so the
    /// restriction is part of the query rather than a post-filter.
    pub fn list_tasks_filtered(
        &self,
        status: Option<TaskStatus>,
        assignee: Option<Uuid>,
    ) -> Result<Vec<Task>, DbError> {
        let txn = self.db.begin_read()?;
        let tasks_table = txn.open_table(TASKS_TABLE)?;

        let mut tasks = Vec::new();
        for entry in tasks_table.iter()? {
            let (_, value) = entry?;
            let task: Task = decode(value.value())?;
            if let Some(status) = status {
                if task.status != status {
                    continue;
                }
            }
            if let Some(assignee) = assignee {
                if !task.assigned_to.contains(&assignee) {
                    continue;
                }
            }
            tasks.push(task);
        }

        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(tasks)
    }

    /// Count tasks matching the same filters as list_tasks_filtered.
    pub fn count_tasks(
        &self,
        assignee: Option<Uuid>,
        status: Option<TaskStatus>,
    ) -> Result<u64, DbError> {
        let txn = self.db.begin_read()?;
        let tasks_table = txn.open_table(TASKS_TABLE)?;

        let mut count = 0;
        for entry in tasks_table.iter()? {
            let (_, value) = entry?;
            let task: Task = decode(value.value())?;
            if let Some(status) = status {
                if task.status != status {
                    continue;
                }
            }
            if let Some(assignee) = assignee {
                if !task.assigned_to.contains(&assignee) {
                    continue;
                }
            }
            count += 1;
        }
        Ok(count)
    }

    pub fn delete_task(&self, id: Uuid) -> Result<bool, DbError> {
        let txn = self.db.begin_write()?;
        let deleted;
        {
            let mut tasks = txn.open_table(TASKS_TABLE)?;
            deleted = tasks.remove(id.as_bytes().as_slice())?.is_some();
        }
        txn.commit()?;
        Ok(deleted)
    }
}

// ── Tests ──────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Priority;
    use chrono::Duration;
    use std::fs;

    /// Create a temp database file that auto-cleans.
    fn temp_db(name: &str) -> (Db, String) {
        let path = format!("/tmp/taskhub_test_{name}_{}.redb", std::process::id());
        let _ = fs::remove_file(&path); // clean up any leftover
        let db = Db::open(&path).unwrap();
        (db, path)
    }

    fn cleanup(path: &str) {
        let _ = fs::remove_file(path);
    }

    fn sample_user(name: &str, email: &str, role: Role) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: email.to_string(),
            password_hash: "$argon2$fake".to_string(),
            profile_image: None,
            role,
            created_at: Utc::now(),
        }
    }

    fn sample_task(title: &str, assignee: Uuid, status: TaskStatus, age_minutes: i64) -> Task {
        let now = Utc::now();
        Task {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            status,
            priority: Priority::Medium,
            due_date: now + Duration::days(7),
            assigned_to: vec![assignee],
            created_by: Uuid::nil(),
            attachments: Vec::new(),
            todo_checklists: Vec::new(),
            progress: 0,
            created_at: now - Duration::minutes(age_minutes),
            updated_at: now - Duration::minutes(age_minutes),
        }
    }

    fn test_settings() -> Settings {
        serde_json::from_str(
            r#"{
                "tcp_socket_binding": "127.0.0.1",
                "tcp_socket_port": 5000,
                "database_path": "unused",
                "allowed_origin": "*",
                "jwt_secret": "secret",
                "jwt_expiration_hours": 24,
                "default_admin_name": "Admin",
                "default_admin_email": "admin@example.com",
                "default_admin_password": "admin"
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn user_round_trip_with_email_index() {
        let (db, path) = temp_db("user_round_trip");

        let user = sample_user("Ada", "ada@example.com", Role::User);
        db.create_user(&user).unwrap();

        let by_id = db.get_user(user.id).unwrap().unwrap();
        assert_eq!(by_id.email, "ada@example.com");

        let by_email = db.get_user_by_email("ada@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);

        assert!(db.get_user_by_email("nobody@example.com").unwrap().is_none());

        cleanup(&path);
    }

    #[test]
    fn update_user_reindexes_changed_email() {
        let (db, path) = temp_db("reindex");

        let mut user = sample_user("Ada", "ada@example.com", Role::User);
        db.create_user(&user).unwrap();

        user.email = "ada@new.example.com".to_string();
        db.update_user("ada@example.com", &user).unwrap();

        assert!(db.get_user_by_email("ada@example.com").unwrap().is_none());
        let found = db.get_user_by_email("ada@new.example.com").unwrap().unwrap();
        assert_eq!(found.id, user.id);

        cleanup(&path);
    }

    #[test]
    fn delete_user_removes_index_entry() {
        let (db, path) = temp_db("delete_user");

        let user = sample_user("Ada", "ada@example.com", Role::User);
        db.create_user(&user).unwrap();

        assert!(db.delete_user(user.id).unwrap());
        assert!(db.get_user(user.id).unwrap().is_none());
        assert!(db.get_user_by_email("ada@example.com").unwrap().is_none());

        // Second delete is a no-op
        assert!(!db.delete_user(user.id).unwrap());

        cleanup(&path);
    }

    #[test]
    fn ensure_default_admin_is_idempotent() {
        let (db, path) = temp_db("seed_admin");

        assert!(db.ensure_default_admin(&test_settings()).unwrap());
        let admin = db.get_user_by_email("admin@example.com").unwrap().unwrap();
        assert_eq!(admin.role, Role::Admin);

        // Users exist now — seeding again is a no-op
        assert!(!db.ensure_default_admin(&test_settings()).unwrap());
        assert_eq!(db.list_users().unwrap().len(), 1);

        cleanup(&path);
    }

    #[test]
    fn task_round_trip_and_delete() {
        let (db, path) = temp_db("task_round_trip");

        let assignee = Uuid::new_v4();
        let task = sample_task("Ship release", assignee, TaskStatus::Pending, 0);
        db.create_task(&task).unwrap();

        let loaded = db.get_task(task.id).unwrap().unwrap();
        assert_eq!(loaded.title, "Ship release");
        assert_eq!(loaded.assigned_to, vec![assignee]);

        assert!(db.delete_task(task.id).unwrap());
        assert!(db.get_task(task.id).unwrap().is_none());
        assert!(!db.delete_task(task.id).unwrap());

        cleanup(&path);
    }

    #[test]
    fn list_is_sorted_most_recent_first() {
        let (db, path) = temp_db("list_sorted");

        let assignee = Uuid::new_v4();
        db.create_task(&sample_task("oldest", assignee, TaskStatus::Pending, 30))
            .unwrap();
        db.create_task(&sample_task("newest", assignee, TaskStatus::Pending, 0))
            .unwrap();
        db.create_task(&sample_task("middle", assignee, TaskStatus::Pending, 10))
            .unwrap();

        let tasks = db.list_tasks().unwrap();
        let titles: Vec<&str> = tasks.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["newest", "middle", "oldest"]);

        cleanup(&path);
    }

    #[test]
    fn filtered_list_scopes_by_assignee_and_status() {
        let (db, path) = temp_db("filtered");

        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();

        db.create_task(&sample_task("u1 pending", u1, TaskStatus::Pending, 0))
            .unwrap();
        db.create_task(&sample_task("u1 done", u1, TaskStatus::Completed, 1))
            .unwrap();
        db.create_task(&sample_task("u2 pending", u2, TaskStatus::Pending, 2))
            .unwrap();

        // Shared task counts for both assignees
        let mut shared = sample_task("shared", u1, TaskStatus::InProgress, 3);
        shared.assigned_to = vec![u1, u2];
        db.create_task(&shared).unwrap();

        let u1_tasks = db.list_tasks_filtered(None, Some(u1)).unwrap();
        assert_eq!(u1_tasks.len(), 3);
        assert!(u1_tasks.iter().all(|t| t.assigned_to.contains(&u1)));

        let u1_pending = db
            .list_tasks_filtered(Some(TaskStatus::Pending), Some(u1))
            .unwrap();
        assert_eq!(u1_pending.len(), 1);
        assert_eq!(u1_pending[0].title, "u1 pending");

        assert_eq!(db.count_tasks(Some(u2), None).unwrap(), 2);
        assert_eq!(
            db.count_tasks(Some(u2), Some(TaskStatus::InProgress)).unwrap(),
            1
        );
        assert_eq!(db.count_tasks(None, None).unwrap(), 4);

        cleanup(&path);
    }
}
