//! In-memory canonical task collections, one per project.
//!
//! The [`TaskStore`] is the single authority for what tasks a project has.
//! Mutations replace or update entries under a write lock, so a reader
//! never observes a partially-replaced collection. Persistence and
//! broadcasting are the engine's concern; the store is purely the
//! authoritative state.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use taskboard_proto::task::{Task, TaskStatus};
use tokio::sync::RwLock;
use uuid::Uuid;

/// Counts returned by a full-replace sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaceOutcome {
    /// Number of tasks upserted from the payload.
    pub synced: usize,
    /// Number of previously-stored tasks absent from the payload.
    pub deleted: usize,
}

/// Errors returned by store mutations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    /// The task does not exist in the given project.
    #[error("task not found: {0}")]
    TaskNotFound(String),
}

/// Per-project ordered task collections behind one [`RwLock`].
pub struct TaskStore {
    tasks: RwLock<HashMap<Uuid, Vec<Task>>>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Replaces a project's entire collection with `incoming`.
    ///
    /// Every stored task whose id is absent from `incoming` is deleted;
    /// every incoming task is inserted or overwritten with `position`
    /// assigned from its index in the sequence. The swap happens under a
    /// single write lock, so readers see either the old or the new
    /// collection, never a mix.
    #[allow(clippy::cast_possible_truncation)]
    pub async fn replace_all(&self, project_id: Uuid, mut incoming: Vec<Task>) -> ReplaceOutcome {
        for (index, task) in incoming.iter_mut().enumerate() {
            task.position = index as u32;
        }
        let incoming_ids: HashSet<&str> = incoming.iter().map(|t| t.id.as_str()).collect();

        let mut tasks = self.tasks.write().await;
        let existing = tasks.entry(project_id).or_default();
        let deleted = existing
            .iter()
            .filter(|t| !incoming_ids.contains(t.id.as_str()))
            .count();
        let synced = incoming.len();
        *existing = incoming;
        drop(tasks);

        ReplaceOutcome { synced, deleted }
    }

    /// Updates only `status` and `updatedAt` of one task. `position` and
    /// every other task are untouched.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::TaskNotFound`] if the task does not exist in
    /// the project (an unknown project behaves as an empty one).
    pub async fn update_status(
        &self,
        project_id: Uuid,
        task_id: &str,
        new_status: TaskStatus,
        now: DateTime<Utc>,
    ) -> Result<Task, StoreError> {
        let mut tasks = self.tasks.write().await;
        let task = tasks
            .get_mut(&project_id)
            .and_then(|list| list.iter_mut().find(|t| t.id == task_id))
            .ok_or_else(|| StoreError::TaskNotFound(task_id.to_string()))?;
        task.status = new_status;
        task.updated_at = now;
        let updated = task.clone();
        drop(tasks);
        Ok(updated)
    }

    /// Returns a project's tasks ordered by `position` ascending. Unknown
    /// projects yield an empty list.
    pub async fn list(&self, project_id: Uuid) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        tasks.get(&project_id).cloned().unwrap_or_default()
    }

    /// Returns one task by id, if present.
    pub async fn get(&self, project_id: Uuid, task_id: &str) -> Option<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&project_id)
            .and_then(|list| list.iter().find(|t| t.id == task_id))
            .cloned()
    }
}
