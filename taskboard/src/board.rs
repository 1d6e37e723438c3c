//! Client-side board state: confirmed snapshots plus optimistic moves.
//!
//! The board is a derived cache of the last server snapshot. A drag is
//! applied optimistically with an explicit pending marker per task; the
//! marker clears when a snapshot confirms the move, and a rollback
//! restores the last confirmed view. This keeps the UI responsive without
//! ever inventing state the server has not acknowledged.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use taskboard_proto::task::{Snapshot, Task, TaskStatus};

/// Errors from board operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum BoardError {
    /// No snapshot has been received yet.
    #[error("no snapshot received yet")]
    NoSnapshot,
    /// The task does not exist in the current view.
    #[error("task not found: {0}")]
    UnknownTask(String),
}

/// Connection status of the realtime channel, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionStatus {
    /// No connection established yet or connection lost.
    #[default]
    Disconnected,
    /// Live channel to the server.
    Connected,
    /// Between reconnect attempts.
    Reconnecting,
}

/// An optimistic, not-yet-confirmed status change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    /// Status in the last confirmed snapshot, restored on rollback.
    pub previous: TaskStatus,
    /// Status the user dragged the task to.
    pub target: TaskStatus,
}

/// Live view of one project's board.
#[derive(Debug, Default)]
pub struct BoardState {
    confirmed: Option<Snapshot>,
    pending: HashMap<String, PendingMove>,
    status: ConnectionStatus,
    last_update: Option<DateTime<Utc>>,
}

impl BoardState {
    /// Creates an empty board awaiting its first snapshot.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a server snapshot (`init` or `update`), replacing the
    /// confirmed view. Pending moves confirmed by the snapshot (or whose
    /// task disappeared) are cleared; the rest keep overlaying the view.
    pub fn apply_snapshot(&mut self, snapshot: Snapshot, timestamp: DateTime<Utc>) {
        self.pending.retain(|task_id, pending| {
            snapshot
                .tasks
                .iter()
                .find(|t| &t.id == task_id)
                .is_some_and(|t| t.status != pending.target)
        });
        self.confirmed = Some(snapshot);
        self.last_update = Some(timestamp);
    }

    /// Records an optimistic move. The view immediately shows the task in
    /// the target column; the caller must roll back if the server call
    /// fails.
    ///
    /// # Errors
    ///
    /// [`BoardError::NoSnapshot`] before the first snapshot,
    /// [`BoardError::UnknownTask`] if the task is not on the board.
    pub fn begin_move(&mut self, task_id: &str, target: TaskStatus) -> Result<(), BoardError> {
        let confirmed = self.confirmed.as_ref().ok_or(BoardError::NoSnapshot)?;
        let task = confirmed
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .ok_or_else(|| BoardError::UnknownTask(task_id.to_string()))?;
        self.pending.insert(
            task_id.to_string(),
            PendingMove {
                previous: task.status,
                target,
            },
        );
        Ok(())
    }

    /// Discards one optimistic move, restoring the confirmed status.
    pub fn rollback(&mut self, task_id: &str) {
        self.pending.remove(task_id);
    }

    /// Discards every optimistic move; used when the connection drops.
    pub fn rollback_all(&mut self) {
        self.pending.clear();
    }

    /// Whether a task has an unconfirmed move.
    #[must_use]
    pub fn is_pending(&self, task_id: &str) -> bool {
        self.pending.contains_key(task_id)
    }

    /// The current view: the confirmed snapshot's tasks with pending
    /// moves overlaid, in position order.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        let Some(confirmed) = &self.confirmed else {
            return Vec::new();
        };
        confirmed
            .tasks
            .iter()
            .map(|task| {
                let mut task = task.clone();
                if let Some(pending) = self.pending.get(&task.id) {
                    task.status = pending.target;
                }
                task
            })
            .collect()
    }

    /// Tasks currently shown in one column.
    #[must_use]
    pub fn tasks_with_status(&self, status: TaskStatus) -> Vec<Task> {
        self.tasks()
            .into_iter()
            .filter(|t| t.status == status)
            .collect()
    }

    /// Display name of the project, once known.
    #[must_use]
    pub fn project_name(&self) -> Option<&str> {
        self.confirmed.as_ref().map(|s| s.project.as_str())
    }

    /// Timestamp of the last applied snapshot.
    #[must_use]
    pub const fn last_update(&self) -> Option<DateTime<Utc>> {
        self.last_update
    }

    /// Current channel status.
    #[must_use]
    pub const fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Updates the channel status shown to the user.
    pub const fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }
}
