//! Task model and snapshot document for Taskboard.
//!
//! A [`Task`] is one card on the board; a [`Snapshot`] is the full ordered
//! task collection for a project. Snapshots are the unit of transfer to
//! viewers and the shape of the persisted per-project document — there is
//! no delta format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a task on the board, one column each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task has not been started.
    Pending,
    /// Task is actively being worked on.
    InProgress,
    /// Task has been finished.
    Completed,
}

impl TaskStatus {
    /// Parses a wire-form status string (`pending`, `in_progress`,
    /// `completed`).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A single task mirrored from the external coding-assistant tool.
///
/// `id` is caller-assigned and unique within a project. `position` is the
/// dense zero-based display order assigned by the last full-replace sync;
/// a status-only move never changes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Caller-assigned identifier, unique within the project.
    pub id: String,
    /// Task description shown on the card.
    pub content: String,
    /// Present-progressive label shown while the task is in progress.
    pub active_form: String,
    /// Current board column.
    pub status: TaskStatus,
    /// Free-form labels.
    #[serde(default)]
    pub tags: Vec<String>,
    /// When the external tool created the task.
    pub created_at: DateTime<Utc>,
    /// When the task was last modified (sync or move).
    pub updated_at: DateTime<Utc>,
    /// Dense zero-based display order within the project.
    pub position: u32,
}

/// The full task collection for one project, as delivered to viewers and
/// as persisted on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Display name of the owning project.
    pub project: String,
    /// When this collection last changed.
    pub last_updated: DateTime<Utc>,
    /// All tasks, ordered by `position` ascending.
    pub tasks: Vec<Task>,
}

impl Snapshot {
    /// Creates an empty snapshot for a project, used as the default
    /// document on first run.
    #[must_use]
    pub fn empty(project: &str, now: DateTime<Utc>) -> Self {
        Self {
            project: project.to_string(),
            last_updated: now,
            tasks: Vec::new(),
        }
    }
}
