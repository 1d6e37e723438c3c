//! Sync engine: the single write path for every project mutation.
//!
//! All three write paths — webhook sync, watched-file sync, and client
//! moves — funnel through here. The engine serializes mutations per
//! project (cross-project work never contends), persists the document
//! before committing the in-memory store so a storage failure leaves the
//! previous consistent state authoritative, keeps the process-wide
//! snapshot cache, and publishes every successful mutation to the hub.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use taskboard_proto::realtime::ServerMessage;
use taskboard_proto::task::{Snapshot, Task, TaskStatus};
use taskboard_proto::webhook::FieldError;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

use crate::docs::{DocumentStore, StorageError};
use crate::hub::{SubscriberHub, SubscriptionHandle};
use crate::projects::ProjectRegistry;
use crate::store::{ReplaceOutcome, TaskStore};

/// Errors surfaced by engine operations, mirroring the REST taxonomy.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// The inbound payload failed validation; no mutation happened.
    #[error("invalid payload")]
    Validation(Vec<FieldError>),

    /// The referenced project does not exist.
    #[error("project not found")]
    ProjectNotFound,

    /// The referenced task does not exist in the project.
    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Persistence failed; the previous state remains authoritative.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Orchestrates mutations, snapshot caching, and fanout for all projects.
pub struct SyncEngine {
    store: Arc<TaskStore>,
    projects: Arc<ProjectRegistry>,
    docs: Arc<DocumentStore>,
    hub: Arc<SubscriberHub>,
    /// Per-project serialization locks. The outer lock is held only long
    /// enough to fetch or create the project's own mutex.
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    /// Process-wide cache of the latest snapshot per project.
    snapshots: RwLock<HashMap<Uuid, Snapshot>>,
}

impl SyncEngine {
    /// Wires the engine to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<TaskStore>,
        projects: Arc<ProjectRegistry>,
        docs: Arc<DocumentStore>,
        hub: Arc<SubscriberHub>,
    ) -> Self {
        Self {
            store,
            projects,
            docs,
            hub,
            locks: Mutex::new(HashMap::new()),
            snapshots: RwLock::new(HashMap::new()),
        }
    }

    /// The hub this engine publishes to.
    #[must_use]
    pub fn hub(&self) -> &Arc<SubscriberHub> {
        &self.hub
    }

    /// Applies a full-collection replacement from the push source
    /// (webhook). Persists the document, commits the store, stamps
    /// `lastSyncAt`, and broadcasts the new snapshot.
    ///
    /// # Errors
    ///
    /// [`SyncError::ProjectNotFound`] for an unknown project,
    /// [`SyncError::Storage`] if persistence fails (no mutation happens).
    pub async fn apply_external_sync(
        &self,
        project_id: Uuid,
        tasks: Vec<Task>,
    ) -> Result<ReplaceOutcome, SyncError> {
        self.apply_replace(project_id, tasks, true).await
    }

    /// Applies a full-collection replacement observed by the file watcher.
    /// The document on disk is already the new content, so nothing is
    /// persisted (and no echo token is armed).
    ///
    /// # Errors
    ///
    /// [`SyncError::ProjectNotFound`] for an unknown project.
    pub async fn apply_watched_sync(
        &self,
        project_id: Uuid,
        tasks: Vec<Task>,
    ) -> Result<ReplaceOutcome, SyncError> {
        self.apply_replace(project_id, tasks, false).await
    }

    async fn apply_replace(
        &self,
        project_id: Uuid,
        mut tasks: Vec<Task>,
        persist: bool,
    ) -> Result<ReplaceOutcome, SyncError> {
        let lock = self.lock_for(project_id).await;
        let _guard = lock.lock().await;

        let project = self
            .projects
            .get(project_id)
            .await
            .ok_or(SyncError::ProjectNotFound)?;
        let stamp = self.next_stamp(project_id).await;

        for (index, task) in tasks.iter_mut().enumerate() {
            task.position = u32::try_from(index).unwrap_or(u32::MAX);
        }
        let snapshot = Snapshot {
            project: project.name.clone(),
            last_updated: stamp,
            tasks: tasks.clone(),
        };

        if persist {
            self.docs.write(&project.slug, &snapshot).await?;
        }
        let outcome = self.store.replace_all(project_id, tasks).await;
        if let Err(e) = self.projects.mark_synced(project_id, stamp).await {
            tracing::warn!(slug = %project.slug, error = %e, "failed to persist sync stamp");
        }
        self.publish(project_id, snapshot).await;

        tracing::info!(
            slug = %project.slug,
            synced = outcome.synced,
            deleted = outcome.deleted,
            "external sync applied"
        );
        Ok(outcome)
    }

    /// Applies a client move: only the task's status and `updatedAt`
    /// change, then the full snapshot is broadcast. `lastSyncAt` is not
    /// stamped — a move is a user action, not an external sync.
    ///
    /// # Errors
    ///
    /// [`SyncError::ProjectNotFound`] / [`SyncError::TaskNotFound`] reject
    /// without mutation or broadcast; [`SyncError::Storage`] if the
    /// document write fails (store untouched).
    pub async fn apply_move(
        &self,
        project_id: Uuid,
        task_id: &str,
        new_status: TaskStatus,
    ) -> Result<Task, SyncError> {
        let lock = self.lock_for(project_id).await;
        let _guard = lock.lock().await;

        let project = self
            .projects
            .get(project_id)
            .await
            .ok_or(SyncError::ProjectNotFound)?;
        let mut tasks = self.store.list(project_id).await;
        let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
            return Err(SyncError::TaskNotFound(task_id.to_string()));
        };

        let stamp = self.next_stamp(project_id).await;
        task.status = new_status;
        task.updated_at = stamp;

        let snapshot = Snapshot {
            project: project.name.clone(),
            last_updated: stamp,
            tasks,
        };
        self.docs.write(&project.slug, &snapshot).await?;

        let updated = self
            .store
            .update_status(project_id, task_id, new_status, stamp)
            .await
            .map_err(|_| SyncError::TaskNotFound(task_id.to_string()))?;
        self.publish(project_id, snapshot).await;

        tracing::info!(
            slug = %project.slug,
            task_id = %task_id,
            status = %new_status,
            "task moved"
        );
        Ok(updated)
    }

    /// Registers a viewer and delivers the current snapshot as `init`
    /// before any future broadcast can reach it. Runs under the project
    /// lock so no mutation can slip between registration and delivery.
    ///
    /// # Errors
    ///
    /// [`SyncError::ProjectNotFound`] for an unknown project.
    pub async fn attach_subscriber(
        &self,
        project_id: Uuid,
        sender: mpsc::UnboundedSender<axum::extract::ws::Message>,
    ) -> Result<SubscriptionHandle, SyncError> {
        let lock = self.lock_for(project_id).await;
        let _guard = lock.lock().await;

        let project = self
            .projects
            .get(project_id)
            .await
            .ok_or(SyncError::ProjectNotFound)?;
        let snapshot = self.current_snapshot(&project.name, project_id).await;

        let handle = self.hub.subscribe(project_id, sender).await;
        let timestamp = snapshot.last_updated;
        self.hub
            .send_to(
                &handle,
                &ServerMessage::Init {
                    data: snapshot,
                    timestamp,
                },
            )
            .await;
        Ok(handle)
    }

    /// Returns the cached snapshot for a project, building and caching one
    /// from the store if none exists yet.
    pub async fn current_snapshot(&self, project_name: &str, project_id: Uuid) -> Snapshot {
        {
            let snapshots = self.snapshots.read().await;
            if let Some(snapshot) = snapshots.get(&project_id) {
                return snapshot.clone();
            }
        }
        let snapshot = Snapshot {
            project: project_name.to_string(),
            last_updated: Utc::now(),
            tasks: self.store.list(project_id).await,
        };
        let mut snapshots = self.snapshots.write().await;
        snapshots
            .entry(project_id)
            .or_insert_with(|| snapshot.clone())
            .clone()
    }

    /// Seeds the store and snapshot cache from the documents on disk.
    /// Missing documents are created empty; unreadable ones are logged
    /// and skipped. Nothing is broadcast — there are no subscribers yet
    /// at startup.
    pub async fn load_from_disk(&self) {
        for project in self.projects.all().await {
            let doc = match self.docs.ensure_exists(&project.slug, &project.name).await {
                Ok(doc) => doc,
                Err(e) => {
                    tracing::warn!(slug = %project.slug, error = %e, "skipping unreadable document");
                    continue;
                }
            };
            let count = doc.tasks.len();
            self.store.replace_all(project.id, doc.tasks.clone()).await;
            let mut snapshots = self.snapshots.write().await;
            snapshots.insert(
                project.id,
                Snapshot {
                    project: project.name.clone(),
                    last_updated: doc.last_updated,
                    tasks: doc.tasks,
                },
            );
            drop(snapshots);
            tracing::info!(slug = %project.slug, tasks = count, "project loaded");
        }
    }

    async fn publish(&self, project_id: Uuid, snapshot: Snapshot) {
        let timestamp = snapshot.last_updated;
        {
            let mut snapshots = self.snapshots.write().await;
            snapshots.insert(project_id, snapshot.clone());
        }
        self.hub
            .broadcast(
                project_id,
                &ServerMessage::Update {
                    data: snapshot,
                    timestamp,
                },
            )
            .await;
    }

    /// Returns the per-project serialization lock, creating it on first
    /// use.
    async fn lock_for(&self, project_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(
            locks
                .entry(project_id)
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }

    /// Next snapshot stamp for a project: wall-clock now, nudged forward
    /// by a millisecond if the clock has not advanced past the previous
    /// stamp, so viewers always observe increasing timestamps.
    async fn next_stamp(&self, project_id: Uuid) -> DateTime<Utc> {
        let now = Utc::now();
        let snapshots = self.snapshots.read().await;
        match snapshots.get(&project_id) {
            Some(prev) if now <= prev.last_updated => {
                prev.last_updated + ChronoDuration::milliseconds(1)
            }
            _ => now,
        }
    }
}
