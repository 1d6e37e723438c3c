//! File-backed project documents with self-echo suppression.
//!
//! Each project persists as one JSON document at `<data_dir>/<slug>.json`,
//! shaped exactly like the wire [`Snapshot`]. Writes go to a `.tmp` sibling
//! and are renamed into place, so an observer (including our own watcher)
//! never reads a half-written document.
//!
//! Every self-write arms that document's [`EchoGuard`] — a one-shot token
//! the watcher consumes to tell "our own write landed" apart from a real
//! external edit. Without it the watcher would re-broadcast every write the
//! server itself makes, looping forever.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;
use serde::Serialize;
use taskboard_proto::task::Snapshot;
use tokio::sync::RwLock;

/// Errors from reading or writing persisted state.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Failed to read a document.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to write a document.
    #[error("failed to write {path}: {source}")]
    Write {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A document exists but does not parse.
    #[error("failed to parse {path}: {source}")]
    Parse {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// A value could not be serialized.
    #[error("failed to encode {path}: {source}")]
    Encode {
        /// Destination path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// One-shot "ignore the next observed change" token for a single document.
///
/// Armed by the writer immediately before its change notification can fire,
/// consumed (atomically, exactly once) by the watcher. An atomic swap keeps
/// arm/consume race-free without a lock.
#[derive(Debug, Default)]
pub struct EchoGuard(AtomicBool);

impl EchoGuard {
    /// Arms the guard: the next consume returns `true`.
    pub fn arm(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Consumes the token. Returns `true` exactly once per arm.
    pub fn consume(&self) -> bool {
        self.0.swap(false, Ordering::SeqCst)
    }
}

/// Store for per-project documents under one data directory.
pub struct DocumentStore {
    root: PathBuf,
    guards: RwLock<HashMap<String, Arc<EchoGuard>>>,
}

impl DocumentStore {
    /// Creates a store rooted at `root`. The directory is expected to
    /// exist (startup creates it).
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            guards: RwLock::new(HashMap::new()),
        }
    }

    /// The watched data directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path of a project's document.
    #[must_use]
    pub fn document_path(&self, slug: &str) -> PathBuf {
        self.root.join(format!("{slug}.json"))
    }

    /// Returns the echo guard for a slug, creating it on first use.
    pub async fn guard(&self, slug: &str) -> Arc<EchoGuard> {
        {
            let guards = self.guards.read().await;
            if let Some(guard) = guards.get(slug) {
                return Arc::clone(guard);
            }
        }
        let mut guards = self.guards.write().await;
        Arc::clone(guards.entry(slug.to_string()).or_default())
    }

    /// Reads and parses a project's document.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] (including for a missing file) or
    /// [`StorageError::Parse`].
    pub async fn read(&self, slug: &str) -> Result<Snapshot, StorageError> {
        let path = self.document_path(slug);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|source| StorageError::Read {
                path: path.clone(),
                source,
            })?;
        serde_json::from_str(&text).map_err(|source| StorageError::Parse { path, source })
    }

    /// Writes a project's document atomically, arming the slug's echo
    /// guard so the watcher skips the resulting change notification.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] on encode or I/O failure; the guard is
    /// disarmed again in that case since no notification will follow.
    pub async fn write(&self, slug: &str, snapshot: &Snapshot) -> Result<(), StorageError> {
        let guard = self.guard(slug).await;
        guard.arm();
        let result = write_json_atomic(&self.document_path(slug), snapshot).await;
        if result.is_err() {
            guard.consume();
        }
        result
    }

    /// Returns whether a project's document exists on disk.
    pub async fn exists(&self, slug: &str) -> bool {
        tokio::fs::try_exists(self.document_path(slug))
            .await
            .unwrap_or(false)
    }

    /// Creates the empty default document for a project if absent,
    /// returning the document now on disk.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the existing document cannot be read or
    /// the default cannot be written.
    pub async fn ensure_exists(
        &self,
        slug: &str,
        project_name: &str,
    ) -> Result<Snapshot, StorageError> {
        if self.exists(slug).await {
            return self.read(slug).await;
        }
        let empty = Snapshot::empty(project_name, Utc::now());
        self.write(slug, &empty).await?;
        Ok(empty)
    }
}

/// Serializes `value` and writes it to `path` via a `.tmp` sibling and
/// rename, so no reader ever observes a partial file.
pub(crate) async fn write_json_atomic<T: Serialize>(
    path: &Path,
    value: &T,
) -> Result<(), StorageError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|source| StorageError::Encode {
            path: path.to_path_buf(),
            source,
        })?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, text)
        .await
        .map_err(|source| StorageError::Write {
            path: tmp.clone(),
            source,
        })?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|source| StorageError::Write {
            path: path.to_path_buf(),
            source,
        })
}
