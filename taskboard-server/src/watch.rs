//! File-observation change source for externally edited documents.
//!
//! Watches the data directory for changes to `<slug>.json` documents.
//! notify callbacks run on a notify-internal thread; events are forwarded
//! to a tokio mpsc channel and processed on the async executor. Bursts of
//! events for one file (editors and atomic renames produce several) are
//! debounced into a single dirty mark per slug, then each dirty slug is
//! checked against its echo token: a consumed token means the change was
//! our own write and is skipped, anything else is read, parsed, and
//! applied as an external sync.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::docs::DocumentStore;
use crate::engine::SyncEngine;
use crate::projects::ProjectRegistry;

/// Quiescence window before a burst of change events is processed.
const DEBOUNCE_WINDOW: Duration = Duration::from_millis(150);

/// Handle to the running watcher task.
pub struct DocumentWatcher {
    handle: tokio::task::JoinHandle<()>,
}

impl DocumentWatcher {
    /// Starts watching the document store's data directory on a background
    /// task.
    ///
    /// # Errors
    ///
    /// Returns a [`notify::Error`] if the platform watcher cannot be
    /// created or the directory cannot be watched.
    pub fn spawn(
        engine: Arc<SyncEngine>,
        docs: Arc<DocumentStore>,
        projects: Arc<ProjectRegistry>,
    ) -> Result<Self, notify::Error> {
        let (tx, rx) = mpsc::channel::<Result<Event, notify::Error>>(64);

        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.blocking_send(res);
            },
            Config::default(),
        )?;
        watcher.watch(docs.root(), RecursiveMode::NonRecursive)?;
        tracing::info!(path = %docs.root().display(), "watching data directory");

        let handle = tokio::spawn(run_loop(watcher, rx, engine, docs, projects));
        Ok(Self { handle })
    }

    /// Stops the watcher task.
    pub fn abort(&self) {
        self.handle.abort();
    }
}

async fn run_loop(
    watcher: RecommendedWatcher,
    mut rx: mpsc::Receiver<Result<Event, notify::Error>>,
    engine: Arc<SyncEngine>,
    docs: Arc<DocumentStore>,
    projects: Arc<ProjectRegistry>,
) {
    // Keep the watcher alive for the duration of the task.
    let _watcher = watcher;
    let mut dirty: HashSet<String> = HashSet::new();

    loop {
        if dirty.is_empty() {
            match rx.recv().await {
                Some(event) => collect_slugs(event, &mut dirty),
                None => break,
            }
        } else {
            match tokio::time::timeout(DEBOUNCE_WINDOW, rx.recv()).await {
                Ok(Some(event)) => collect_slugs(event, &mut dirty),
                Ok(None) => {
                    flush(&mut dirty, &engine, &docs, &projects).await;
                    break;
                }
                Err(_) => flush(&mut dirty, &engine, &docs, &projects).await,
            }
        }
    }
}

/// Marks the slugs of changed `.json` documents as dirty. The registry
/// file and temp files are not documents and are ignored.
fn collect_slugs(event: Result<Event, notify::Error>, dirty: &mut HashSet<String>) {
    let event = match event {
        Ok(event) => event,
        Err(e) => {
            tracing::warn!(error = %e, "document watcher error");
            return;
        }
    };
    if !matches!(event.kind, EventKind::Create(_) | EventKind::Modify(_)) {
        return;
    }
    for path in &event.paths {
        if let Some(slug) = document_slug(path) {
            dirty.insert(slug);
        }
    }
}

/// Extracts a document slug from a changed path, rejecting anything that
/// is not a per-project `.json` document.
fn document_slug(path: &Path) -> Option<String> {
    if path.extension().and_then(|e| e.to_str()) != Some("json") {
        return None;
    }
    let stem = path.file_stem().and_then(|s| s.to_str())?;
    if stem == "projects" {
        return None;
    }
    Some(stem.to_string())
}

async fn flush(
    dirty: &mut HashSet<String>,
    engine: &Arc<SyncEngine>,
    docs: &Arc<DocumentStore>,
    projects: &Arc<ProjectRegistry>,
) {
    for slug in dirty.drain() {
        if docs.guard(&slug).await.consume() {
            tracing::debug!(slug = %slug, "own write, change suppressed");
            continue;
        }
        let Some(project) = projects.get_by_slug(&slug).await else {
            tracing::warn!(slug = %slug, "document for unknown project, ignoring");
            continue;
        };
        let doc = match docs.read(&slug).await {
            Ok(doc) => doc,
            Err(e) => {
                tracing::warn!(slug = %slug, error = %e, "failed to read changed document");
                continue;
            }
        };
        tracing::info!(slug = %slug, tasks = doc.tasks.len(), "external document change");
        if let Err(e) = engine.apply_watched_sync(project.id, doc.tasks).await {
            tracing::warn!(slug = %slug, error = %e, "failed to apply watched change");
        }
    }
}
