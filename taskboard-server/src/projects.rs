//! Project registry: creation, lookup, listing, sync stamps.
//!
//! Projects are kept in memory and persisted as one JSON array at
//! `<data_dir>/projects.json` with the same atomic-write discipline as the
//! task documents. Creation never checks slugs for uniqueness — the random
//! suffix makes collisions a non-concern.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use taskboard_proto::project::Project;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::docs::{StorageError, write_json_atomic};

/// Default maximum number of projects returned by a listing.
pub const DEFAULT_LIST_LIMIT: usize = 20;

/// In-memory project directory backed by `projects.json`.
pub struct ProjectRegistry {
    path: PathBuf,
    projects: RwLock<HashMap<Uuid, Project>>,
}

impl ProjectRegistry {
    /// Loads the registry from `path`, starting empty if the file does
    /// not exist yet.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read or
    /// parsed.
    pub async fn load(path: PathBuf) -> Result<Self, StorageError> {
        let projects = match tokio::fs::read_to_string(&path).await {
            Ok(text) => {
                let list: Vec<Project> =
                    serde_json::from_str(&text).map_err(|source| StorageError::Parse {
                        path: path.clone(),
                        source,
                    })?;
                list.into_iter().map(|p| (p.id, p)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(source) => {
                return Err(StorageError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };
        Ok(Self {
            path,
            projects: RwLock::new(projects),
        })
    }

    /// Creates and persists a new project.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the registry file cannot be written;
    /// the in-memory registry is left unchanged in that case.
    pub async fn create(
        &self,
        name: &str,
        description: Option<String>,
    ) -> Result<Project, StorageError> {
        let project = Project::new(name, description, Utc::now());
        let mut projects = self.projects.write().await;
        projects.insert(project.id, project.clone());
        if let Err(e) = self.persist(&projects).await {
            projects.remove(&project.id);
            return Err(e);
        }
        drop(projects);
        tracing::info!(slug = %project.slug, name = %project.name, "project created");
        Ok(project)
    }

    /// Returns a project by id.
    pub async fn get(&self, id: Uuid) -> Option<Project> {
        let projects = self.projects.read().await;
        projects.get(&id).cloned()
    }

    /// Returns a project by slug.
    pub async fn get_by_slug(&self, slug: &str) -> Option<Project> {
        let projects = self.projects.read().await;
        projects.values().find(|p| p.slug == slug).cloned()
    }

    /// Stamps a project's `lastSyncAt` after an external sync.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the registry file cannot be written.
    pub async fn mark_synced(&self, id: Uuid, at: DateTime<Utc>) -> Result<(), StorageError> {
        let mut projects = self.projects.write().await;
        if let Some(project) = projects.get_mut(&id) {
            project.last_sync_at = Some(at);
        }
        self.persist(&projects).await
    }

    /// Returns all projects, unordered.
    pub async fn all(&self) -> Vec<Project> {
        let projects = self.projects.read().await;
        projects.values().cloned().collect()
    }

    /// Lists projects matching `search` (case-insensitive substring of the
    /// name or description), most recently synced first, never-synced last,
    /// ties broken by newest creation. At most `limit` entries.
    pub async fn search(&self, search: Option<&str>, limit: usize) -> Vec<Project> {
        let needle = search.map(str::to_lowercase);
        let projects = self.projects.read().await;
        let mut matched: Vec<Project> = projects
            .values()
            .filter(|p| {
                needle.as_deref().is_none_or(|n| {
                    p.name.to_lowercase().contains(n)
                        || p.description
                            .as_deref()
                            .is_some_and(|d| d.to_lowercase().contains(n))
                })
            })
            .cloned()
            .collect();
        drop(projects);

        matched.sort_by(|a, b| match (b.last_sync_at, a.last_sync_at) {
            (Some(x), Some(y)) => x.cmp(&y).then(b.created_at.cmp(&a.created_at)),
            (Some(_), None) => std::cmp::Ordering::Greater,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (None, None) => b.created_at.cmp(&a.created_at),
        });
        matched.truncate(limit);
        matched
    }

    async fn persist(&self, projects: &HashMap<Uuid, Project>) -> Result<(), StorageError> {
        let mut list: Vec<&Project> = projects.values().collect();
        list.sort_by_key(|p| p.created_at);
        write_json_atomic(&self.path, &list).await
    }
}
