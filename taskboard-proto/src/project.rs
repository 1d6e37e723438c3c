//! Project metadata and slug generation.
//!
//! A project owns one task collection and one persisted document. Slugs are
//! derived from the project name plus a random suffix so creation never
//! needs a uniqueness round-trip against existing projects.

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Minimum allowed project name length in characters.
pub const MIN_PROJECT_NAME_LENGTH: usize = 3;

/// Maximum allowed project name length in characters.
pub const MAX_PROJECT_NAME_LENGTH: usize = 100;

/// Length of the random slug suffix.
const SLUG_SUFFIX_LENGTH: usize = 8;

const SLUG_SUFFIX_CHARSET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// A dashboard project: one board, one task collection, one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Unique project identifier (UUID v7, time-ordered).
    pub id: Uuid,
    /// URL-safe unique identifier, generated from the name.
    pub slug: String,
    /// Human-readable project name.
    pub name: String,
    /// Optional free-form description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// When the project was created.
    pub created_at: DateTime<Utc>,
    /// When an external sync last replaced this project's tasks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Creates a new project with a freshly generated slug.
    #[must_use]
    pub fn new(name: &str, description: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            slug: generate_slug(name),
            name: name.to_string(),
            description,
            created_at: now,
            last_sync_at: None,
        }
    }

    /// Validates a project name against the length bounds.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message if the name is too short or too
    /// long (counted in characters, not bytes).
    pub fn validate_name(name: &str) -> Result<(), String> {
        let len = name.chars().count();
        if len < MIN_PROJECT_NAME_LENGTH {
            return Err(format!("minimum {MIN_PROJECT_NAME_LENGTH} characters"));
        }
        if len > MAX_PROJECT_NAME_LENGTH {
            return Err(format!("maximum {MAX_PROJECT_NAME_LENGTH} characters"));
        }
        Ok(())
    }
}

/// Generates a URL-safe slug: the lowercased name with non-alphanumeric
/// runs collapsed to `-`, followed by a random 8-character suffix
/// (e.g. `my-project-k3x90ab2`).
#[must_use]
pub fn generate_slug(name: &str) -> String {
    let base = slug_base(name);
    let suffix = random_suffix();
    if base.is_empty() {
        suffix
    } else {
        format!("{base}-{suffix}")
    }
}

/// Lowercases the name and collapses every non-alphanumeric run into a
/// single `-`, trimming leading and trailing dashes.
fn slug_base(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending_dash = false;
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(c.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

fn random_suffix() -> String {
    let mut rng = rand::rng();
    (0..SLUG_SUFFIX_LENGTH)
        .map(|_| {
            let idx = rng.random_range(0..SLUG_SUFFIX_CHARSET.len());
            SLUG_SUFFIX_CHARSET[idx] as char
        })
        .collect()
}
