//! Inbound webhook sync payload and field-level validation.
//!
//! The external coding-assistant tool POSTs its complete task list as one
//! payload. Validation is all-or-nothing: any invalid field fails the whole
//! call with per-field details and no mutation happens. Fields are kept as
//! loose optionals at the serde layer so that missing or malformed values
//! surface as structured [`FieldError`]s instead of an opaque parse error.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskStatus};

/// One validation failure, addressed by the JSON path of the bad field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    /// JSON path of the offending field (e.g. `tasks[2].status`).
    pub field: String,
    /// Human-readable description of the problem.
    pub message: String,
}

impl FieldError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// The complete sync payload for `POST /webhook/{projectSlug}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncPayload {
    /// Project display name as the external tool knows it.
    #[serde(default)]
    pub project: Option<String>,
    /// When the external tool last updated its list (RFC 3339).
    #[serde(default)]
    pub last_updated: Option<String>,
    /// The full task list; replaces the stored collection.
    #[serde(default)]
    pub tasks: Vec<TaskPayload>,
}

/// One task entry in a sync payload, unvalidated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub active_form: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

impl SyncPayload {
    /// Validates the whole payload and converts it into ordered [`Task`]s
    /// with `position` assigned from the payload order.
    ///
    /// # Errors
    ///
    /// Returns every field failure found; the payload must be applied
    /// all-or-nothing, so a single error rejects the entire sync.
    pub fn validate(&self) -> Result<Vec<Task>, Vec<FieldError>> {
        let mut errors = Vec::new();

        if self.project.as_deref().is_none_or(str::is_empty) {
            errors.push(FieldError::new("project", "required"));
        }
        match self.last_updated.as_deref() {
            None => errors.push(FieldError::new("lastUpdated", "required")),
            Some(raw) => {
                if parse_timestamp(raw).is_none() {
                    errors.push(FieldError::new("lastUpdated", "invalid RFC 3339 timestamp"));
                }
            }
        }

        let mut tasks = Vec::with_capacity(self.tasks.len());
        for (index, entry) in self.tasks.iter().enumerate() {
            if let Some(task) = entry.validate(index, &mut errors) {
                tasks.push(task);
            }
        }

        if errors.is_empty() { Ok(tasks) } else { Err(errors) }
    }
}

impl TaskPayload {
    /// Validates one entry, pushing failures onto `errors`. Returns the
    /// converted task only when every field of this entry is valid.
    #[allow(clippy::cast_possible_truncation)]
    fn validate(&self, index: usize, errors: &mut Vec<FieldError>) -> Option<Task> {
        let at = |field: &str| format!("tasks[{index}].{field}");
        let before = errors.len();

        if self.id.as_deref().is_none_or(str::is_empty) {
            errors.push(FieldError::new(at("id"), "required"));
        }
        if self.content.is_none() {
            errors.push(FieldError::new(at("content"), "required"));
        }
        if self.active_form.is_none() {
            errors.push(FieldError::new(at("activeForm"), "required"));
        }

        let status = match self.status.as_deref() {
            None => {
                errors.push(FieldError::new(at("status"), "required"));
                None
            }
            Some(raw) => {
                let parsed = TaskStatus::parse(raw);
                if parsed.is_none() {
                    errors.push(FieldError::new(
                        at("status"),
                        "expected pending, in_progress or completed",
                    ));
                }
                parsed
            }
        };
        let created_at = validate_timestamp(self.created_at.as_deref(), &at("createdAt"), errors);
        let updated_at = validate_timestamp(self.updated_at.as_deref(), &at("updatedAt"), errors);

        if errors.len() > before {
            return None;
        }
        // All required fields verified present above.
        Some(Task {
            id: self.id.clone()?,
            content: self.content.clone()?,
            active_form: self.active_form.clone()?,
            status: status?,
            tags: self.tags.clone().unwrap_or_default(),
            created_at: created_at?,
            updated_at: updated_at?,
            position: index as u32,
        })
    }
}

fn validate_timestamp(
    raw: Option<&str>,
    field: &str,
    errors: &mut Vec<FieldError>,
) -> Option<DateTime<Utc>> {
    match raw {
        None => {
            errors.push(FieldError::new(field, "required"));
            None
        }
        Some(raw) => {
            let parsed = parse_timestamp(raw);
            if parsed.is_none() {
                errors.push(FieldError::new(field, "invalid RFC 3339 timestamp"));
            }
            parsed
        }
    }
}

/// Parses an RFC 3339 timestamp into UTC.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
