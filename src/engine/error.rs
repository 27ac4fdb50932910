use ulid::Ulid;

use super::conflict::ConflictEntry;

/// One invalid field in a write request.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self { field, message: message.into() }
    }
}

/// Everything a scheduling operation can fail with. Domain conditions
/// (conflicts, stale versions, transition guards) are values here, never
/// panics — the caller decides how to surface them.
#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Field-level rejection; nothing was applied.
    Validation(Vec<FieldError>),
    /// Recurring window is structurally unusable.
    InvalidRecurrence(&'static str),
    /// Domain-significant overlap; carries every conflicting entry.
    Conflict(Vec<ConflictEntry>),
    /// Optimistic concurrency: the caller must reload and retry.
    StaleVersion { expected: u64, actual: u64 },
    /// Status-transition guard: cancelling needs `confirm` while these
    /// assignments are active.
    ActiveAssignments(Vec<Ulid>),
    /// Deleting the window would strip availability coverage from these
    /// active assignments.
    DependentAssignments(Vec<Ulid>),
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    LimitExceeded(&'static str),
    /// Journal failure; the operation was not applied.
    Store(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Validation(errors) => {
                write!(f, "validation failed:")?;
                for e in errors {
                    write!(f, " {}: {};", e.field, e.message)?;
                }
                Ok(())
            }
            EngineError::InvalidRecurrence(msg) => write!(f, "invalid recurrence: {msg}"),
            EngineError::Conflict(entries) => {
                write!(f, "conflict with {} existing entries", entries.len())
            }
            EngineError::StaleVersion { expected, actual } => {
                write!(f, "stale version: expected {expected}, found {actual}")
            }
            EngineError::ActiveAssignments(ids) => {
                write!(f, "active assignments exist: {}", join_ids(ids))
            }
            EngineError::DependentAssignments(ids) => {
                write!(f, "active assignment depends on this window: {}", join_ids(ids))
            }
            EngineError::InvalidTransition { entity, from, to } => {
                write!(f, "illegal {entity} transition: {from} -> {to}")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Store(e) => write!(f, "store unavailable: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<crate::recurrence::InvalidRecurrence> for EngineError {
    fn from(e: crate::recurrence::InvalidRecurrence) -> Self {
        EngineError::InvalidRecurrence(e.0)
    }
}

fn join_ids(ids: &[Ulid]) -> String {
    ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ")
}
