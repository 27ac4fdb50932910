//! Request/response contract consumed by the surrounding API layer.
//! Drafts are the write-path inputs; the engine owns ids, versions and
//! timestamps. Field names serialize in the wire's camelCase.

use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;
use crate::model::{AssignmentStatus, AvailabilityType, RecurringPattern, ScheduleStatus};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDraft {
    pub owner_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub day_of_week: Option<Weekday>,
    #[serde(default)]
    pub start_time: Option<NaiveTime>,
    #[serde(default)]
    pub end_time: Option<NaiveTime>,
    pub availability_type: AvailabilityType,
    #[serde(default)]
    pub is_recurring: bool,
    #[serde(default)]
    pub recurring_pattern: Option<RecurringPattern>,
    #[serde(default)]
    pub recurring_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleDraft {
    pub project_id: Ulid,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub shift_type: String,
    pub hours_per_week: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDraft {
    pub schedule_id: Ulid,
    pub consultant_id: Ulid,
    pub role: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    #[serde(default)]
    pub notes: Option<String>,
}

/// `PATCH {status, confirm?}` body for status transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleStatusChange {
    pub status: ScheduleStatus,
    #[serde(default)]
    pub confirm: bool,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentStatusChange {
    pub status: AssignmentStatus,
    #[serde(default)]
    pub expected_version: Option<u64>,
}

// ── Bulk operations ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkDeleteRequest {
    pub ids: Vec<Ulid>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkStatusRequest {
    pub ids: Vec<Ulid>,
    pub status: AssignmentStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkFailure {
    pub id: Ulid,
    pub reason: String,
}

/// Aggregate of a per-item bulk operation — never all-or-nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkOutcome {
    pub succeeded: Vec<Ulid>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    pub fn record(&mut self, id: Ulid, result: Result<(), EngineError>) {
        match result {
            Ok(()) => self.succeeded.push(id),
            Err(e) => self.failed.push(BulkFailure { id, reason: e.to_string() }),
        }
    }
}

/// HTTP status the caller should surface for an engine error.
pub fn http_status(err: &EngineError) -> u16 {
    match err {
        EngineError::NotFound(_) => 404,
        EngineError::Validation(_)
        | EngineError::InvalidRecurrence(_)
        | EngineError::LimitExceeded(_) => 422,
        EngineError::AlreadyExists(_)
        | EngineError::Conflict(_)
        | EngineError::StaleVersion { .. }
        | EngineError::ActiveAssignments(_)
        | EngineError::DependentAssignments(_)
        | EngineError::InvalidTransition { .. } => 409,
        EngineError::Store(_) => 503,
    }
}
