//! Read path. Queries take partition read locks only; writers on other
//! consultants are never blocked.

use chrono::NaiveDate;
use ulid::Ulid;

use crate::index::{merge_overlapping, subtract_intervals};
use crate::limits;
use crate::model::*;

use super::conflict::{self, Candidate, ConflictResult};
use super::{EngineError, Scheduler};

fn check_query_span(span: &Span) -> Result<(), EngineError> {
    if span.duration_ms() > limits::MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window"));
    }
    Ok(())
}

impl Scheduler {
    pub async fn window(&self, id: Ulid) -> Result<AvailabilityWindow, EngineError> {
        let owner = self
            .window_owner
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let cs = self.try_consultant(&owner).ok_or(EngineError::NotFound(id))?;
        let state = cs.read().await;
        state.windows.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// All windows of one consultant, sorted by start date.
    pub async fn windows_for(&self, owner_id: Ulid) -> Vec<AvailabilityWindow> {
        let Some(cs) = self.try_consultant(&owner_id) else {
            return Vec::new();
        };
        let state = cs.read().await;
        let mut windows: Vec<AvailabilityWindow> = state.windows.values().cloned().collect();
        windows.sort_by_key(|w| (w.start_date, w.id));
        windows
    }

    pub async fn schedule(&self, id: Ulid) -> Result<Schedule, EngineError> {
        let shared = self
            .schedules
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        let guard = shared.read().await;
        Ok(guard.clone())
    }

    pub async fn schedules_for_project(&self, project_id: Ulid) -> Vec<Schedule> {
        let shared: Vec<_> = self.schedules.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for s in shared {
            let guard = s.read().await;
            if guard.project_id == project_id {
                out.push(guard.clone());
            }
        }
        out.sort_by_key(|s| (s.start_date, s.id));
        out
    }

    pub async fn assignment(&self, id: Ulid) -> Result<Assignment, EngineError> {
        let owner = self
            .assignment_owner
            .get(&id)
            .map(|e| *e.value())
            .ok_or(EngineError::NotFound(id))?;
        let cs = self.try_consultant(&owner).ok_or(EngineError::NotFound(id))?;
        let state = cs.read().await;
        state.assignments.get(&id).cloned().ok_or(EngineError::NotFound(id))
    }

    pub async fn assignments_for_schedule(&self, schedule_id: Ulid) -> Vec<Assignment> {
        let ids: Vec<Ulid> = self
            .schedule_assignments
            .get(&schedule_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut out = Vec::new();
        for id in ids {
            if let Ok(a) = self.assignment(id).await {
                out.push(a);
            }
        }
        out.sort_by_key(|a| (a.date, a.start_time, a.id));
        out
    }

    pub async fn assignments_for_consultant(&self, consultant_id: Ulid) -> Vec<Assignment> {
        let Some(cs) = self.try_consultant(&consultant_id) else {
            return Vec::new();
        };
        let state = cs.read().await;
        let mut out: Vec<Assignment> = state.assignments.values().cloned().collect();
        out.sort_by_key(|a| (a.date, a.start_time, a.id));
        out
    }

    /// Concrete occurrences (window expansions and active bookings) of one
    /// consultant within a date range.
    pub async fn occurrences(
        &self,
        owner_id: Ulid,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<IndexEntry>, EngineError> {
        let span = day_span_checked(range_start, range_end)?;
        check_query_span(&span)?;

        let Some(cs) = self.try_consultant(&owner_id) else {
            return Ok(Vec::new());
        };
        let state = cs.read().await;
        Ok(state.overlapping(&span).copied().collect())
    }

    /// Free slots of one consultant in a date range: merged `available`
    /// occurrences minus `unavailable` time minus active bookings.
    pub async fn free_spans(
        &self,
        owner_id: Ulid,
        range_start: NaiveDate,
        range_end: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        let span = day_span_checked(range_start, range_end)?;
        check_query_span(&span)?;

        let Some(cs) = self.try_consultant(&owner_id) else {
            return Ok(Vec::new());
        };
        let state = cs.read().await;

        let available = state.available_spans(&span, None);
        let mut blocked: Vec<Span> = state
            .overlapping(&span)
            .filter(|e| match e.kind {
                EntryKind::Availability(t) => t == AvailabilityType::Unavailable,
                EntryKind::Booking(s) => s.blocks_time(),
            })
            .filter_map(|e| e.span.clamp_to(&span))
            .collect();
        blocked.sort_by_key(|s| s.start);
        let blocked = merge_overlapping(&blocked);

        Ok(subtract_intervals(&available, &blocked))
    }

    /// Dry-run conflict check for a prospective booking slot. Nothing is
    /// committed; the caller sees exactly what `create_assignment` would
    /// reject.
    pub async fn probe_booking(
        &self,
        consultant_id: Ulid,
        date: NaiveDate,
        start_time: chrono::NaiveTime,
        end_time: chrono::NaiveTime,
    ) -> Result<ConflictResult, EngineError> {
        if end_time <= start_time {
            return Err(EngineError::Validation(vec![super::FieldError::new(
                "endTime",
                "must be after startTime",
            )]));
        }
        let span = timed_span(date, start_time, end_time);

        let Some(cs) = self.try_consultant(&consultant_id) else {
            // No partition means no availability at all — one coverage gap.
            return Ok(ConflictResult {
                ok: false,
                conflicts: vec![super::ConflictEntry::NoAvailability { span }],
            });
        };
        let state = cs.read().await;
        Ok(conflict::check(&state, &span, Candidate::Booking, None))
    }
}

fn day_span_checked(start: NaiveDate, end: NaiveDate) -> Result<Span, EngineError> {
    if end < start {
        return Err(EngineError::Validation(vec![super::FieldError::new(
            "endDate",
            "must not precede startDate",
        )]));
    }
    Ok(day_span(start, end))
}
