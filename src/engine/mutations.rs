//! Write path. Every operation follows the same shape: validate the
//! request, lock the partitions it touches, run the domain checks under
//! the lock, journal the event, apply it in memory. Nothing is applied if
//! the journal append fails.
//!
//! Lock order is always compaction gate, then schedule, then consultant;
//! multi-consultant operations acquire partition locks in sorted owner
//! order.

use std::collections::BTreeMap;

use tokio::sync::OwnedRwLockWriteGuard;
use ulid::Ulid;

use crate::api::{
    AssignmentDraft, AssignmentStatusChange, AvailabilityDraft, BulkOutcome, ScheduleDraft,
    ScheduleStatusChange,
};
use crate::index::ConsultantState;
use crate::limits;
use crate::model::*;

use super::conflict;
use super::error::FieldError;
use super::transitions;
use super::{record_op, EngineError, Scheduler};

fn check_version(expected: Option<u64>, actual: u64) -> Result<(), EngineError> {
    match expected {
        Some(e) if e != actual => Err(EngineError::StaleVersion { expected: e, actual }),
        _ => Ok(()),
    }
}

fn fail_if_any(errors: Vec<FieldError>) -> Result<(), EngineError> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(EngineError::Validation(errors))
    }
}

fn validate_window_draft(draft: &AvailabilityDraft) -> Result<(), EngineError> {
    let mut errors = Vec::new();

    if draft.end_date < draft.start_date {
        errors.push(FieldError::new("endDate", "must not precede startDate"));
    }
    match (draft.start_time, draft.end_time) {
        (Some(s), Some(e)) => {
            if e <= s {
                errors.push(FieldError::new("endTime", "must be after startTime"));
            }
            if draft.day_of_week.is_none() {
                errors.push(FieldError::new("dayOfWeek", "required with startTime/endTime"));
            }
        }
        (Some(_), None) => errors.push(FieldError::new("endTime", "required with startTime")),
        (None, Some(_)) => errors.push(FieldError::new("startTime", "required with endTime")),
        (None, None) => {}
    }
    if !draft.is_recurring && draft.recurring_pattern.is_some() {
        errors.push(FieldError::new(
            "recurringPattern",
            "set on a non-recurring window",
        ));
    }
    if let Some(notes) = &draft.notes
        && notes.len() > limits::MAX_NOTES_LEN
    {
        errors.push(FieldError::new("notes", "too long"));
    }
    if draft.end_date >= draft.start_date {
        let bounds = day_span(draft.start_date, draft.end_date);
        if bounds.start < limits::MIN_VALID_TIMESTAMP_MS
            || bounds.end > limits::MAX_VALID_TIMESTAMP_MS
        {
            errors.push(FieldError::new("startDate", "outside the supported timeline"));
        }
    }

    fail_if_any(errors)
}

fn validate_schedule_draft(draft: &ScheduleDraft) -> Result<(), EngineError> {
    let mut errors = Vec::new();

    if draft.title.trim().is_empty() {
        errors.push(FieldError::new("title", "must not be empty"));
    } else if draft.title.len() > limits::MAX_TITLE_LEN {
        errors.push(FieldError::new("title", "too long"));
    }
    if let Some(d) = &draft.description
        && d.len() > limits::MAX_DESCRIPTION_LEN
    {
        errors.push(FieldError::new("description", "too long"));
    }
    if draft.end_date < draft.start_date {
        errors.push(FieldError::new("endDate", "must not precede startDate"));
    } else {
        let bounds = day_span(draft.start_date, draft.end_date);
        if bounds.start < limits::MIN_VALID_TIMESTAMP_MS
            || bounds.end > limits::MAX_VALID_TIMESTAMP_MS
        {
            errors.push(FieldError::new("startDate", "outside the supported timeline"));
        }
    }
    if draft.shift_type.trim().is_empty() {
        errors.push(FieldError::new("shiftType", "must not be empty"));
    } else if draft.shift_type.len() > limits::MAX_SHIFT_TYPE_LEN {
        errors.push(FieldError::new("shiftType", "too long"));
    }
    if draft.hours_per_week > limits::MAX_HOURS_PER_WEEK {
        errors.push(FieldError::new("hoursPerWeek", "exceeds hours in a week"));
    }

    fail_if_any(errors)
}

fn validate_assignment_draft(draft: &AssignmentDraft) -> Result<(), EngineError> {
    let mut errors = Vec::new();

    if draft.role.trim().is_empty() {
        errors.push(FieldError::new("role", "must not be empty"));
    } else if draft.role.len() > limits::MAX_ROLE_LEN {
        errors.push(FieldError::new("role", "too long"));
    }
    if draft.end_time <= draft.start_time {
        errors.push(FieldError::new("endTime", "must be after startTime"));
    }
    if let Some(notes) = &draft.notes
        && notes.len() > limits::MAX_NOTES_LEN
    {
        errors.push(FieldError::new("notes", "too long"));
    }

    fail_if_any(errors)
}

impl Scheduler {
    // ── Availability windows ─────────────────────────────

    pub async fn create_availability(
        &self,
        draft: AvailabilityDraft,
    ) -> Result<AvailabilityWindow, EngineError> {
        let started = std::time::Instant::now();
        let result = self.create_availability_inner(draft).await;
        record_op("create_availability", started, result.as_ref().err());
        result
    }

    async fn create_availability_inner(
        &self,
        draft: AvailabilityDraft,
    ) -> Result<AvailabilityWindow, EngineError> {
        let _gate = self.compact_gate.read().await;
        validate_window_draft(&draft)?;
        let window = self.window_from_draft(draft, Ulid::new(), 1);

        // Structural recurrence check and full expansion happen up front so
        // a bad window never reaches the journal.
        let spans: Vec<Span> = crate::recurrence::expand(&window, window.start_date, window.end_date)?
            .map(|o| o.span())
            .collect();

        let cs = self.consultant(window.owner_id);
        let mut state = cs.write_owned().await;

        if state.windows.len() >= limits::MAX_WINDOWS_PER_CONSULTANT {
            return Err(EngineError::LimitExceeded("windows per consultant"));
        }
        if state.entry_count() + spans.len() > limits::MAX_ENTRIES_PER_CONSULTANT {
            return Err(EngineError::LimitExceeded("index entries per consultant"));
        }

        let check = conflict::check_window(&state, &spans, window.availability_type, None);
        if !check.ok {
            return Err(EngineError::Conflict(check.conflicts));
        }

        self.persist_and_apply(&mut state, &Event::WindowUpserted { window: window.clone() })
            .await?;
        tracing::info!(owner = %window.owner_id, window = %window.id, occurrences = spans.len(),
            "availability window created");
        Ok(window)
    }

    pub async fn update_availability(
        &self,
        id: Ulid,
        draft: AvailabilityDraft,
        expected_version: Option<u64>,
    ) -> Result<AvailabilityWindow, EngineError> {
        let started = std::time::Instant::now();
        let result = self.update_availability_inner(id, draft, expected_version).await;
        record_op("update_availability", started, result.as_ref().err());
        result
    }

    async fn update_availability_inner(
        &self,
        id: Ulid,
        draft: AvailabilityDraft,
        expected_version: Option<u64>,
    ) -> Result<AvailabilityWindow, EngineError> {
        let _gate = self.compact_gate.read().await;
        validate_window_draft(&draft)?;
        let (_, mut state) = self.resolve_window_write(&id).await?;
        let existing = state.windows.get(&id).ok_or(EngineError::NotFound(id))?;

        if draft.owner_id != existing.owner_id {
            return Err(EngineError::Validation(vec![FieldError::new(
                "ownerId",
                "a window cannot move between consultants",
            )]));
        }
        check_version(expected_version, existing.version)?;

        let window = self.window_from_draft(draft, id, existing.version + 1);
        let spans: Vec<Span> = crate::recurrence::expand(&window, window.start_date, window.end_date)?
            .map(|o| o.span())
            .collect();

        // Self-exclusion: the stored occurrences of this window must not
        // collide with their replacements.
        let check = conflict::check_window(&state, &spans, window.availability_type, Some(id));
        if !check.ok {
            return Err(EngineError::Conflict(check.conflicts));
        }

        self.persist_and_apply(&mut state, &Event::WindowUpserted { window: window.clone() })
            .await?;
        tracing::info!(window = %id, version = window.version, "availability window updated");
        Ok(window)
    }

    pub async fn delete_availability(&self, id: Ulid) -> Result<(), EngineError> {
        let started = std::time::Instant::now();
        let result = self.delete_availability_inner(id).await;
        record_op("delete_availability", started, result.as_ref().err());
        result
    }

    async fn delete_availability_inner(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let (owner, mut state) = self.resolve_window_write(&id).await?;
        let window = state.windows.get(&id).ok_or(EngineError::NotFound(id))?;

        // Removing an `available` window must not strip coverage from an
        // active booking. Check against the hypothetical index without it,
        // under the same single-occurrence containment rule bookings use.
        if window.availability_type == AvailabilityType::Available {
            let mut dependents: Vec<Ulid> = state
                .assignments
                .values()
                .filter(|a| a.status.blocks_time())
                .filter(|a| !state.covered_by_one(&a.span(), Some(id)))
                .map(|a| a.id)
                .collect();
            if !dependents.is_empty() {
                dependents.sort();
                return Err(EngineError::DependentAssignments(dependents));
            }
        }

        self.persist_and_apply(&mut state, &Event::WindowDeleted { id, owner_id: owner })
            .await?;
        tracing::info!(owner = %owner, window = %id, "availability window deleted");
        Ok(())
    }

    /// Per-item bulk delete. Items fail independently; the outcome lists
    /// both sides.
    pub async fn bulk_delete_availability(
        &self,
        ids: Vec<Ulid>,
    ) -> Result<BulkOutcome, EngineError> {
        if ids.len() > limits::MAX_BULK_SIZE {
            return Err(EngineError::LimitExceeded("bulk operation size"));
        }
        let mut outcome = BulkOutcome::default();
        for id in ids {
            outcome.record(id, self.delete_availability(id).await);
        }
        Ok(outcome)
    }

    fn window_from_draft(&self, draft: AvailabilityDraft, id: Ulid, version: u64) -> AvailabilityWindow {
        AvailabilityWindow {
            id,
            owner_id: draft.owner_id,
            start_date: draft.start_date,
            end_date: draft.end_date,
            day_of_week: draft.day_of_week,
            start_time: draft.start_time,
            end_time: draft.end_time,
            availability_type: draft.availability_type,
            is_recurring: draft.is_recurring,
            recurring_pattern: draft.recurring_pattern,
            recurring_end_date: draft.recurring_end_date,
            notes: draft.notes,
            version,
            updated_at: self.clock.now_ms(),
        }
    }

    // ── Schedules ────────────────────────────────────────

    pub async fn create_schedule(&self, draft: ScheduleDraft) -> Result<Schedule, EngineError> {
        let started = std::time::Instant::now();
        let result = self.create_schedule_inner(draft).await;
        record_op("create_schedule", started, result.as_ref().err());
        result
    }

    async fn create_schedule_inner(&self, draft: ScheduleDraft) -> Result<Schedule, EngineError> {
        let _gate = self.compact_gate.read().await;
        validate_schedule_draft(&draft)?;
        let schedule = Schedule {
            id: Ulid::new(),
            project_id: draft.project_id,
            title: draft.title,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            shift_type: draft.shift_type,
            hours_per_week: draft.hours_per_week,
            status: ScheduleStatus::Draft,
            version: 1,
            updated_at: self.clock.now_ms(),
        };

        self.journal_append(&Event::ScheduleUpserted { schedule: schedule.clone() })
            .await?;
        self.schedules.insert(
            schedule.id,
            std::sync::Arc::new(tokio::sync::RwLock::new(schedule.clone())),
        );
        tracing::info!(schedule = %schedule.id, project = %schedule.project_id, "schedule created");
        Ok(schedule)
    }

    pub async fn update_schedule(
        &self,
        id: Ulid,
        draft: ScheduleDraft,
        expected_version: Option<u64>,
    ) -> Result<Schedule, EngineError> {
        let started = std::time::Instant::now();
        let result = self.update_schedule_inner(id, draft, expected_version).await;
        record_op("update_schedule", started, result.as_ref().err());
        result
    }

    async fn update_schedule_inner(
        &self,
        id: Ulid,
        draft: ScheduleDraft,
        expected_version: Option<u64>,
    ) -> Result<Schedule, EngineError> {
        let _gate = self.compact_gate.read().await;
        validate_schedule_draft(&draft)?;
        let shared = self
            .schedules
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        let mut schedule = shared.write().await;

        check_version(expected_version, schedule.version)?;
        if schedule.status.is_terminal() {
            return Err(EngineError::Validation(vec![FieldError::new(
                "status",
                format!("schedule is {}", schedule.status.as_str()),
            )]));
        }

        let updated = Schedule {
            id,
            project_id: draft.project_id,
            title: draft.title,
            description: draft.description,
            start_date: draft.start_date,
            end_date: draft.end_date,
            shift_type: draft.shift_type,
            hours_per_week: draft.hours_per_week,
            status: schedule.status,
            version: schedule.version + 1,
            updated_at: self.clock.now_ms(),
        };

        self.journal_append(&Event::ScheduleUpserted { schedule: updated.clone() })
            .await?;
        *schedule = updated.clone();
        Ok(updated)
    }

    pub async fn update_schedule_status(
        &self,
        id: Ulid,
        change: ScheduleStatusChange,
    ) -> Result<Schedule, EngineError> {
        let started = std::time::Instant::now();
        let result = self.update_schedule_status_inner(id, change).await;
        record_op("update_schedule_status", started, result.as_ref().err());
        result
    }

    async fn update_schedule_status_inner(
        &self,
        id: Ulid,
        change: ScheduleStatusChange,
    ) -> Result<Schedule, EngineError> {
        let _gate = self.compact_gate.read().await;
        let shared = self
            .schedules
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        let mut schedule = shared.write().await;

        check_version(change.expected_version, schedule.version)?;
        transitions::schedule(schedule.status, change.status)?;

        let mut guards = BTreeMap::new();
        if change.status == ScheduleStatus::Cancelled {
            guards = self.lock_assignment_owners(id).await;
            let active = active_assignments(&guards, id);
            if !active.is_empty() && !change.confirm {
                return Err(EngineError::ActiveAssignments(
                    active.into_iter().map(|(_, a)| a.id).collect(),
                ));
            }
        }

        let updated = Schedule {
            status: change.status,
            version: schedule.version + 1,
            updated_at: self.clock.now_ms(),
            ..schedule.clone()
        };
        self.journal_append(&Event::ScheduleUpserted { schedule: updated.clone() })
            .await?;
        *schedule = updated.clone();

        // Confirmed cancellation cascades to every active assignment. Each
        // cascade step is its own journal transaction; a failure leaves the
        // already-cancelled ones cancelled.
        if change.status == ScheduleStatus::Cancelled {
            let cascade: Vec<(Ulid, Assignment)> = active_assignments(&guards, id)
                .into_iter()
                .map(|(owner, a)| (owner, a.clone()))
                .collect();
            for (owner, assignment) in cascade {
                let cancelled = Assignment {
                    status: AssignmentStatus::Cancelled,
                    version: assignment.version + 1,
                    updated_at: self.clock.now_ms(),
                    ..assignment
                };
                let state = guards
                    .get_mut(&owner)
                    .ok_or(EngineError::Store("cascade lost a partition lock".into()))?;
                self.persist_and_apply(
                    state,
                    &Event::AssignmentUpserted { assignment: cancelled },
                )
                .await?;
            }
            tracing::info!(schedule = %id, "schedule cancelled");
        }

        Ok(updated)
    }

    pub async fn delete_schedule(&self, id: Ulid) -> Result<(), EngineError> {
        let started = std::time::Instant::now();
        let result = self.delete_schedule_inner(id).await;
        record_op("delete_schedule", started, result.as_ref().err());
        result
    }

    async fn delete_schedule_inner(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let shared = self
            .schedules
            .get(&id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(id))?;
        let _schedule = shared.write().await;

        let mut guards = self.lock_assignment_owners(id).await;
        let active = active_assignments(&guards, id);
        if !active.is_empty() {
            return Err(EngineError::ActiveAssignments(
                active.into_iter().map(|(_, a)| a.id).collect(),
            ));
        }

        // Cascade-delete the remaining (terminal) assignments first so a
        // crash mid-way never leaves orphans pointing at a live schedule.
        let doomed: Vec<(Ulid, Ulid)> = guards
            .iter()
            .flat_map(|(owner, state)| {
                state
                    .assignments
                    .values()
                    .filter(|a| a.schedule_id == id)
                    .map(|a| (*owner, a.id))
                    .collect::<Vec<_>>()
            })
            .collect();
        for (owner, assignment_id) in doomed {
            let state = guards
                .get_mut(&owner)
                .ok_or(EngineError::Store("cascade lost a partition lock".into()))?;
            self.persist_and_apply(
                state,
                &Event::AssignmentDeleted {
                    id: assignment_id,
                    consultant_id: owner,
                    schedule_id: id,
                },
            )
            .await?;
        }

        self.journal_append(&Event::ScheduleDeleted { id }).await?;
        self.schedules.remove(&id);
        self.schedule_assignments.remove(&id);
        tracing::info!(schedule = %id, "schedule deleted");
        Ok(())
    }

    /// Write-lock every partition holding an assignment of `schedule_id`,
    /// in sorted owner order.
    async fn lock_assignment_owners(
        &self,
        schedule_id: Ulid,
    ) -> BTreeMap<Ulid, OwnedRwLockWriteGuard<ConsultantState>> {
        let mut owners: Vec<Ulid> = self
            .schedule_assignments
            .get(&schedule_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|a| self.assignment_owner.get(a).map(|o| *o.value()))
                    .collect()
            })
            .unwrap_or_default();
        owners.sort();
        owners.dedup();

        let mut guards = BTreeMap::new();
        for owner in owners {
            if let Some(cs) = self.try_consultant(&owner) {
                guards.insert(owner, cs.write_owned().await);
            }
        }
        guards
    }

    // ── Assignments ──────────────────────────────────────

    pub async fn create_assignment(
        &self,
        draft: AssignmentDraft,
    ) -> Result<Assignment, EngineError> {
        let started = std::time::Instant::now();
        let result = self.create_assignment_inner(draft).await;
        record_op("create_assignment", started, result.as_ref().err());
        result
    }

    async fn create_assignment_inner(
        &self,
        draft: AssignmentDraft,
    ) -> Result<Assignment, EngineError> {
        let _gate = self.compact_gate.read().await;
        validate_assignment_draft(&draft)?;

        // The schedule read guard stays held across the whole check+commit
        // so a concurrent cancellation can't slip between them.
        let shared = self
            .schedules
            .get(&draft.schedule_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(draft.schedule_id))?;
        let schedule = shared.read().await;

        if schedule.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                entity: "schedule",
                from: schedule.status.as_str(),
                to: "assigned",
            });
        }
        if draft.date < schedule.start_date || draft.date > schedule.end_date {
            return Err(EngineError::Validation(vec![FieldError::new(
                "date",
                "outside the schedule's date range",
            )]));
        }

        let assignment = Assignment {
            id: Ulid::new(),
            schedule_id: draft.schedule_id,
            consultant_id: draft.consultant_id,
            role: draft.role,
            date: draft.date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            notes: draft.notes,
            status: AssignmentStatus::Proposed,
            version: 1,
            updated_at: self.clock.now_ms(),
        };
        let span = assignment.span();

        let cs = self.consultant(assignment.consultant_id);
        let mut state = cs.write_owned().await;

        if state.entry_count() >= limits::MAX_ENTRIES_PER_CONSULTANT {
            return Err(EngineError::LimitExceeded("index entries per consultant"));
        }
        let check = conflict::check(&state, &span, conflict::Candidate::Booking, None);
        if !check.ok {
            return Err(EngineError::Conflict(check.conflicts));
        }

        self.persist_and_apply(
            &mut state,
            &Event::AssignmentUpserted { assignment: assignment.clone() },
        )
        .await?;
        tracing::info!(consultant = %assignment.consultant_id, schedule = %assignment.schedule_id,
            assignment = %assignment.id, "assignment proposed");
        Ok(assignment)
    }

    pub async fn update_assignment(
        &self,
        id: Ulid,
        draft: AssignmentDraft,
        expected_version: Option<u64>,
    ) -> Result<Assignment, EngineError> {
        let started = std::time::Instant::now();
        let result = self.update_assignment_inner(id, draft, expected_version).await;
        record_op("update_assignment", started, result.as_ref().err());
        result
    }

    async fn update_assignment_inner(
        &self,
        id: Ulid,
        draft: AssignmentDraft,
        expected_version: Option<u64>,
    ) -> Result<Assignment, EngineError> {
        let _gate = self.compact_gate.read().await;
        validate_assignment_draft(&draft)?;

        // Schedule bounds are read before the partition lock to keep the
        // schedule-before-consultant lock order.
        let shared = self
            .schedules
            .get(&draft.schedule_id)
            .map(|e| e.value().clone())
            .ok_or(EngineError::NotFound(draft.schedule_id))?;
        let schedule = shared.read().await;
        if draft.date < schedule.start_date || draft.date > schedule.end_date {
            return Err(EngineError::Validation(vec![FieldError::new(
                "date",
                "outside the schedule's date range",
            )]));
        }

        let (_, mut state) = self.resolve_assignment_write(&id).await?;
        let existing = state.assignments.get(&id).ok_or(EngineError::NotFound(id))?;

        if draft.consultant_id != existing.consultant_id {
            return Err(EngineError::Validation(vec![FieldError::new(
                "consultantId",
                "an assignment cannot move between consultants",
            )]));
        }
        if draft.schedule_id != existing.schedule_id {
            return Err(EngineError::Validation(vec![FieldError::new(
                "scheduleId",
                "an assignment cannot move between schedules",
            )]));
        }
        check_version(expected_version, existing.version)?;
        if existing.status.is_terminal() {
            return Err(EngineError::InvalidTransition {
                entity: "assignment",
                from: existing.status.as_str(),
                to: existing.status.as_str(),
            });
        }

        let updated = Assignment {
            id,
            schedule_id: existing.schedule_id,
            consultant_id: existing.consultant_id,
            role: draft.role,
            date: draft.date,
            start_time: draft.start_time,
            end_time: draft.end_time,
            notes: draft.notes,
            status: existing.status,
            version: existing.version + 1,
            updated_at: self.clock.now_ms(),
        };
        let span = updated.span();

        let check = conflict::check(&state, &span, conflict::Candidate::Booking, Some(id));
        if !check.ok {
            return Err(EngineError::Conflict(check.conflicts));
        }

        self.persist_and_apply(
            &mut state,
            &Event::AssignmentUpserted { assignment: updated.clone() },
        )
        .await?;
        Ok(updated)
    }

    pub async fn update_assignment_status(
        &self,
        id: Ulid,
        change: AssignmentStatusChange,
    ) -> Result<Assignment, EngineError> {
        let started = std::time::Instant::now();
        let result = self.update_assignment_status_inner(id, change).await;
        record_op("update_assignment_status", started, result.as_ref().err());
        result
    }

    async fn update_assignment_status_inner(
        &self,
        id: Ulid,
        change: AssignmentStatusChange,
    ) -> Result<Assignment, EngineError> {
        let _gate = self.compact_gate.read().await;
        let (_, mut state) = self.resolve_assignment_write(&id).await?;
        let existing = state.assignments.get(&id).ok_or(EngineError::NotFound(id))?;

        check_version(change.expected_version, existing.version)?;
        transitions::assignment(existing.status, change.status)?;

        let updated = Assignment {
            status: change.status,
            version: existing.version + 1,
            updated_at: self.clock.now_ms(),
            ..existing.clone()
        };
        self.persist_and_apply(
            &mut state,
            &Event::AssignmentUpserted { assignment: updated.clone() },
        )
        .await?;
        tracing::debug!(assignment = %id, status = updated.status.as_str(), "assignment status changed");
        Ok(updated)
    }

    /// Unconditional delete — terminal or not.
    pub async fn delete_assignment(&self, id: Ulid) -> Result<(), EngineError> {
        let started = std::time::Instant::now();
        let result = self.delete_assignment_inner(id).await;
        record_op("delete_assignment", started, result.as_ref().err());
        result
    }

    async fn delete_assignment_inner(&self, id: Ulid) -> Result<(), EngineError> {
        let _gate = self.compact_gate.read().await;
        let (owner, mut state) = self.resolve_assignment_write(&id).await?;
        let schedule_id = state
            .assignments
            .get(&id)
            .map(|a| a.schedule_id)
            .ok_or(EngineError::NotFound(id))?;

        self.persist_and_apply(
            &mut state,
            &Event::AssignmentDeleted { id, consultant_id: owner, schedule_id },
        )
        .await?;
        Ok(())
    }

    /// Apply one status to many assignments, failing per item.
    pub async fn bulk_assignment_status(
        &self,
        ids: Vec<Ulid>,
        status: AssignmentStatus,
    ) -> Result<BulkOutcome, EngineError> {
        if ids.len() > limits::MAX_BULK_SIZE {
            return Err(EngineError::LimitExceeded("bulk operation size"));
        }
        let mut outcome = BulkOutcome::default();
        for id in ids {
            let change = AssignmentStatusChange { status, expected_version: None };
            outcome.record(id, self.update_assignment_status(id, change).await.map(|_| ()));
        }
        Ok(outcome)
    }
}

/// Active assignments of `schedule_id` visible through the held guards.
fn active_assignments<'a>(
    guards: &'a BTreeMap<Ulid, OwnedRwLockWriteGuard<ConsultantState>>,
    schedule_id: Ulid,
) -> Vec<(Ulid, &'a Assignment)> {
    let mut active: Vec<(Ulid, &Assignment)> = guards
        .iter()
        .flat_map(|(owner, state)| {
            state
                .assignments
                .values()
                .filter(|a| a.schedule_id == schedule_id && a.status.blocks_time())
                .map(|a| (*owner, a))
                .collect::<Vec<_>>()
        })
        .collect();
    active.sort_by_key(|(_, a)| a.id);
    active
}
