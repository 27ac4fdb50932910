//! Conflict policy. Pure functions over one consultant's partition —
//! callers hold the owner lock, so a check-then-commit sequence is atomic
//! per consultant.
//!
//! Policy, in order:
//! 1. an exact-duplicate span with identical kind is an idempotent
//!    re-submission, not a conflict (for bookings only against the
//!    candidate's own entity);
//! 2. `unavailable` beats everything: an available/tentative candidate
//!    overlapping an unavailable entry conflicts;
//! 3. availability overlapping availability is benign ("more
//!    availability") — the policing happens at booking time. A new
//!    `unavailable` over an active booking conflicts, since it would
//!    invalidate the booking;
//! 4. a booking must avoid unavailable time, avoid every active booking
//!    (symmetric in insertion order), and sit fully inside one single
//!    `available` occurrence — abutting occurrences never combine.

use serde::Serialize;
use ulid::Ulid;

use crate::index::{subtract_intervals, ConsultantState};
use crate::model::*;

/// What is being checked against the partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Candidate {
    /// An availability-window occurrence of the given type.
    Window(AvailabilityType),
    /// An assignment booking.
    Booking,
}

/// One conflicting entry, identified for the caller's "override or cancel"
/// presentation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ConflictEntry {
    Window {
        id: Ulid,
        span: Span,
        availability_type: AvailabilityType,
    },
    Booking {
        id: Ulid,
        span: Span,
        status: AssignmentStatus,
    },
    /// No `available` occurrence covers this part of a booking candidate.
    NoAvailability { span: Span },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictResult {
    pub ok: bool,
    pub conflicts: Vec<ConflictEntry>,
}

impl ConflictResult {
    fn from(conflicts: Vec<ConflictEntry>) -> Self {
        Self { ok: conflicts.is_empty(), conflicts }
    }
}

/// Check one candidate interval. `exclude` skips entries derived from that
/// entity (self-overlap on updates must not trigger false conflicts).
pub fn check(
    state: &ConsultantState,
    span: &Span,
    candidate: Candidate,
    exclude: Option<Ulid>,
) -> ConflictResult {
    let mut conflicts = Vec::new();
    collect(state, span, candidate, exclude, &mut conflicts);
    if candidate == Candidate::Booking {
        collect_coverage_gaps(state, span, exclude, &mut conflicts);
    }
    ConflictResult::from(conflicts)
}

/// Check every occurrence of a window in one pass, deduplicating entries
/// that conflict with several occurrences.
pub fn check_window(
    state: &ConsultantState,
    spans: &[Span],
    availability_type: AvailabilityType,
    exclude: Option<Ulid>,
) -> ConflictResult {
    let mut conflicts: Vec<ConflictEntry> = Vec::new();
    for span in spans {
        let mut found = Vec::new();
        collect(state, span, Candidate::Window(availability_type), exclude, &mut found);
        for c in found {
            if !conflicts.contains(&c) {
                conflicts.push(c);
            }
        }
    }
    ConflictResult::from(conflicts)
}

fn collect(
    state: &ConsultantState,
    span: &Span,
    candidate: Candidate,
    exclude: Option<Ulid>,
    out: &mut Vec<ConflictEntry>,
) {
    for entry in state.overlapping(span) {
        if Some(entry.ref_id) == exclude {
            continue;
        }
        match (candidate, entry.kind) {
            // Rule 1: identical interval, identical kind — idempotent.
            (Candidate::Window(kind), EntryKind::Availability(existing))
                if entry.span == *span && existing == kind => {}

            // Rule 2: unavailable wins over new availability.
            (
                Candidate::Window(AvailabilityType::Available | AvailabilityType::Tentative),
                EntryKind::Availability(AvailabilityType::Unavailable),
            ) => out.push(ConflictEntry::Window {
                id: entry.ref_id,
                span: entry.span,
                availability_type: AvailabilityType::Unavailable,
            }),

            // Rule 3: new unavailable time may not invalidate an active booking.
            (Candidate::Window(AvailabilityType::Unavailable), EntryKind::Booking(status))
                if status.blocks_time() =>
            {
                out.push(ConflictEntry::Booking { id: entry.ref_id, span: entry.span, status })
            }

            // Rule 4: bookings avoid unavailable time and each other.
            (Candidate::Booking, EntryKind::Availability(AvailabilityType::Unavailable)) => {
                out.push(ConflictEntry::Window {
                    id: entry.ref_id,
                    span: entry.span,
                    availability_type: AvailabilityType::Unavailable,
                })
            }
            (Candidate::Booking, EntryKind::Booking(status)) if status.blocks_time() => {
                out.push(ConflictEntry::Booking { id: entry.ref_id, span: entry.span, status })
            }

            // Availability over availability is benign (rule 3).
            _ => {}
        }
    }
}

/// Rule 4 coverage: the candidate must sit inside one `available`
/// occurrence. Uncovered remainders against the merged spans are reported
/// as gaps; a candidate stitched across several abutting occurrences
/// conflicts on its whole span.
fn collect_coverage_gaps(
    state: &ConsultantState,
    span: &Span,
    exclude: Option<Ulid>,
    out: &mut Vec<ConflictEntry>,
) {
    if state.covered_by_one(span, exclude) {
        return;
    }
    let available = state.available_spans(span, exclude);
    let gaps = subtract_intervals(&[*span], &available);
    if gaps.is_empty() {
        out.push(ConflictEntry::NoAvailability { span: *span });
    } else {
        for gap in gaps {
            out.push(ConflictEntry::NoAvailability { span: gap });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: Ms = 3_600_000;

    fn entry(ref_id: Ulid, start: Ms, end: Ms, kind: EntryKind) -> IndexEntry {
        IndexEntry { ref_id, span: Span::new(start, end), kind }
    }

    fn state_with(entries: Vec<IndexEntry>) -> ConsultantState {
        let mut cs = ConsultantState::new(Ulid::new());
        for e in entries {
            cs.insert_entry(e);
        }
        cs
    }

    fn available(start: Ms, end: Ms) -> IndexEntry {
        entry(
            Ulid::new(),
            start,
            end,
            EntryKind::Availability(AvailabilityType::Available),
        )
    }

    fn unavailable(start: Ms, end: Ms) -> IndexEntry {
        entry(
            Ulid::new(),
            start,
            end,
            EntryKind::Availability(AvailabilityType::Unavailable),
        )
    }

    fn booking(start: Ms, end: Ms, status: AssignmentStatus) -> IndexEntry {
        entry(Ulid::new(), start, end, EntryKind::Booking(status))
    }

    #[test]
    fn duplicate_window_is_idempotent() {
        let cs = state_with(vec![available(9 * H, 17 * H)]);
        let result = check(
            &cs,
            &Span::new(9 * H, 17 * H),
            Candidate::Window(AvailabilityType::Available),
            None,
        );
        assert!(result.ok);
    }

    #[test]
    fn available_over_unavailable_conflicts() {
        let cs = state_with(vec![unavailable(9 * H, 17 * H)]);
        let result = check(
            &cs,
            &Span::new(16 * H, 18 * H), // partial overlap is enough
            Candidate::Window(AvailabilityType::Available),
            None,
        );
        assert!(!result.ok);
        assert!(matches!(result.conflicts[0], ConflictEntry::Window { .. }));
    }

    #[test]
    fn availability_overlap_is_benign() {
        let cs = state_with(vec![available(9 * H, 17 * H)]);
        for kind in [AvailabilityType::Available, AvailabilityType::Tentative] {
            let result = check(&cs, &Span::new(10 * H, 12 * H), Candidate::Window(kind), None);
            assert!(result.ok, "{kind:?} over available must be benign");
        }
        // Unavailable over available is benign too (vacation over working hours).
        let result = check(
            &cs,
            &Span::new(10 * H, 12 * H),
            Candidate::Window(AvailabilityType::Unavailable),
            None,
        );
        assert!(result.ok);
    }

    #[test]
    fn unavailable_over_active_booking_conflicts() {
        let cs = state_with(vec![
            available(9 * H, 17 * H),
            booking(10 * H, 12 * H, AssignmentStatus::Confirmed),
        ]);
        let result = check(
            &cs,
            &Span::new(11 * H, 13 * H),
            Candidate::Window(AvailabilityType::Unavailable),
            None,
        );
        assert!(!result.ok);
        assert!(matches!(result.conflicts[0], ConflictEntry::Booking { .. }));
    }

    #[test]
    fn booking_requires_coverage() {
        let cs = state_with(vec![available(9 * H, 12 * H)]);
        // Fully covered — fine.
        assert!(check(&cs, &Span::new(10 * H, 11 * H), Candidate::Booking, None).ok);
        // Tail sticks out — gap reported.
        let result = check(&cs, &Span::new(11 * H, 13 * H), Candidate::Booking, None);
        assert!(!result.ok);
        assert_eq!(
            result.conflicts,
            vec![ConflictEntry::NoAvailability { span: Span::new(12 * H, 13 * H) }]
        );
    }

    #[test]
    fn booking_cannot_stitch_abutting_occurrences() {
        let cs = state_with(vec![available(9 * H, 12 * H), available(12 * H, 15 * H)]);
        // Inside either single occurrence is fine.
        assert!(check(&cs, &Span::new(10 * H, 12 * H), Candidate::Booking, None).ok);
        assert!(check(&cs, &Span::new(12 * H, 14 * H), Candidate::Booking, None).ok);
        // Across the shared boundary conflicts even though the merged
        // spans leave no gap.
        let result = check(&cs, &Span::new(10 * H, 14 * H), Candidate::Booking, None);
        assert!(!result.ok);
        assert_eq!(
            result.conflicts,
            vec![ConflictEntry::NoAvailability { span: Span::new(10 * H, 14 * H) }]
        );
    }

    #[test]
    fn tentative_does_not_authorize_booking() {
        let cs = state_with(vec![entry(
            Ulid::new(),
            9 * H,
            17 * H,
            EntryKind::Availability(AvailabilityType::Tentative),
        )]);
        let result = check(&cs, &Span::new(10 * H, 11 * H), Candidate::Booking, None);
        assert!(!result.ok);
    }

    #[test]
    fn double_booking_is_symmetric() {
        let first = booking(10 * H, 12 * H, AssignmentStatus::Proposed);
        let second_span = Span::new(11 * H, 13 * H);
        let cs = state_with(vec![available(0, 24 * H), first]);
        let a = check(&cs, &second_span, Candidate::Booking, None);
        assert!(!a.ok);

        // Insert in the other order: existing booking at the candidate's
        // position, candidate at the first one's.
        let swapped = booking(11 * H, 13 * H, AssignmentStatus::Proposed);
        let cs2 = state_with(vec![available(0, 24 * H), swapped]);
        let b = check(&cs2, &Span::new(10 * H, 12 * H), Candidate::Booking, None);
        assert!(!b.ok);
    }

    #[test]
    fn check_is_idempotent() {
        let cs = state_with(vec![
            available(0, 24 * H),
            booking(10 * H, 12 * H, AssignmentStatus::Confirmed),
        ]);
        let span = Span::new(11 * H, 13 * H);
        let first = check(&cs, &span, Candidate::Booking, None);
        let second = check(&cs, &span, Candidate::Booking, None);
        assert_eq!(first, second);
    }

    #[test]
    fn exclude_skips_own_entries() {
        let own = Ulid::new();
        let cs = state_with(vec![
            available(0, 24 * H),
            entry(own, 10 * H, 12 * H, EntryKind::Booking(AssignmentStatus::Confirmed)),
        ]);
        let result = check(&cs, &Span::new(10 * H, 12 * H), Candidate::Booking, Some(own));
        assert!(result.ok);
    }

    #[test]
    fn window_check_dedupes_across_occurrences() {
        let block = unavailable(0, 48 * H);
        let block_id = block.ref_id;
        let cs = state_with(vec![block]);
        let result = check_window(
            &cs,
            &[Span::new(9 * H, 10 * H), Span::new(33 * H, 34 * H)],
            AvailabilityType::Available,
            None,
        );
        assert!(!result.ok);
        assert_eq!(result.conflicts.len(), 1);
        assert!(
            matches!(result.conflicts[0], ConflictEntry::Window { id, .. } if id == block_id)
        );
    }

    #[test]
    fn cancelled_bookings_never_block() {
        let cs = state_with(vec![
            available(0, 24 * H),
            booking(10 * H, 12 * H, AssignmentStatus::Cancelled),
        ]);
        assert!(check(&cs, &Span::new(10 * H, 12 * H), Candidate::Booking, None).ok);
    }
}
