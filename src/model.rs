use chrono::{NaiveDate, NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds — the index timeline. Calendar types (`NaiveDate`,
/// `NaiveTime`) live on the entities; everything entering the interval
/// index is converted to UTC milliseconds.
pub type Ms = i64;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection clamped to `bounds`, if non-empty.
    pub fn clamp_to(&self, bounds: &Span) -> Option<Span> {
        let start = self.start.max(bounds.start);
        let end = self.end.min(bounds.end);
        (start < end).then(|| Span::new(start, end))
    }
}

/// Midnight-to-midnight span covering `start_date..=end_date`.
pub fn day_span(start_date: NaiveDate, end_date: NaiveDate) -> Span {
    let start = start_date.and_time(NaiveTime::MIN).and_utc().timestamp_millis();
    // The day after the calendar's last representable date saturates to the
    // end of the timeline; the span never collapses.
    let end = match end_date.succ_opt() {
        Some(next) => next.and_time(NaiveTime::MIN).and_utc().timestamp_millis(),
        None => Ms::MAX,
    };
    Span::new(start, end)
}

/// Span for a timed slot on a single date.
pub fn timed_span(date: NaiveDate, start_time: NaiveTime, end_time: NaiveTime) -> Span {
    Span::new(
        date.and_time(start_time).and_utc().timestamp_millis(),
        date.and_time(end_time).and_utc().timestamp_millis(),
    )
}

// ── Closed variant sets ──────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AvailabilityType {
    Available,
    Unavailable,
    Tentative,
}

impl AvailabilityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AvailabilityType::Available => "available",
            AvailabilityType::Unavailable => "unavailable",
            AvailabilityType::Tentative => "tentative",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecurringPattern {
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl ScheduleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleStatus::Draft => "draft",
            ScheduleStatus::Active => "active",
            ScheduleStatus::Completed => "completed",
            ScheduleStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ScheduleStatus::Completed | ScheduleStatus::Cancelled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Proposed,
    Confirmed,
    Completed,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AssignmentStatus::Proposed => "proposed",
            AssignmentStatus::Confirmed => "confirmed",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Completed | AssignmentStatus::Cancelled
        )
    }

    /// Only proposed/confirmed bookings occupy consultant time.
    pub fn blocks_time(&self) -> bool {
        matches!(
            self,
            AssignmentStatus::Proposed | AssignmentStatus::Confirmed
        )
    }
}

// ── Entities ─────────────────────────────────────────────────────

/// A consultant-declared availability window, possibly recurring.
///
/// `start_date..=end_date` is inclusive. Absent `start_time`/`end_time`
/// means all-day. Timed windows carry `day_of_week`. Recurring windows
/// carry `day_of_week`, `recurring_pattern` and `recurring_end_date`
/// (mandatory — expansion is always finite).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityWindow {
    pub id: Ulid,
    pub owner_id: Ulid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub day_of_week: Option<Weekday>,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub availability_type: AvailabilityType,
    pub is_recurring: bool,
    pub recurring_pattern: Option<RecurringPattern>,
    pub recurring_end_date: Option<NaiveDate>,
    pub notes: Option<String>,
    /// Optimistic concurrency stamp, starts at 1.
    pub version: u64,
    pub updated_at: Ms,
}

/// Project-level container of assignments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Ulid,
    pub project_id: Ulid,
    pub title: String,
    pub description: Option<String>,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub shift_type: String,
    pub hours_per_week: u16,
    pub status: ScheduleStatus,
    pub version: u64,
    pub updated_at: Ms,
}

/// A consultant's booked commitment to a schedule on a specific date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: Ulid,
    pub schedule_id: Ulid,
    pub consultant_id: Ulid,
    pub role: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub notes: Option<String>,
    pub status: AssignmentStatus,
    pub version: u64,
    pub updated_at: Ms,
}

impl Assignment {
    pub fn span(&self) -> Span {
        timed_span(self.date, self.start_time, self.end_time)
    }
}

// ── Derived interval data ────────────────────────────────────────

/// What an index entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryKind {
    /// One occurrence of an availability window.
    Availability(AvailabilityType),
    /// An active (proposed or confirmed) booking.
    Booking(AssignmentStatus),
}

/// One interval in a consultant's index partition. `ref_id` points at the
/// owning entity (window or assignment); the index never owns entity
/// lifetime, only this derived data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub ref_id: Ulid,
    pub span: Span,
    pub kind: EntryKind,
}

// ── Journal records ──────────────────────────────────────────────

/// Durable record format. Events carry full entity snapshots so replay
/// rebuilds both the entity maps and every index partition without
/// consulting anything else.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    WindowUpserted {
        window: AvailabilityWindow,
    },
    WindowDeleted {
        id: Ulid,
        owner_id: Ulid,
    },
    ScheduleUpserted {
        schedule: Schedule,
    },
    ScheduleDeleted {
        id: Ulid,
    },
    AssignmentUpserted {
        assignment: Assignment,
    },
    AssignmentDeleted {
        id: Ulid,
        consultant_id: Ulid,
        schedule_id: Ulid,
    },
}
