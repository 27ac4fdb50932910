//! Hard input bounds. Everything here exists to keep a single request from
//! scanning or allocating without limit.

use crate::model::Ms;

/// Free-text notes on windows and assignments.
pub const MAX_NOTES_LEN: usize = 2_000;

/// Schedule titles and descriptions.
pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 4_000;

/// Assignment role and schedule shift-type labels.
pub const MAX_ROLE_LEN: usize = 100;
pub const MAX_SHIFT_TYPE_LEN: usize = 50;

/// Windows a single consultant may hold.
pub const MAX_WINDOWS_PER_CONSULTANT: usize = 2_000;

/// Derived index entries per consultant (occurrences + active bookings).
pub const MAX_ENTRIES_PER_CONSULTANT: usize = 200_000;

/// Ids accepted by one bulk operation.
pub const MAX_BULK_SIZE: usize = 500;

/// Widest span a single occurrence/free-slot query may cover (~2 years).
pub const MAX_QUERY_WINDOW_MS: Ms = 2 * 366 * 24 * 3_600_000;

/// Sanity bounds on any timestamp entering the index.
/// 2000-01-01T00:00:00Z and 2100-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// Upper bound on `Schedule::hours_per_week` (hours in a week).
pub const MAX_HOURS_PER_WEEK: u16 = 168;
