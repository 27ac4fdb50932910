//! Expansion of a possibly-recurring [`AvailabilityWindow`] into concrete
//! occurrences. The iterator is lazy, finite (bounded by the window's
//! mandatory `recurring_end_date` and the query range) and restartable
//! (`Clone` captures the start state).

use chrono::{Datelike, Days, NaiveDate, NaiveTime, Weekday};

use crate::model::{day_span, timed_span, AvailabilityType, AvailabilityWindow, RecurringPattern, Span};

/// A recurring window is structurally unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidRecurrence(pub &'static str);

impl std::fmt::Display for InvalidRecurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid recurrence: {}", self.0)
    }
}

impl std::error::Error for InvalidRecurrence {}

/// One concrete date/time instance of a window.
///
/// Recurring occurrences are single-date (`start_date == end_date`);
/// a non-recurring all-day window yields one multi-day occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Occurrence {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub start_time: Option<NaiveTime>,
    pub end_time: Option<NaiveTime>,
    pub kind: AvailabilityType,
}

impl Occurrence {
    /// Index-timeline interval for this occurrence. All-day occurrences
    /// span midnight-to-midnight over their date range.
    pub fn span(&self) -> Span {
        match (self.start_time, self.end_time) {
            (Some(s), Some(e)) => timed_span(self.start_date, s, e),
            _ => day_span(self.start_date, self.end_date),
        }
    }
}

#[derive(Clone)]
enum Cursor {
    Done,
    /// Non-recurring all-day block over an inclusive date range.
    Block { start: NaiveDate, end: NaiveDate },
    /// Non-recurring timed slot on a single date.
    Slot { date: NaiveDate },
    Weekly { next: NaiveDate },
    Monthly { year: i32, month: u32, day: u32, lower: NaiveDate },
}

/// Lazy occurrence sequence for one window.
#[derive(Clone)]
pub struct Occurrences<'a> {
    window: &'a AvailabilityWindow,
    cursor: Cursor,
    /// Inclusive upper bound on occurrence dates.
    until: NaiveDate,
}

impl<'a> Occurrences<'a> {
    fn emit(&self, start_date: NaiveDate, end_date: NaiveDate) -> Occurrence {
        Occurrence {
            start_date,
            end_date,
            start_time: self.window.start_time,
            end_time: self.window.end_time,
            kind: self.window.availability_type,
        }
    }
}

impl<'a> Iterator for Occurrences<'a> {
    type Item = Occurrence;

    fn next(&mut self) -> Option<Occurrence> {
        loop {
            match self.cursor {
                Cursor::Done => return None,
                Cursor::Block { start, end } => {
                    self.cursor = Cursor::Done;
                    return Some(self.emit(start, end));
                }
                Cursor::Slot { date } => {
                    self.cursor = Cursor::Done;
                    return Some(self.emit(date, date));
                }
                Cursor::Weekly { next } => {
                    if next > self.until {
                        self.cursor = Cursor::Done;
                        return None;
                    }
                    self.cursor = match next.checked_add_days(Days::new(7)) {
                        Some(n) => Cursor::Weekly { next: n },
                        None => Cursor::Done,
                    };
                    return Some(self.emit(next, next));
                }
                Cursor::Monthly { year, month, day, lower } => {
                    let (ny, nm) = if month == 12 { (year + 1, 1) } else { (year, month + 1) };
                    self.cursor = Cursor::Monthly { year: ny, month: nm, day, lower };
                    // Months without this day-of-month are skipped, not clamped.
                    let Some(date) = NaiveDate::from_ymd_opt(year, month, day) else {
                        continue;
                    };
                    if date > self.until {
                        self.cursor = Cursor::Done;
                        return None;
                    }
                    if date < lower {
                        continue;
                    }
                    return Some(self.emit(date, date));
                }
            }
        }
    }
}

/// First date on or after `from` falling on `target`.
fn next_weekday_on_or_after(from: NaiveDate, target: Weekday) -> Option<NaiveDate> {
    let offset = (target.num_days_from_monday() + 7 - from.weekday().num_days_from_monday()) % 7;
    from.checked_add_days(Days::new(offset as u64))
}

/// Expand `window` into occurrences within `[range_start, range_end]`
/// (inclusive calendar dates), intersected with the window's own bounds.
pub fn expand<'a>(
    window: &'a AvailabilityWindow,
    range_start: NaiveDate,
    range_end: NaiveDate,
) -> Result<Occurrences<'a>, InvalidRecurrence> {
    let lower = window.start_date.max(range_start);
    let mut until = window.end_date.min(range_end);

    let cursor = if window.is_recurring {
        let pattern = window
            .recurring_pattern
            .ok_or(InvalidRecurrence("recurring window missing recurring_pattern"))?;
        let rec_end = window
            .recurring_end_date
            .ok_or(InvalidRecurrence("recurring window missing recurring_end_date"))?;
        let dow = window
            .day_of_week
            .ok_or(InvalidRecurrence("recurring window missing day_of_week"))?;
        if rec_end < window.start_date {
            return Err(InvalidRecurrence("recurring_end_date before start_date"));
        }
        until = until.min(rec_end);
        if lower > until {
            Cursor::Done
        } else {
            match pattern {
                RecurringPattern::Weekly => match next_weekday_on_or_after(lower, dow) {
                    Some(first) => Cursor::Weekly { next: first },
                    None => Cursor::Done,
                },
                RecurringPattern::Monthly => Cursor::Monthly {
                    year: lower.year(),
                    month: lower.month(),
                    day: window.start_date.day(),
                    lower,
                },
            }
        }
    } else if lower > until {
        Cursor::Done
    } else if window.start_time.is_some() && window.end_time.is_some() {
        // Timed windows always carry a day_of_week; the single occurrence
        // lands on the first matching date in range.
        let dow = window
            .day_of_week
            .ok_or(InvalidRecurrence("timed window missing day_of_week"))?;
        match next_weekday_on_or_after(lower, dow) {
            Some(d) if d <= until => Cursor::Slot { date: d },
            _ => Cursor::Done,
        }
    } else {
        Cursor::Block { start: lower, end: until }
    };

    Ok(Occurrences { window, cursor, until })
}
