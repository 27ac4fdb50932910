use chrono::{DateTime, NaiveDate};

use crate::model::Ms;

/// Time source injected into the scheduler so entity stamping and
/// date-sensitive logic stay deterministic under test.
pub trait Clock: Send + Sync {
    /// Current unix milliseconds.
    fn now_ms(&self) -> Ms;

    /// Current UTC calendar date.
    fn today(&self) -> NaiveDate {
        DateTime::from_timestamp_millis(self.now_ms())
            .map(|dt| dt.date_naive())
            .unwrap_or(NaiveDate::MIN)
    }
}

/// Wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> Ms {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_millis() as Ms)
            .unwrap_or(0)
    }
}

/// Clock pinned to a fixed instant.
pub struct FixedClock(pub Ms);

impl Clock for FixedClock {
    fn now_ms(&self) -> Ms {
        self.0
    }
}
