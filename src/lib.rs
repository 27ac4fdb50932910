//! Availability and scheduling conflict engine: per-consultant availability
//! windows (weekly/monthly recurrence), project schedules and assignments,
//! interval-overlap conflict detection, and a journal-backed write path that
//! keeps the durable log and the in-memory interval index consistent under
//! concurrent edits.

pub mod api;
pub mod clock;
pub mod engine;
pub mod index;
pub mod journal;
pub mod limits;
pub mod model;
pub mod observability;
pub mod recurrence;

pub use clock::{Clock, FixedClock, SystemClock};
pub use engine::{EngineError, Scheduler};
