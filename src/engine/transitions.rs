//! Status state machines. These functions are the single authority on
//! transition legality — no status field is ever assigned without passing
//! through here first.

use crate::model::{AssignmentStatus, ScheduleStatus};

use super::EngineError;

/// Schedule lifecycle: `draft → active → completed`,
/// `draft | active → cancelled`.
pub fn schedule(from: ScheduleStatus, to: ScheduleStatus) -> Result<(), EngineError> {
    use ScheduleStatus::*;
    let legal = matches!(
        (from, to),
        (Draft, Active) | (Active, Completed) | (Draft, Cancelled) | (Active, Cancelled)
    );
    if legal {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            entity: "schedule",
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}

/// Assignment lifecycle: `proposed → confirmed → completed`, any
/// non-terminal state may be cancelled.
pub fn assignment(from: AssignmentStatus, to: AssignmentStatus) -> Result<(), EngineError> {
    use AssignmentStatus::*;
    let legal = matches!(
        (from, to),
        (Proposed, Confirmed) | (Confirmed, Completed) | (Proposed, Cancelled) | (Confirmed, Cancelled)
    );
    if legal {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            entity: "assignment",
            from: from.as_str(),
            to: to.as_str(),
        })
    }
}
