//! Engine events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable engine events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// A select finished
    SelectComplete,
    /// Rows appended
    InsertComplete,
    /// Rows rewritten
    UpdateComplete,
    /// An update matched nothing
    UpdateNoMatch,
    /// Rows deleted or soft-deleted
    DeleteComplete,
    /// Soft-deleted rows brought back
    RestoreComplete,
    /// Writer lock not acquired in time
    LockTimeout,
    /// Writer lock could not be released
    LockReleaseFailed,
    /// Any other failed operation
    OperationFailed,
}

impl Event {
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::SelectComplete => "SELECT_COMPLETE",
            Event::InsertComplete => "INSERT_COMPLETE",
            Event::UpdateComplete => "UPDATE_COMPLETE",
            Event::UpdateNoMatch => "UPDATE_NO_MATCH",
            Event::DeleteComplete => "DELETE_COMPLETE",
            Event::RestoreComplete => "RESTORE_COMPLETE",
            Event::LockTimeout => "LOCK_TIMEOUT",
            Event::LockReleaseFailed => "LOCK_RELEASE_FAILED",
            Event::OperationFailed => "OPERATION_FAILED",
        }
    }

    /// Severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::UpdateNoMatch | Event::LockTimeout | Event::LockReleaseFailed => {
                Severity::Warn
            }
            Event::OperationFailed => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
