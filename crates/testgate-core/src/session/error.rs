//! Protocol violation taxonomy.

use thiserror::Error;

/// A grammar rule breach that permanently invalidates the remainder of the
/// session.
///
/// Violations are sticky: once one is recorded the session state is frozen
/// and no later record is inspected. An unfinished session (stream ended
/// before the terminator, or mid-test) is deliberately NOT a violation -
/// no rule was literally broken, the stream simply stopped short.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// The same test name was begun, passed or failed more than once.
    #[error("same test name used more than once: {name}")]
    DuplicateTestName {
        /// The repeated identifier, decoded lossily for display.
        name: String,
    },

    /// A test marker appeared after the session terminator.
    #[error("test logs after finish")]
    LogsAfterFinish,

    /// A begin marker appeared while another test was still active
    /// (sequential grammar only).
    #[error("test \"{name}\" began while \"{active}\" was still running")]
    BeginWhileActive {
        /// The test the begin marker tried to start.
        name: String,
        /// The test that was already active.
        active: String,
    },

    /// A named end marker referenced a test that is not active
    /// (nesting-tolerant grammar).
    #[error("test finished without starting: {name}")]
    EndWithoutBegin {
        /// The identifier carried by the end marker.
        name: String,
    },

    /// A bare end marker appeared with no test active (sequential grammar).
    #[error("end marker with no test running")]
    OrphanEndMarker,

    /// A failure marker appeared with no test active (sequential grammar).
    #[error("failure marker with no test running")]
    OrphanFailMarker,

    /// The terminator appeared while a test was still active.
    #[error("finished while tests were running")]
    FinishedWhileRunning,

    /// The terminator appeared twice.
    #[error("finished twice")]
    FinishedTwice,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_name_message() {
        let violation = ProtocolViolation::DuplicateTestName {
            name: "alloc".to_string(),
        };
        assert_eq!(
            violation.to_string(),
            "same test name used more than once: alloc"
        );
    }

    #[test]
    fn test_begin_while_active_message() {
        let violation = ProtocolViolation::BeginWhileActive {
            name: "mutex".to_string(),
            active: "alloc".to_string(),
        };
        assert!(violation.to_string().contains("mutex"));
        assert!(violation.to_string().contains("alloc"));
    }

    #[test]
    fn test_end_without_begin_message() {
        let violation = ProtocolViolation::EndWithoutBegin {
            name: "timer".to_string(),
        };
        assert_eq!(violation.to_string(), "test finished without starting: timer");
    }
}
