//! Session state and the caller-observable verdict.

use serde::Serialize;

use super::error::ProtocolViolation;
use crate::protocol::{Grammar, Marker};

/// Bookkeeping for one verification session.
///
/// Created fresh per run, threaded immutably through [`SessionState::apply`]
/// by the fold in [`verify_stream`](super::verify_stream), and discarded
/// once the verdict is read. An identifier lives in at most one of the
/// passed, failed or active sets at any time; once moved into passed or
/// failed it never reappears in active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    grammar: Grammar,
    /// Completed-and-passed identifiers, insertion order = completion order.
    passed: Vec<Vec<u8>>,
    /// Completed-and-failed identifiers, insertion order = completion order.
    failed: Vec<Vec<u8>>,
    /// In-progress identifiers. The sequential grammar holds at most one.
    active: Vec<Vec<u8>>,
    /// Sequential grammar: the active test has seen a `[FAIL]` marker.
    pending_failure: bool,
    /// The terminator has been observed.
    completed: bool,
}

/// Tagged result of one transition step.
///
/// The transition function returns either the successor state or the frozen
/// state plus the violation that halted the session; the driver stops
/// iterating the instant it receives [`Step::Halt`], which is what makes
/// violations sticky and monotonic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// The record was legal; processing continues with this state.
    Next(SessionState),

    /// The record breached the grammar. The state is frozen as of the
    /// offending record and no later record may be inspected.
    Halt {
        /// Session state at the moment of the violation.
        state: SessionState,
        /// The rule breach that halted the session.
        violation: ProtocolViolation,
    },
}

impl Step {
    const fn halt(state: SessionState, violation: ProtocolViolation) -> Self {
        Self::Halt { state, violation }
    }
}

impl SessionState {
    /// Creates a fresh session state for `grammar`.
    #[must_use]
    pub const fn new(grammar: Grammar) -> Self {
        Self {
            grammar,
            passed: Vec::new(),
            failed: Vec::new(),
            active: Vec::new(),
            pending_failure: false,
            completed: false,
        }
    }

    /// True once the terminator has been observed.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        self.completed
    }

    /// Number of in-progress tests.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Number of tests that ran to completion so far.
    #[must_use]
    pub fn completed_count(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    /// True if `name` appears in any of the passed, failed or active sets.
    fn knows(&self, name: &[u8]) -> bool {
        self.passed
            .iter()
            .chain(&self.failed)
            .chain(&self.active)
            .any(|known| known == name)
    }

    /// Applies one classified marker to the session.
    ///
    /// Consumes the state and returns the tagged transition result. Inert
    /// records never reach this function; the fold driver filters them out
    /// during classification.
    #[must_use]
    pub fn apply(self, marker: Marker) -> Step {
        match marker {
            Marker::Begin { name } => self.begin(name),
            Marker::End => self.end_bare(),
            Marker::EndNamed { name, failed } => self.end_named(&name, failed),
            Marker::Fail => self.fail(),
            Marker::Finish => self.finish(),
        }
    }

    fn begin(mut self, name: Vec<u8>) -> Step {
        if self.completed {
            return Step::halt(self, ProtocolViolation::LogsAfterFinish);
        }
        if self.knows(&name) {
            let name = lossy(&name);
            return Step::halt(self, ProtocolViolation::DuplicateTestName { name });
        }
        if self.grammar == Grammar::Sequential {
            if let Some(active) = self.active.first() {
                let violation = ProtocolViolation::BeginWhileActive {
                    name: lossy(&name),
                    active: lossy(active),
                };
                return Step::halt(self, violation);
            }
        }
        self.active.push(name);
        self.pending_failure = false;
        Step::Next(self)
    }

    fn end_bare(mut self) -> Step {
        if self.completed {
            return Step::halt(self, ProtocolViolation::LogsAfterFinish);
        }
        let Some(name) = self.active.pop() else {
            return Step::halt(self, ProtocolViolation::OrphanEndMarker);
        };
        if self.pending_failure {
            self.failed.push(name);
        } else {
            self.passed.push(name);
        }
        self.pending_failure = false;
        Step::Next(self)
    }

    fn end_named(mut self, name: &[u8], failed: bool) -> Step {
        if self.completed {
            return Step::halt(self, ProtocolViolation::LogsAfterFinish);
        }
        let Some(position) = self.active.iter().position(|known| known == name) else {
            let name = lossy(name);
            return Step::halt(self, ProtocolViolation::EndWithoutBegin { name });
        };
        let name = self.active.remove(position);
        if failed {
            self.failed.push(name);
        } else {
            self.passed.push(name);
        }
        Step::Next(self)
    }

    fn fail(mut self) -> Step {
        if self.active.is_empty() {
            return Step::halt(self, ProtocolViolation::OrphanFailMarker);
        }
        self.pending_failure = true;
        Step::Next(self)
    }

    fn finish(mut self) -> Step {
        if self.completed {
            return Step::halt(self, ProtocolViolation::FinishedTwice);
        }
        if !self.active.is_empty() {
            return Step::halt(self, ProtocolViolation::FinishedWhileRunning);
        }
        self.completed = true;
        Step::Next(self)
    }

    /// Final verdict for a stream that ended without a violation.
    #[must_use]
    pub fn into_verdict(self) -> SessionVerdict {
        SessionVerdict::from_state(self, None)
    }
}

/// Caller-observable result of one verification session.
///
/// `finished` is true iff the terminator was observed, no test was active
/// at that moment and no violation occurred. A false `finished` with no
/// violation means the stream stopped short ("unexpected end of logs").
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionVerdict {
    /// The session reached the terminator cleanly.
    pub finished: bool,

    /// The violation that halted the session, if any.
    #[serde(rename = "error", serialize_with = "serialize_violation")]
    pub violation: Option<ProtocolViolation>,

    /// Identifiers of passed tests, in completion order.
    pub passed: Vec<String>,

    /// Identifiers of failed tests, in completion order.
    pub failed: Vec<String>,
}

impl SessionVerdict {
    /// Builds the verdict from a final (or frozen) session state.
    ///
    /// Identifiers are decoded lossily only at this reporting boundary;
    /// every equality and uniqueness check has already happened on the raw
    /// bytes.
    pub(super) fn from_state(state: SessionState, violation: Option<ProtocolViolation>) -> Self {
        let finished =
            violation.is_none() && state.completed && state.active.is_empty();
        Self {
            finished,
            violation,
            passed: state.passed.iter().map(|name| lossy(name)).collect(),
            failed: state.failed.iter().map(|name| lossy(name)).collect(),
        }
    }

    /// Total number of tests that ran to completion.
    #[must_use]
    pub fn tests_run(&self) -> usize {
        self.passed.len() + self.failed.len()
    }

    /// True when the session finished cleanly and no test failed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.finished && self.violation.is_none() && self.failed.is_empty()
    }
}

fn lossy(name: &[u8]) -> String {
    String::from_utf8_lossy(name).into_owned()
}

fn serialize_violation<S>(
    violation: &Option<ProtocolViolation>,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match violation {
        Some(violation) => serializer.serialize_some(&violation.to_string()),
        None => serializer.serialize_none(),
    }
}
