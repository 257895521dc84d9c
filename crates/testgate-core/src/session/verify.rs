//! Fold driver over a captured output stream.

use super::state::{SessionState, Step};
use super::SessionVerdict;
use crate::protocol::{classify, Grammar};

/// Verifies a captured output stream against the session log protocol.
///
/// The stream is split into records on the newline delimiter (the delimiter
/// byte is stripped; the empty record a final delimiter produces is inert,
/// like any blank line). Each record is classified under `grammar` and fed
/// through the transition function; processing halts the instant a record
/// breaches the grammar, freezing the verdict as of the offending record.
///
/// This is a pure function of the byte stream: replaying the same bytes
/// always yields the same verdict.
#[must_use]
pub fn verify_stream(output: &[u8], grammar: Grammar) -> SessionVerdict {
    let mut state = SessionState::new(grammar);
    for record in output.split(|&byte| byte == b'\n') {
        let Some(marker) = classify(record, grammar) else {
            continue;
        };
        state = match state.apply(marker) {
            Step::Next(next) => next,
            Step::Halt { state, violation } => {
                return SessionVerdict::from_state(state, Some(violation));
            },
        };
    }
    state.into_verdict()
}
