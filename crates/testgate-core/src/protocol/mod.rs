//! Log record grammar.
//!
//! One record per line; matching is byte-exact against fixed literal
//! templates. Classification priority per record: begin marker, end marker,
//! explicit-failure marker, session terminator. Any other record, blank
//! lines included, is inert - the grammar is a sparse filter over an
//! otherwise free-form log, so unrecognized content never matches and never
//! violates.
//!
//! # Grammar Variants
//!
//! Two incompatible designs exist for the end-of-test marker and are exposed
//! as an explicit configuration choice rather than silently picking one:
//!
//! | Variant | End marker | Failure signal |
//! |---------|------------|----------------|
//! | [`Grammar::Sequential`] | `[END TEST]` | `[FAIL]` before the end marker |
//! | [`Grammar::NestingTolerant`] | `[END TEST "<name>" OK\|FAIL]` | inline in the end marker |
//!
//! Test names are opaque byte strings; they are never interpreted, only
//! compared for equality. A name may itself contain `"` bytes: the closing
//! delimiter is the fixed literal suffix of the template, so the name is
//! everything between the template's prefix and suffix.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Prefix of the begin marker: `[BEGIN TEST "<name>"]`.
const BEGIN_PREFIX: &[u8] = b"[BEGIN TEST \"";

/// Suffix of the begin marker.
const BEGIN_SUFFIX: &[u8] = b"\"]";

/// Bare end marker of the sequential grammar.
const END_BARE: &[u8] = b"[END TEST]";

/// Prefix of the named end marker: `[END TEST "<name>" OK|FAIL]`.
const END_PREFIX: &[u8] = b"[END TEST \"";

/// Suffix of the named end marker carrying a passing outcome.
const END_OK_SUFFIX: &[u8] = b"\" OK]";

/// Suffix of the named end marker carrying a failing outcome.
const END_FAIL_SUFFIX: &[u8] = b"\" FAIL]";

/// Explicit-failure marker of the sequential grammar.
const FAIL_MARKER: &[u8] = b"[FAIL]";

/// Session terminator.
const FINISH_MARKER: &[u8] = b"[ALL TESTS RUN]";

/// Grammar variant for the end-of-test marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grammar {
    /// At most one test is active at a time. Tests end with a bare
    /// `[END TEST]`; a `[FAIL]` marker seen while the test is active marks
    /// it as failed, absence of one implies it passed.
    Sequential,

    /// Concurrently active tests are tolerated. End markers name the test
    /// they close and carry its outcome inline.
    NestingTolerant,
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::NestingTolerant => write!(f, "nesting_tolerant"),
        }
    }
}

/// A classified log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// `[BEGIN TEST "<name>"]` - starts the named test.
    Begin {
        /// Opaque identifier of the test being started.
        name: Vec<u8>,
    },

    /// `[END TEST]` - ends the single active test (sequential grammar).
    End,

    /// `[END TEST "<name>" OK|FAIL]` - ends the named test with an inline
    /// outcome (nesting-tolerant grammar).
    EndNamed {
        /// Identifier carried in the end marker.
        name: Vec<u8>,
        /// True when the marker carried the `FAIL` outcome.
        failed: bool,
    },

    /// `[FAIL]` - marks the active test as failed (sequential grammar).
    Fail,

    /// `[ALL TESTS RUN]` - terminates the session.
    Finish,
}

/// Classifies one record (newline delimiter already stripped) under
/// `grammar`.
///
/// Returns `None` for inert records: blank lines, free-form log content and
/// markers belonging to the other grammar variant all fall through without
/// matching.
#[must_use]
pub fn classify(record: &[u8], grammar: Grammar) -> Option<Marker> {
    if let Some(rest) = record.strip_prefix(BEGIN_PREFIX) {
        if let Some(name) = rest.strip_suffix(BEGIN_SUFFIX) {
            return Some(Marker::Begin {
                name: name.to_vec(),
            });
        }
    }

    match grammar {
        Grammar::Sequential => {
            if record == END_BARE {
                return Some(Marker::End);
            }
            if record == FAIL_MARKER {
                return Some(Marker::Fail);
            }
        },
        Grammar::NestingTolerant => {
            if let Some(rest) = record.strip_prefix(END_PREFIX) {
                // Stripping the fixed suffix keeps the longest possible
                // name, so names containing '"' resolve the same way the
                // greedy template match does.
                if let Some(name) = rest.strip_suffix(END_OK_SUFFIX) {
                    return Some(Marker::EndNamed {
                        name: name.to_vec(),
                        failed: false,
                    });
                }
                if let Some(name) = rest.strip_suffix(END_FAIL_SUFFIX) {
                    return Some(Marker::EndNamed {
                        name: name.to_vec(),
                        failed: true,
                    });
                }
            }
        },
    }

    if record == FINISH_MARKER {
        return Some(Marker::Finish);
    }

    None
}
