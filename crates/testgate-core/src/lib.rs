//! testgate-core - Test session log verification.
//!
//! This crate verifies the behavior of an external test-producing program by
//! launching it as a subprocess, feeding it a fixed stimulus, and validating
//! the emitted log stream against a strict line-oriented protocol that
//! delimits individual test cases and their outcomes.
//!
//! # Components
//!
//! - [`runner`]: spawns the target executable, injects the stimulus into its
//!   stdin, enforces a wall-clock deadline (forcefully killing the child on
//!   expiry) and captures the full output stream.
//! - [`protocol`]: classifies single log records against the marker grammar.
//! - [`session`]: folds classified records into a session verdict, halting
//!   on the first protocol violation.
//!
//! The processor is a pure, synchronous fold over the record sequence: the
//! same bytes always yield the same verdict, independent of how the stream
//! was produced. The orchestrator and the processor are composed by
//! [`runner::run_and_verify`]; callers that already hold a captured stream
//! can invoke [`session::verify_stream`] directly.
//!
//! # Example
//!
//! ```rust
//! use testgate_core::protocol::Grammar;
//! use testgate_core::session::verify_stream;
//!
//! let log = b"[BEGIN TEST \"alloc\"]\n[END TEST]\n[ALL TESTS RUN]\n";
//! let verdict = verify_stream(log, Grammar::Sequential);
//!
//! assert!(verdict.finished);
//! assert_eq!(verdict.passed, vec!["alloc".to_string()]);
//! assert!(verdict.failed.is_empty());
//! ```

pub mod protocol;
pub mod runner;
pub mod session;

pub use protocol::{Grammar, Marker};
pub use runner::{
    run, run_and_verify, RunError, RunOutcome, RunSpec, SessionReport, Termination,
};
pub use session::{verify_stream, ProtocolViolation, SessionState, SessionVerdict, Step};
