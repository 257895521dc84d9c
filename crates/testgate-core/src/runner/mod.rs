//! Process orchestrator.
//!
//! Spawns the target executable, writes a fixed stimulus to its stdin,
//! waits for exit under a wall-clock deadline, forcibly kills the child on
//! expiry, and captures the complete output stream. One invocation owns one
//! child process; there is no retry and no concurrent session support.
//!
//! # Lifecycle
//!
//! 1. Spawn with stdin/stdout piped and stderr discarded (stderr is never a
//!    record source).
//! 2. Write the stimulus, then close stdin so a synchronously reading child
//!    observes end-of-input.
//! 3. Drain stdout on a background task while waiting, so a chatty child
//!    can never deadlock on a full pipe.
//! 4. Bound the wait with the deadline; on expiry, kill and reap the child
//!    and still collect whatever output it produced.
//!
//! The child handle is a scoped resource: every exit path (normal exit,
//! deadline kill, wait failure) reaps the process, and `kill_on_drop`
//! backstops cancellation.
//!
//! A non-zero exit is an advisory anomaly carried in the outcome - it never
//! short-circuits protocol analysis of the captured output. Only a failed
//! spawn is fatal.

mod spawner;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::SessionVerdict;

pub use spawner::{run, run_and_verify};

/// Default stimulus written to the child's stdin: the continue token
/// followed by the quit token.
pub const DEFAULT_STIMULUS: &[u8] = b"c\nq\n";

/// Default wall-clock deadline for the child process.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(20);

/// Specification of one orchestrated run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    /// Target executable.
    pub command: String,

    /// Arguments passed to the target.
    pub args: Vec<String>,

    /// Bytes written to the child's stdin before waiting for exit.
    pub stimulus: Vec<u8>,

    /// Wall-clock deadline; on expiry the child is forcibly killed.
    pub deadline: Duration,
}

impl RunSpec {
    /// Creates a run specification with the default stimulus and deadline.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            stimulus: DEFAULT_STIMULUS.to_vec(),
            deadline: DEFAULT_DEADLINE,
        }
    }

    /// Sets the argument list.
    #[must_use]
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Replaces the stimulus bytes.
    #[must_use]
    pub fn with_stimulus(mut self, stimulus: impl Into<Vec<u8>>) -> Self {
        self.stimulus = stimulus.into();
        self
    }

    /// Overrides the deadline.
    #[must_use]
    pub const fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Classification of how the child process stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Termination {
    /// Child exited on its own with a zero status.
    Completed,

    /// Child exited on its own with a non-zero or signal status. Advisory:
    /// decoupled from the protocol verdict on the captured output.
    AbnormalExit {
        /// Exit code, if one was available (signal deaths carry none).
        code: Option<i32>,
    },

    /// The deadline elapsed and the child was forcibly killed.
    DeadlineExpired,
}

impl Termination {
    /// True when the child exited on its own with a zero status.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::AbnormalExit { code: Some(code) } => {
                write!(f, "abnormal exit (code {code})")
            },
            Self::AbnormalExit { code: None } => write!(f, "abnormal exit (signal)"),
            Self::DeadlineExpired => write!(f, "deadline expired"),
        }
    }
}

/// Raw result of one orchestrated run, before protocol analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    /// Concatenation of everything the child wrote to stdout before it
    /// exited or was killed.
    pub output: Vec<u8>,

    /// How the child stopped.
    pub termination: Termination,
}

/// Combined result of orchestration and protocol analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionReport {
    /// Raw captured output stream (not serialized; use `--capture` style
    /// persistence for debugging instead).
    #[serde(skip)]
    pub output: Vec<u8>,

    /// How the child stopped.
    pub termination: Termination,

    /// Verdict of the session log protocol processor.
    pub verdict: SessionVerdict,
}

/// Errors that can occur while orchestrating the child process.
#[derive(Debug, Error)]
pub enum RunError {
    /// The child process could not be started. Fatal: no protocol analysis
    /// is possible.
    #[error("spawn failed: {reason}")]
    SpawnFailed {
        /// Description of the spawn failure.
        reason: String,
    },

    /// The stimulus could not be written to the child's stdin. A broken
    /// pipe (child exited before reading) is tolerated and never surfaces
    /// as this error.
    #[error("failed to write stimulus: {reason}")]
    StimulusWrite {
        /// Description of the write failure.
        reason: String,
    },

    /// Waiting on the child process failed.
    #[error("failed to wait for child: {reason}")]
    Wait {
        /// Description of the wait failure.
        reason: String,
    },
}

impl RunError {
    /// Creates a spawn failed error.
    #[must_use]
    pub fn spawn_failed(reason: impl Into<String>) -> Self {
        Self::SpawnFailed {
            reason: reason.into(),
        }
    }

    /// Creates a stimulus write error.
    #[must_use]
    pub fn stimulus_write(reason: impl Into<String>) -> Self {
        Self::StimulusWrite {
            reason: reason.into(),
        }
    }

    /// Creates a wait error.
    #[must_use]
    pub fn wait(reason: impl Into<String>) -> Self {
        Self::Wait {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_spec_defaults() {
        let spec = RunSpec::new("qemu-system-i386");
        assert_eq!(spec.command, "qemu-system-i386");
        assert!(spec.args.is_empty());
        assert_eq!(spec.stimulus, DEFAULT_STIMULUS);
        assert_eq!(spec.deadline, DEFAULT_DEADLINE);
    }

    #[test]
    fn test_run_spec_builder() {
        let spec = RunSpec::new("cat")
            .with_args(vec!["log.txt".to_string()])
            .with_stimulus(b"x\n".to_vec())
            .with_deadline(Duration::from_secs(5));
        assert_eq!(spec.args, vec!["log.txt".to_string()]);
        assert_eq!(spec.stimulus, b"x\n");
        assert_eq!(spec.deadline, Duration::from_secs(5));
    }

    #[test]
    fn test_termination_display() {
        assert_eq!(Termination::Completed.to_string(), "completed");
        assert_eq!(
            Termination::AbnormalExit { code: Some(3) }.to_string(),
            "abnormal exit (code 3)"
        );
        assert_eq!(
            Termination::AbnormalExit { code: None }.to_string(),
            "abnormal exit (signal)"
        );
        assert_eq!(Termination::DeadlineExpired.to_string(), "deadline expired");
    }

    #[test]
    fn test_termination_is_clean() {
        assert!(Termination::Completed.is_clean());
        assert!(!Termination::AbnormalExit { code: Some(1) }.is_clean());
        assert!(!Termination::DeadlineExpired.is_clean());
    }
}
