//! Spawn, stimulate, wait, kill.

use std::io::ErrorKind;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use super::{RunError, RunOutcome, RunSpec, SessionReport, Termination};
use crate::protocol::Grammar;
use crate::session::verify_stream;

/// Bound on draining the output pipe after the child has stopped.
///
/// The child's exit (or kill) closes its end of the pipe and the drain
/// finishes promptly; a grandchild that inherited the pipe can hold it open
/// indefinitely, so the drain is bounded and the tail abandoned.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Runs the target process according to `spec`.
///
/// Writes the stimulus, waits for exit bounded by the deadline, and kills
/// the child forcefully if the deadline elapses first. Output produced up
/// to the kill is still captured and returned.
///
/// # Errors
///
/// Returns [`RunError::SpawnFailed`] if the executable cannot be started,
/// [`RunError::StimulusWrite`] if stdin rejects the stimulus for any reason
/// other than the child having already exited, and [`RunError::Wait`] if
/// the wait syscall itself fails.
pub async fn run(spec: &RunSpec) -> Result<RunOutcome, RunError> {
    debug!(command = %spec.command, deadline = ?spec.deadline, "spawning target");

    let mut child = Command::new(&spec.command)
        .args(&spec.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RunError::spawn_failed(e.to_string()))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| RunError::stimulus_write("stdin handle unavailable"))?;
    match stdin.write_all(&spec.stimulus).await {
        Ok(()) => {},
        // The child exited (or closed stdin) before reading the stimulus.
        // Its output stream is still worth analyzing.
        Err(e) if e.kind() == ErrorKind::BrokenPipe => {
            debug!("child closed stdin before the stimulus was written");
        },
        Err(e) => return Err(RunError::stimulus_write(e.to_string())),
    }
    // Dropping the handle closes the pipe so the child observes EOF.
    drop(stdin);

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunError::wait("stdout handle unavailable"))?;
    // Captured incrementally so that output written before a deadline kill
    // survives even when the drain has to be abandoned.
    let captured = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    let mut reader = tokio::spawn(async move {
        let mut chunk = [0u8; 8192];
        loop {
            match stdout.read(&mut chunk).await {
                Ok(0) | Err(_) => break,
                Ok(n) => sink.lock().await.extend_from_slice(&chunk[..n]),
            }
        }
    });

    let termination = match timeout(spec.deadline, child.wait()).await {
        Ok(Ok(status)) => classify_exit(status),
        Ok(Err(e)) => return Err(RunError::wait(e.to_string())),
        Err(_elapsed) => {
            warn!(
                deadline = ?spec.deadline,
                "deadline expired, killing child process"
            );
            // Forceful termination, no graceful request. The kill can only
            // fail if the child already died, in which case the reap below
            // settles it either way.
            let _ = child.start_kill();
            let _ = child.wait().await;
            Termination::DeadlineExpired
        },
    };

    if timeout(DRAIN_GRACE, &mut reader).await.is_err() {
        warn!("output pipe still open after drain grace, abandoning the tail");
        reader.abort();
        let _ = reader.await;
    }
    let output = captured.lock().await.clone();

    debug!(%termination, captured = output.len(), "target stopped");
    Ok(RunOutcome {
        output,
        termination,
    })
}

/// Runs the target process and feeds its captured output through the
/// session log protocol processor.
///
/// # Errors
///
/// Propagates orchestration errors from [`run`]; protocol violations are
/// not errors at this boundary, they are data inside the report's verdict.
pub async fn run_and_verify(
    spec: &RunSpec,
    grammar: Grammar,
) -> Result<SessionReport, RunError> {
    let outcome = run(spec).await?;
    let verdict = verify_stream(&outcome.output, grammar);
    Ok(SessionReport {
        output: outcome.output,
        termination: outcome.termination,
        verdict,
    })
}

fn classify_exit(status: ExitStatus) -> Termination {
    if status.success() {
        Termination::Completed
    } else {
        Termination::AbnormalExit {
            code: status.code(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_run_captures_output() {
        let spec = RunSpec::new("sh").with_args(vec![
            "-c".to_string(),
            "printf 'one\\ntwo\\n'".to_string(),
        ]);
        let outcome = run(&spec).await.unwrap();
        assert_eq!(outcome.output, b"one\ntwo\n");
        assert_eq!(outcome.termination, Termination::Completed);
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_run_reports_abnormal_exit() {
        let spec = RunSpec::new("sh").with_args(vec!["-c".to_string(), "exit 3".to_string()]);
        let outcome = run(&spec).await.unwrap();
        assert_eq!(
            outcome.termination,
            Termination::AbnormalExit { code: Some(3) }
        );
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_spawn_failure_is_distinct() {
        let spec = RunSpec::new("nonexistent_command_12345");
        let result = run(&spec).await;
        assert!(matches!(result, Err(RunError::SpawnFailed { .. })));
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_stimulus_reaches_child() {
        let spec = RunSpec::new("sh").with_args(vec![
            "-c".to_string(),
            "read a; read b; printf '%s:%s\\n' \"$a\" \"$b\"".to_string(),
        ]);
        let outcome = run(&spec).await.unwrap();
        assert_eq!(outcome.output, b"c:q\n");
        assert_eq!(outcome.termination, Termination::Completed);
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_child_ignoring_stdin_is_tolerated() {
        let spec = RunSpec::new("sh").with_args(vec!["-c".to_string(), "echo hi".to_string()]);
        let outcome = run(&spec).await.unwrap();
        assert_eq!(outcome.output, b"hi\n");
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_deadline_kills_hung_child() {
        let spec = RunSpec::new("sh")
            .with_args(vec![
                "-c".to_string(),
                "echo early; exec sleep 30".to_string(),
            ])
            .with_deadline(Duration::from_millis(300));

        let started = Instant::now();
        let outcome = run(&spec).await.unwrap();

        // Control must come back near the deadline, not after the sleep.
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.termination, Termination::DeadlineExpired);
        // Output produced before the kill is still captured.
        assert_eq!(outcome.output, b"early\n");
    }

    #[cfg_attr(miri, ignore)] // Miri can't spawn processes
    #[tokio::test]
    async fn test_deadline_with_pipe_holding_grandchild() {
        // The sleep grandchild inherits the output pipe and outlives the
        // kill; the bounded drain must abandon the tail instead of hanging.
        let spec = RunSpec::new("sh")
            .with_args(vec![
                "-c".to_string(),
                "echo early; sleep 30 & wait".to_string(),
            ])
            .with_deadline(Duration::from_millis(300));

        let started = Instant::now();
        let outcome = run(&spec).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(outcome.termination, Termination::DeadlineExpired);
        assert_eq!(outcome.output, b"early\n");
    }
}
