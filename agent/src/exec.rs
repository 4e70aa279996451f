//! External command execution
//!
//! Runs the flasher and filesystem tools as child processes, forwarding
//! their merged stdout/stderr to the caller line by line as it arrives.

use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Sentinel exit code reported when no real exit code could be collected
pub const EXIT_FAILURE: i32 = -1;

/// Cooperative cancellation flag shared between a runner and its caller.
///
/// Checked between output lines only: a cancelled runner stops forwarding
/// and schedules no further reads, but never kills the child.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Result of one external command invocation
#[derive(Debug)]
pub enum RunOutcome {
    /// The child ran to completion
    Exited(i32),

    /// The child could not be spawned (binary missing, permission denied)
    StartFailed(std::io::Error),

    /// Cancelled before the exit code was collected; carries the code when
    /// the child had already terminated
    Cancelled(Option<i32>),
}

impl RunOutcome {
    /// Exit code, with [`EXIT_FAILURE`] standing in when none was collected
    pub fn code(&self) -> i32 {
        match self {
            RunOutcome::Exited(code) => *code,
            RunOutcome::Cancelled(Some(code)) => *code,
            RunOutcome::StartFailed(_) | RunOutcome::Cancelled(None) => EXIT_FAILURE,
        }
    }

    pub fn success(&self) -> bool {
        matches!(self, RunOutcome::Exited(0))
    }

    /// The spawn error, when the command never started
    pub fn start_error(&self) -> Option<&std::io::Error> {
        match self {
            RunOutcome::StartFailed(err) => Some(err),
            _ => None,
        }
    }
}

/// Runs external commands, streaming their output
pub struct ProcessRunner {
    cancel: CancelFlag,
}

impl ProcessRunner {
    pub fn new(cancel: CancelFlag) -> Self {
        Self { cancel }
    }

    /// Run a command to completion, sending each output line to `lines`.
    ///
    /// stdout and stderr are merged into one stream in arrival order. The
    /// child's standard streams are dropped and the process reaped before
    /// returning, so repeated invocations do not leak descriptors. On
    /// cancellation the child is deliberately left running; its exit code
    /// is reported only if it has already terminated.
    pub async fn run(
        &self,
        program: impl AsRef<std::ffi::OsStr>,
        args: &[String],
        lines: &UnboundedSender<String>,
    ) -> RunOutcome {
        let mut child = match Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => return RunOutcome::StartFailed(err),
        };

        // stderr is forwarded from its own task into the same channel so
        // the two streams merge into one ordered sequence
        let stderr_task = child.stderr.take().map(|stream| {
            let sink = lines.clone();
            let cancel = self.cancel.clone();
            tokio::spawn(async move {
                let mut reader = BufReader::new(stream).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    if cancel.is_cancelled() || sink.send(line).is_err() {
                        break;
                    }
                }
            })
        });

        if let Some(stream) = child.stdout.take() {
            let mut reader = BufReader::new(stream).lines();
            loop {
                match reader.next_line().await {
                    Ok(Some(line)) => {
                        if self.cancel.is_cancelled() || lines.send(line).is_err() {
                            break;
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!("failed to read tool output: {}", err);
                        break;
                    }
                }
            }
        }

        if let Some(task) = stderr_task {
            if self.cancel.is_cancelled() {
                // no further reads are scheduled once cancelled; the child
                // itself keeps running
                task.abort();
            } else {
                let _ = task.await;
            }
        }

        if self.cancel.is_cancelled() {
            // advisory cancellation: collect the exit code only if the
            // child has already finished, never block on it
            return match child.try_wait() {
                Ok(Some(status)) => {
                    debug!("cancelled child had already exited: {}", status);
                    RunOutcome::Cancelled(status.code())
                }
                _ => RunOutcome::Cancelled(None),
            };
        }

        match child.wait().await {
            Ok(status) => RunOutcome::Exited(status.code().unwrap_or(EXIT_FAILURE)),
            Err(err) => {
                warn!("failed to collect exit status: {}", err);
                RunOutcome::Exited(EXIT_FAILURE)
            }
        }
    }
}
