//! Provisioning run orchestration
//!
//! Executes one composite action as an ordered sequence of external
//! commands on a background task, forwarding tool output as progress
//! events and aggregating step exit codes into a single run report.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::efu;
use crate::errors::AgentError;
use crate::exec::{CancelFlag, ProcessRunner, RunOutcome};
use crate::pipeline::action::{PipelineAction, StepKind};
use crate::pipeline::fsm::{RunEvent, RunFsm, RunState};
use crate::pipeline::plan;
use crate::session::Session;

/// How a run reacts to a failing step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first failing step
    FailFast,

    /// Keep issuing the remaining steps and report the first failure.
    /// This is the historical behavior of the tool: a failed erase still
    /// attempts the upload.
    #[default]
    BestEffort,
}

/// Grants a run exclusive use of the serial port.
///
/// The port is singly owned: either the monitor holds it open or a flasher
/// step does, never both. The handshake is close-then-reopen — the
/// orchestrator asks the monitor to let go before a port step, and the
/// caller reopens the monitor after the run.
pub trait PortArbiter: Send + Sync {
    /// Close any monitor connection on the session's port
    fn release(&self) -> Result<(), AgentError>;
}

/// Arbiter for sessions with no monitor attached
pub struct NullArbiter;

impl PortArbiter for NullArbiter {
    fn release(&self) -> Result<(), AgentError> {
        Ok(())
    }
}

/// Progress stream of one run, delivered in execution order
#[derive(Debug)]
pub enum ProgressEvent {
    RunStarted {
        action: PipelineAction,
        steps: usize,
    },
    StepStarted {
        index: usize,
        kind: StepKind,
        command_line: String,
    },
    /// One line of merged tool output
    Line(String),
    StepFinished {
        index: usize,
        kind: StepKind,
        exit_code: i32,
    },
}

/// Result of one executed step
#[derive(Debug, Clone, Serialize)]
pub struct StepReport {
    pub kind: StepKind,
    pub command_line: String,
    pub exit_code: i32,

    /// Set when the tool could not be started at all, as opposed to
    /// running and exiting nonzero
    pub start_error: Option<String>,
}

/// Aggregate result of a run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunResult {
    Succeeded,

    /// Failed at the given step index, with a stage diagnostic
    FailedAt { step: usize, message: String },

    /// Cancelled after `completed` steps; the remaining steps never ran
    Cancelled { completed: usize },
}

/// Everything the caller needs to know about a finished run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub id: String,
    pub action: PipelineAction,
    pub steps: Vec<StepReport>,
    pub result: RunResult,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.result, RunResult::Succeeded)
    }

    /// Convert a failed run into the matching error, preserving the
    /// failing step's identity and command line
    pub fn to_error(&self) -> Option<AgentError> {
        match &self.result {
            RunResult::Succeeded => None,
            RunResult::Cancelled { .. } => {
                Some(AgentError::PipelineError("run cancelled".to_string()))
            }
            RunResult::FailedAt { step, message } => match self.steps.get(*step) {
                Some(report) => match &report.start_error {
                    Some(reason) => Some(AgentError::ToolStart {
                        tool: report.command_line.clone(),
                        reason: reason.clone(),
                    }),
                    None => Some(AgentError::NonZeroExit {
                        stage: message.clone(),
                        tool: report.command_line.clone(),
                        code: report.exit_code,
                    }),
                },
                // follow-up failures carry no step report
                None => Some(AgentError::PipelineError(message.clone())),
            },
        }
    }
}

/// Runs composite actions against one session
pub struct ProvisionTask {
    session: Session,
    policy: FailurePolicy,
    arbiter: Arc<dyn PortArbiter>,
    events: UnboundedSender<ProgressEvent>,
    cancel: CancelFlag,
    active: AtomicBool,
    fsm: RwLock<RunFsm>,
}

impl ProvisionTask {
    pub fn new(
        session: Session,
        policy: FailurePolicy,
        arbiter: Arc<dyn PortArbiter>,
        events: UnboundedSender<ProgressEvent>,
    ) -> Self {
        Self {
            session,
            policy,
            arbiter,
            events,
            cancel: CancelFlag::new(),
            active: AtomicBool::new(false),
            fsm: RwLock::new(RunFsm::new()),
        }
    }

    /// Get the current run state
    pub async fn state(&self) -> RunState {
        self.fsm.read().await.state().clone()
    }

    /// Request advisory cancellation: no further output is forwarded and
    /// un-started steps are skipped, but an in-flight tool runs on
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Execute one action to completion.
    ///
    /// Exactly one run may be active at a time; a second request while one
    /// is running is rejected, not queued.
    pub async fn run(&self, action: PipelineAction) -> Result<RunReport, AgentError> {
        if self
            .active
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(AgentError::PipelineError(
                "a provisioning run is already active".to_string(),
            ));
        }

        let result = self.run_inner(action).await;
        self.active.store(false, Ordering::SeqCst);
        result
    }

    async fn run_inner(&self, action: PipelineAction) -> Result<RunReport, AgentError> {
        let started_at = Utc::now();
        info!("Starting provisioning run: {:?}", action);

        // 1. Prepare: pure step assembly, no I/O
        {
            let mut fsm = self.fsm.write().await;
            *fsm = RunFsm::new();
            fsm.process(RunEvent::Prepare)
                .map_err(AgentError::PipelineError)?;
        }
        let steps = plan::plan(action, &self.session);
        let _ = self.events.send(ProgressEvent::RunStarted {
            action,
            steps: steps.len(),
        });

        // 2. Forward tool output lines into the progress stream
        let (line_tx, mut line_rx) = unbounded_channel::<String>();
        let forwarder = {
            let events = self.events.clone();
            tokio::spawn(async move {
                while let Some(line) = line_rx.recv().await {
                    if events.send(ProgressEvent::Line(line)).is_err() {
                        break;
                    }
                }
            })
        };

        // 3. Execute the steps strictly in sequence
        let runner = ProcessRunner::new(self.cancel.clone());
        let mut reports: Vec<StepReport> = Vec::new();
        let mut first_failed: Option<usize> = None;
        let mut cancelled = false;

        for (index, step) in steps.iter().enumerate() {
            if self.cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            // flasher steps need the port to themselves
            if step.kind.needs_port() {
                if let Err(err) = self.arbiter.release() {
                    self.transition(RunEvent::Failed(index)).await;
                    return Err(AgentError::PortError(format!(
                        "could not release the serial port: {}",
                        err
                    )));
                }
            }

            self.transition(RunEvent::StepStarted(index)).await;
            let _ = self.events.send(ProgressEvent::StepStarted {
                index,
                kind: step.kind,
                command_line: step.command_line(),
            });

            let outcome = runner.run(&step.program, &step.args, &line_tx).await;
            let exit_code = outcome.code();
            let start_error = outcome.start_error().map(|e| e.to_string());

            match &start_error {
                Some(reason) => error!("{}: {}", step.kind.failure_message(), reason),
                None if exit_code != 0 => {
                    error!("{} (exit code {})", step.kind.failure_message(), exit_code)
                }
                None => {}
            }

            let _ = self.events.send(ProgressEvent::StepFinished {
                index,
                kind: step.kind,
                exit_code,
            });
            reports.push(StepReport {
                kind: step.kind,
                command_line: step.command_line(),
                exit_code,
                start_error,
            });

            if matches!(outcome, RunOutcome::Cancelled(_)) {
                cancelled = true;
                break;
            }
            if !outcome.success() {
                if first_failed.is_none() {
                    first_failed = Some(index);
                }
                if self.policy == FailurePolicy::FailFast {
                    break;
                }
            }
        }

        // 4. Action follow-ups, skipped when the steps already failed
        let mut followup_failure: Option<String> = None;
        if first_failed.is_none() && !cancelled {
            if let Err(err) = self.run_followup(action).await {
                error!("{}", err);
                followup_failure = Some(err.to_string());
            }
        }

        drop(line_tx);
        let _ = forwarder.await;

        // 5. Aggregate
        let result = if cancelled {
            RunResult::Cancelled {
                completed: reports.len(),
            }
        } else if let Some(step) = first_failed {
            RunResult::FailedAt {
                step,
                message: steps[step].kind.failure_message(),
            }
        } else if let Some(message) = followup_failure {
            RunResult::FailedAt {
                step: reports.len(),
                message,
            }
        } else {
            RunResult::Succeeded
        };

        let event = match &result {
            RunResult::Succeeded => RunEvent::Succeeded,
            RunResult::FailedAt { step, .. } => RunEvent::Failed(*step),
            RunResult::Cancelled { completed } => RunEvent::Failed(*completed),
        };
        self.transition(event).await;

        let report = RunReport {
            id: uuid::Uuid::new_v4().to_string(),
            action,
            steps: reports,
            result,
            started_at,
            finished_at: Utc::now(),
        };
        info!("Provisioning run finished: {:?}", report.result);
        Ok(report)
    }

    async fn run_followup(&self, action: PipelineAction) -> Result<(), AgentError> {
        match action {
            PipelineAction::UnpackFilesystem => {
                let dir = plan::unpack_dir(&self.session);
                let mut config = self.session.device_config.write().await;
                config.load_device(&dir).await.map_err(|e| {
                    AgentError::ConfigError(format!(
                        "failed to parse the device configuration: {}",
                        e
                    ))
                })?;
                info!("Device configuration loaded from {}", dir.display());
            }
            PipelineAction::BuildOfflinePackage => {
                let firmware = self
                    .session
                    .layout
                    .firmware_dir()
                    .path()
                    .join(&self.session.board.appbin);
                let filesystem = self.session.layout.filesystem_image();
                let target = self.session.layout.firmware_dir().path().join(format!(
                    "{}.efu",
                    self.session.board.name.replace(' ', "_")
                ));

                efu::build(&firmware, filesystem.path(), &target)
                    .await
                    .map_err(|e| {
                        AgentError::UpdateError(format!(
                            "failed to build the update package: {}",
                            e
                        ))
                    })?;
                info!("Update package written to {}", target.display());
            }
            _ => {}
        }
        Ok(())
    }

    async fn transition(&self, event: RunEvent) {
        let mut fsm = self.fsm.write().await;
        if let Err(err) = fsm.process(event) {
            warn!("Run state machine: {}", err);
        }
    }
}
