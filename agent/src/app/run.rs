//! Application entry: wires a session together and executes one action

use std::future::Future;
use std::sync::Arc;

use tokio::sync::mpsc::unbounded_channel;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::boards::BoardCatalog;
use crate::config::device::DeviceConfig;
use crate::errors::AgentError;
use crate::pipeline::task::{NullArbiter, ProgressEvent, ProvisionTask, RunReport, RunResult};
use crate::session::Session;
use crate::storage::layout::ToolLayout;

/// Execute one provisioning action and return its report.
///
/// `shutdown` requests advisory cancellation: the current tool runs on,
/// but no further output is forwarded and remaining steps are skipped.
pub async fn run(
    options: AppOptions,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<RunReport, AgentError> {
    let layout = ToolLayout::new(&options.base_dir);
    layout.setup().await?;

    // Select the board
    let catalog = BoardCatalog::load(&layout.catalog_file()).await?;
    let board = match &options.board {
        Some(name) => catalog
            .find(name)
            .ok_or_else(|| AgentError::BoardError(format!("unknown board: {}", name)))?
            .clone(),
        None => catalog
            .boards
            .first()
            .ok_or_else(|| AgentError::ConfigError("no boards found in the catalog".to_string()))?
            .clone(),
    };
    info!("Selected board: {} ({})", board.name, board.chip);
    board.verify(layout.firmware_dir().path()).await?;

    let mut session = Session::new(board, options.port.clone(), layout);

    // Local defaults load up front; the device tree arrives after an
    // unpack run
    match DeviceConfig::load_local(&session.layout.local_config_file()).await {
        Ok(config) => session.device_config = Arc::new(RwLock::new(config)),
        Err(err) => warn!("Unable to read the local default configuration: {}", err),
    }

    // The UI-equivalent sink: progress goes to stdout in execution order
    let (events_tx, mut events_rx) = unbounded_channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            match event {
                ProgressEvent::RunStarted { action, steps } => {
                    println!("-= {:?}: {} step(s) =-", action, steps)
                }
                ProgressEvent::StepStarted { command_line, .. } => println!("{}", command_line),
                ProgressEvent::Line(line) => println!("{}", line),
                ProgressEvent::StepFinished { .. } => println!("Done"),
            }
        }
    });

    let task = Arc::new(ProvisionTask::new(
        session,
        options.policy,
        Arc::new(NullArbiter),
        events_tx,
    ));

    let mut run_handle = {
        let task = task.clone();
        let action = options.action;
        tokio::spawn(async move { task.run(action).await })
    };

    let report = tokio::select! {
        result = &mut run_handle => unwrap_join(result)?,
        _ = shutdown => {
            info!("Shutdown requested, cancelling the run...");
            task.cancel();
            unwrap_join(run_handle.await)?
        }
    };

    // closing the progress channel ends the printer
    drop(task);
    let _ = printer.await;

    match &report.result {
        RunResult::Succeeded => println!("\n-= Provisioning Complete =-"),
        RunResult::FailedAt { message, .. } => {
            println!("\n*** PROVISIONING FAILED: {} ***", message)
        }
        RunResult::Cancelled { .. } => println!("\n*** PROVISIONING CANCELLED ***"),
    }

    Ok(report)
}

fn unwrap_join(
    result: Result<Result<RunReport, AgentError>, tokio::task::JoinError>,
) -> Result<RunReport, AgentError> {
    result.map_err(|e| AgentError::Internal(e.to_string()))?
}
