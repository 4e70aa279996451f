//! Pipeline orchestration integration tests
//!
//! These drive the orchestrator against stand-in tools (`true`, `false`,
//! small shell scripts) instead of the real flasher binaries.

#![cfg(unix)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use esprov::boards::{Binfile, Board, EsptoolOptions, FilesystemLayout};
use esprov::config::device::DEVICE_CONFIG_FILE;
use esprov::filesys::dir::Dir;
use esprov::pipeline::action::{PipelineAction, StepKind};
use esprov::pipeline::plan;
use esprov::pipeline::task::{
    FailurePolicy, NullArbiter, ProgressEvent, ProvisionTask, RunResult,
};
use esprov::session::Session;
use esprov::storage::layout::ToolLayout;
use serde_json::json;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

fn test_board() -> Board {
    Board {
        name: "ESPS V3".to_string(),
        description: String::new(),
        chip: "esp32".to_string(),
        appbin: "app.bin".to_string(),
        esptool: EsptoolOptions {
            baudrate: "460800".to_string(),
            options: "--before default_reset --after hard_reset".to_string(),
            flashcmd: "write_flash -z".to_string(),
        },
        binfiles: vec![Binfile {
            name: "app.bin".to_string(),
            offset: "0x10000".to_string(),
        }],
        filesystem: FilesystemLayout {
            page: "256".to_string(),
            block: "8192".to_string(),
            size: "1M".to_string(),
            offset: "0x200000".to_string(),
        },
    }
}

/// Session whose tools all succeed without touching any hardware
fn test_session(base: &Path) -> Session {
    let mut session = Session::new(
        test_board(),
        "ttyUSB0".to_string(),
        ToolLayout::new(base),
    );
    session.tools.python = PathBuf::from("true");
    session.tools.flasher = PathBuf::from("upload.py");
    session.tools.mkfilesystem = PathBuf::from("true");
    session
}

async fn write_script(dir: &Dir, name: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = dir.path().join(name);
    tokio::fs::write(&path, format!("#!/bin/sh\n{}\n", body))
        .await
        .unwrap();
    let mut perms = tokio::fs::metadata(&path).await.unwrap().permissions();
    perms.set_mode(0o755);
    tokio::fs::set_permissions(&path, perms).await.unwrap();
    path
}

async fn drain(mut rx: UnboundedReceiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_create_filesystem_success() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let session = test_session(dir.path());

    let (tx, rx) = unbounded_channel();
    let task = ProvisionTask::new(session, FailurePolicy::default(), Arc::new(NullArbiter), tx);

    let report = task.run(PipelineAction::CreateFilesystem).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.steps.len(), 1);
    assert_eq!(report.steps[0].kind, StepKind::MakeFilesystem);
    assert_eq!(report.steps[0].exit_code, 0);
    assert!(report.to_error().is_none());

    drop(task);
    let events = drain(rx).await;
    assert!(matches!(
        events.first(),
        Some(ProgressEvent::RunStarted { steps: 1, .. })
    ));
    assert!(matches!(
        events.last(),
        Some(ProgressEvent::StepFinished { exit_code: 0, .. })
    ));

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_step_output_flows_in_order() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let mut session = test_session(dir.path());
    session.tools.mkfilesystem =
        write_script(&dir, "chattytool", "echo building; echo packing").await;

    let (tx, rx) = unbounded_channel();
    let task = ProvisionTask::new(session, FailurePolicy::default(), Arc::new(NullArbiter), tx);

    let report = task.run(PipelineAction::CreateFilesystem).await.unwrap();
    assert!(report.succeeded());

    drop(task);
    let lines: Vec<String> = drain(rx)
        .await
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Line(line) => Some(line),
            _ => None,
        })
        .collect();
    assert_eq!(lines, vec!["building", "packing"]);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_best_effort_reports_first_failure_but_runs_on() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let mut session = test_session(dir.path());
    // the filesystem build fails; erase and write still run (and succeed)
    session.tools.mkfilesystem = PathBuf::from("false");

    let (tx, _rx) = unbounded_channel();
    let task = ProvisionTask::new(
        session,
        FailurePolicy::BestEffort,
        Arc::new(NullArbiter),
        tx,
    );

    let report = task.run(PipelineAction::CreateAndUploadAll).await.unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.steps.len(), 3);
    assert_eq!(report.steps[1].exit_code, 0);
    assert_eq!(report.steps[2].exit_code, 0);

    match &report.result {
        RunResult::FailedAt { step, message } => {
            assert_eq!(*step, 0);
            assert_eq!(message, "failed to build the filesystem image");
        }
        other => panic!("expected FailedAt, got {:?}", other),
    }
    assert!(report.to_error().is_some());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_fail_fast_stops_at_first_failure() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let mut session = test_session(dir.path());
    session.tools.mkfilesystem = PathBuf::from("false");

    let (tx, _rx) = unbounded_channel();
    let task = ProvisionTask::new(
        session,
        FailurePolicy::FailFast,
        Arc::new(NullArbiter),
        tx,
    );

    let report = task.run(PipelineAction::CreateAndUploadAll).await.unwrap();
    assert!(!report.succeeded());
    assert_eq!(report.steps.len(), 1);

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_start_failure_is_distinguishable() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let mut session = test_session(dir.path());
    session.tools.mkfilesystem = PathBuf::from("/definitely/not/a/real/tool");

    let (tx, _rx) = unbounded_channel();
    let task = ProvisionTask::new(session, FailurePolicy::default(), Arc::new(NullArbiter), tx);

    let report = task.run(PipelineAction::CreateFilesystem).await.unwrap();
    assert!(!report.succeeded());
    assert!(report.steps[0].start_error.is_some());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_unpack_followup_parses_device_config() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let session = test_session(dir.path());

    // pre-seed what the read/unpack tools would have produced
    let unpacked = Dir::new(plan::unpack_dir(&session));
    unpacked.create().await.unwrap();
    unpacked
        .file(DEVICE_CONFIG_FILE)
        .write_json(&json!({ "network": { "ssid": "on-device" } }))
        .await
        .unwrap();

    let (tx, _rx) = unbounded_channel();
    let device_config = session.device_config.clone();
    let task = ProvisionTask::new(session, FailurePolicy::default(), Arc::new(NullArbiter), tx);

    let report = task.run(PipelineAction::UnpackFilesystem).await.unwrap();
    assert!(report.succeeded());
    assert_eq!(report.steps.len(), 2);

    let config = device_config.read().await;
    assert!(config.has_device());
    assert_eq!(config.ssid(), "on-device");

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_unpack_followup_failure_is_terminal() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    // nothing gets unpacked, so the config parse must fail the run
    let session = test_session(dir.path());

    let (tx, _rx) = unbounded_channel();
    let task = ProvisionTask::new(session, FailurePolicy::default(), Arc::new(NullArbiter), tx);

    let report = task.run(PipelineAction::UnpackFilesystem).await.unwrap();
    assert!(!report.succeeded());
    match &report.result {
        RunResult::FailedAt { step, message } => {
            assert_eq!(*step, 2);
            assert!(message.contains("device configuration"));
        }
        other => panic!("expected FailedAt, got {:?}", other),
    }

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_build_offline_package_followup() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let session = test_session(dir.path());

    // the stand-in mkfilesystem builds nothing, so provide both images
    let fw_dir = session.layout.firmware_dir();
    fw_dir.create().await.unwrap();
    fw_dir.file("app.bin").write_bytes(b"application").await.unwrap();
    session
        .layout
        .filesystem_image()
        .write_bytes(b"filesystem")
        .await
        .unwrap();

    let (tx, _rx) = unbounded_channel();
    let layout = session.layout.clone();
    let task = ProvisionTask::new(session, FailurePolicy::default(), Arc::new(NullArbiter), tx);

    let report = task.run(PipelineAction::BuildOfflinePackage).await.unwrap();
    assert!(report.succeeded(), "result: {:?}", report.result);

    let container = layout.firmware_dir().file("ESPS_V3.efu");
    assert!(container.exists().await);
    let records = esprov::efu::read(container.path()).await.unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].data, b"application");
    assert_eq!(records[1].data, b"filesystem");

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_second_run_is_rejected_while_active() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let mut session = test_session(dir.path());
    session.tools.mkfilesystem = write_script(&dir, "slowtool", "sleep 1").await;

    let (tx, _rx) = unbounded_channel();
    let task = Arc::new(ProvisionTask::new(
        session,
        FailurePolicy::default(),
        Arc::new(NullArbiter),
        tx,
    ));

    let first = {
        let task = task.clone();
        tokio::spawn(async move { task.run(PipelineAction::CreateFilesystem).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;

    // one run at a time: the second request is rejected, not queued
    assert!(task.run(PipelineAction::CreateFilesystem).await.is_err());

    let report = first.await.unwrap().unwrap();
    assert!(report.succeeded());

    dir.delete().await.unwrap();
}

#[tokio::test]
async fn test_cancellation_skips_remaining_steps() {
    let dir = Dir::create_temp_dir("esprov-pipe").await.unwrap();
    let mut session = test_session(dir.path());
    session.tools.mkfilesystem = write_script(&dir, "slowtool", "sleep 1").await;

    let (tx, _rx) = unbounded_channel();
    let task = Arc::new(ProvisionTask::new(
        session,
        FailurePolicy::default(),
        Arc::new(NullArbiter),
        tx,
    ));

    let handle = {
        let task = task.clone();
        tokio::spawn(async move { task.run(PipelineAction::CreateAndUploadAll).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    task.cancel();

    let report = handle.await.unwrap().unwrap();
    assert!(matches!(
        report.result,
        RunResult::Cancelled { completed: 1 }
    ));
    assert_eq!(report.steps.len(), 1);

    dir.delete().await.unwrap();
}
