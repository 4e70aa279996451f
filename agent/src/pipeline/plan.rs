//! Step assembly
//!
//! Pure translation of a pipeline action into the ordered external
//! commands that implement it. Everything here is a function of the
//! session's board, port and tool paths; no I/O happens until the
//! orchestrator executes the steps.

use std::path::PathBuf;

use crate::pipeline::action::{PipelineAction, Step, StepKind};
use crate::session::Session;
use crate::utils::split_opts;

/// Expand an action into its ordered step list
pub fn plan(action: PipelineAction, session: &Session) -> Vec<Step> {
    match action {
        PipelineAction::EraseFlash => vec![erase_flash(session)],
        PipelineAction::DownloadFilesystem => vec![read_flash(session)],
        PipelineAction::UnpackFilesystem => {
            vec![read_flash(session), unpack_filesystem(session)]
        }
        PipelineAction::CreateFilesystem => vec![make_filesystem(session)],
        PipelineAction::BuildOfflinePackage => vec![make_filesystem(session)],
        PipelineAction::UploadFirmware => vec![write_flash(session)],
        PipelineAction::CreateAndUploadAll => vec![
            make_filesystem(session),
            erase_flash(session),
            write_flash(session),
        ],
        PipelineAction::Noop => Vec::new(),
    }
}

/// File stem for filesystem images read off a device:
/// `<board name>_<offset>_<size>` with spaces replaced by underscores
pub fn download_stem(session: &Session) -> String {
    format!(
        "{}_{}_{}",
        session.board.name.replace(' ', "_"),
        session.board.filesystem.offset,
        session.board.filesystem.size
    )
}

/// Path the downloaded filesystem image is written to
pub fn download_image(session: &Session) -> PathBuf {
    session
        .layout
        .download_dir()
        .path()
        .join(format!("{}.bin", download_stem(session)))
}

/// Directory the downloaded filesystem image is unpacked into
pub fn unpack_dir(session: &Session) -> PathBuf {
    session.layout.download_dir().path().join(download_stem(session))
}

/// Common flasher invocation: interpreter, script, chip, baud and port
fn flasher_prelude(session: &Session) -> (PathBuf, Vec<String>) {
    let args = vec![
        session.tools.flasher.to_string_lossy().into_owned(),
        "--chip".to_string(),
        session.board.chip.clone(),
        "--baud".to_string(),
        session.board.esptool.baudrate.clone(),
        "--port".to_string(),
        session.port_path(),
    ];
    (session.tools.python.clone(), args)
}

fn erase_flash(session: &Session) -> Step {
    let (program, mut args) = flasher_prelude(session);
    args.push("erase_flash".to_string());

    Step {
        kind: StepKind::EraseFlash,
        program,
        args,
    }
}

fn write_flash(session: &Session) -> Step {
    let (program, mut args) = flasher_prelude(session);

    // reset handling lives in the board's option string, the flash
    // sub-command can carry options of its own
    args.extend(split_opts(&session.board.esptool.options));
    args.extend(split_opts(&session.board.esptool.flashcmd));

    let fw_dir = session.layout.firmware_dir();
    for binfile in &session.board.binfiles {
        args.push(binfile.offset.clone());
        args.push(fw_dir.path().join(&binfile.name).to_string_lossy().into_owned());
    }

    // and finally the filesystem image
    args.push(session.board.filesystem.offset.clone());
    args.push(
        session
            .layout
            .filesystem_image()
            .path()
            .to_string_lossy()
            .into_owned(),
    );

    Step {
        kind: StepKind::WriteFlash,
        program,
        args,
    }
}

fn read_flash(session: &Session) -> Step {
    let (program, mut args) = flasher_prelude(session);
    let fs = &session.board.filesystem;

    args.extend(
        ["--before", "default_reset", "--after", "hard_reset", "read_flash"]
            .map(String::from),
    );
    args.push(fs.offset.clone());
    args.push(fs.size.clone());
    args.push(download_image(session).to_string_lossy().into_owned());

    Step {
        kind: StepKind::ReadFlash,
        program,
        args,
    }
}

fn make_filesystem(session: &Session) -> Step {
    let fs = &session.board.filesystem;
    let args = vec![
        "-p".to_string(),
        fs.page.clone(),
        "-b".to_string(),
        fs.block.clone(),
        "-s".to_string(),
        fs.size.clone(),
        "-c".to_string(),
        session.layout.fs_dir().path().to_string_lossy().into_owned(),
        session
            .layout
            .filesystem_image()
            .path()
            .to_string_lossy()
            .into_owned(),
    ];

    Step {
        kind: StepKind::MakeFilesystem,
        program: session.tools.mkfilesystem.clone(),
        args,
    }
}

fn unpack_filesystem(session: &Session) -> Step {
    let fs = &session.board.filesystem;
    let args = vec![
        "-p".to_string(),
        fs.page.clone(),
        "-b".to_string(),
        fs.block.clone(),
        "-s".to_string(),
        fs.size.clone(),
        "--unpack".to_string(),
        download_image(session).to_string_lossy().into_owned(),
        unpack_dir(session).to_string_lossy().into_owned(),
    ];

    Step {
        kind: StepKind::UnpackFilesystem,
        program: session.tools.mkfilesystem.clone(),
        args,
    }
}
