//! Pipeline actions and steps

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Composite provisioning actions exposed to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineAction {
    /// Erase the device flash
    EraseFlash,

    /// Read the device filesystem image into the download directory
    DownloadFilesystem,

    /// Download and unpack the device filesystem, then parse its
    /// configuration
    UnpackFilesystem,

    /// Build a filesystem image from the local fs/ tree
    CreateFilesystem,

    /// Build the filesystem image and bundle it with the application
    /// binary into an offline update package
    BuildOfflinePackage,

    /// Flash firmware and filesystem images onto the device
    UploadFirmware,

    /// Build the filesystem image, erase the flash, and program the device
    CreateAndUploadAll,

    /// Do nothing
    Noop,
}

impl std::str::FromStr for PipelineAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "erase_flash" => Ok(PipelineAction::EraseFlash),
            "download_filesystem" => Ok(PipelineAction::DownloadFilesystem),
            "unpack_filesystem" => Ok(PipelineAction::UnpackFilesystem),
            "create_filesystem" => Ok(PipelineAction::CreateFilesystem),
            "build_offline_package" => Ok(PipelineAction::BuildOfflinePackage),
            "upload_firmware" => Ok(PipelineAction::UploadFirmware),
            "create_and_upload_all" => Ok(PipelineAction::CreateAndUploadAll),
            "noop" => Ok(PipelineAction::Noop),
            _ => Err(format!("Invalid action: {}", s)),
        }
    }
}

/// Stage identity of one step, used for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    MakeFilesystem,
    EraseFlash,
    WriteFlash,
    ReadFlash,
    UnpackFilesystem,
}

impl StepKind {
    pub fn describe(&self) -> &'static str {
        match self {
            StepKind::MakeFilesystem => "build the filesystem image",
            StepKind::EraseFlash => "erase the device flash",
            StepKind::WriteFlash => "program the device",
            StepKind::ReadFlash => "read the device filesystem",
            StepKind::UnpackFilesystem => "unpack the device filesystem",
        }
    }

    pub fn failure_message(&self) -> String {
        format!("failed to {}", self.describe())
    }

    /// Steps that talk to the device need exclusive use of the serial port
    pub fn needs_port(&self) -> bool {
        matches!(
            self,
            StepKind::EraseFlash | StepKind::WriteFlash | StepKind::ReadFlash
        )
    }
}

/// One fully resolved external command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub kind: StepKind,
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl Step {
    /// The assembled command line, for display and diagnostics
    pub fn command_line(&self) -> String {
        let mut parts = vec![self.program.to_string_lossy().into_owned()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}
