//! Workspace layout
//!
//! On-disk layout of a provisioning workspace: bundled tool binaries,
//! firmware images, the local filesystem source tree, and a scratch
//! directory for images downloaded off a device.

use std::path::PathBuf;

use crate::errors::AgentError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// Name of the filesystem image built from the local fs/ tree
pub const FS_IMAGE: &str = "filesystem.bin";

/// Per-OS subdirectory holding the bundled tool binaries
#[cfg(target_os = "windows")]
const PLATFORM_DIR: &str = "win32";
#[cfg(target_os = "macos")]
const PLATFORM_DIR: &str = "macos";
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const PLATFORM_DIR: &str = "linux64";

/// Workspace layout for the agent
#[derive(Debug, Clone)]
pub struct ToolLayout {
    /// Base directory for the whole workspace
    pub base_dir: PathBuf,
}

impl ToolLayout {
    /// Create a new workspace layout
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    /// Get the bundled tools directory
    pub fn bin_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("bin"))
    }

    /// Get the filesystem source directory (config + web assets)
    pub fn fs_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("fs"))
    }

    /// Get the firmware binaries directory
    pub fn firmware_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("firmware"))
    }

    /// Get the directory for filesystem images read off a device
    pub fn download_dir(&self) -> Dir {
        Dir::new(self.base_dir.join("downloaded"))
    }

    /// Get the board catalog manifest
    pub fn catalog_file(&self) -> File {
        self.firmware_dir().file("firmware.json")
    }

    /// Get the bundled default device configuration
    pub fn local_config_file(&self) -> File {
        self.fs_dir().file("config.json")
    }

    /// Get the filesystem image built from the fs/ tree
    pub fn filesystem_image(&self) -> File {
        self.firmware_dir().file(FS_IMAGE)
    }

    /// Setup the workspace (create the download scratch directory)
    pub async fn setup(&self) -> Result<(), AgentError> {
        self.download_dir().create().await?;
        Ok(())
    }
}

/// Resolved external tool binaries
///
/// Kept separate from the layout so tests and unusual installs can point
/// individual tools elsewhere.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    /// Python interpreter hosting the flasher
    pub python: PathBuf,

    /// Flasher CLI script
    pub flasher: PathBuf,

    /// Filesystem image builder binary
    pub mkfilesystem: PathBuf,
}

impl ToolPaths {
    /// Resolve the tool binaries inside a workspace
    pub fn resolve(layout: &ToolLayout) -> Self {
        let bin = layout.bin_dir();
        let python = if cfg!(target_os = "windows") {
            bin.subdir(PLATFORM_DIR).path().join("python3").join("python")
        } else {
            // system interpreter, resolved through PATH
            PathBuf::from("python")
        };

        Self {
            python,
            flasher: bin.path().join("upload.py"),
            mkfilesystem: bin.subdir(PLATFORM_DIR).path().join("mklittlefs"),
        }
    }
}
