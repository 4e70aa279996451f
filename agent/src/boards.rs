//! Board catalog
//!
//! Static descriptors of the supported controller families, loaded from the
//! `firmware.json` manifest that ships next to the firmware binaries. The
//! pipeline reads the active board; it never mutates it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::AgentError;
use crate::filesys::file::File;

/// One supported target device family
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Board {
    /// Display name, also used to derive download file names
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Chip identifier handed to the flasher (`--chip`)
    pub chip: String,

    /// Application image bundled into offline update packages
    #[serde(default)]
    pub appbin: String,

    /// Flasher invocation options
    pub esptool: EsptoolOptions,

    /// Firmware images and their flash offsets, in flash order
    #[serde(default)]
    pub binfiles: Vec<Binfile>,

    /// Filesystem geometry and flash location
    pub filesystem: FilesystemLayout,
}

/// Flasher CLI options for one board
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsptoolOptions {
    /// Baud rate for flashing, not the monitor baud rate
    pub baudrate: String,

    /// Reset handling options, space-separated
    #[serde(default)]
    pub options: String,

    /// Flash sub-command and its options, space-separated
    #[serde(default)]
    pub flashcmd: String,
}

/// One firmware image and its flash offset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Binfile {
    pub name: String,
    pub offset: String,
}

/// Filesystem geometry parameters
///
/// Kept as strings: the values are passed through to the external tools
/// verbatim (offsets are hex, sizes may carry suffixes like `1M`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilesystemLayout {
    pub page: String,
    pub block: String,
    pub size: String,
    pub offset: String,
}

impl Board {
    /// Check that every firmware image listed for this board exists
    pub async fn verify(&self, fw_dir: &Path) -> Result<(), AgentError> {
        for binfile in &self.binfiles {
            let file = File::new(fw_dir.join(&binfile.name));
            if !file.exists().await {
                return Err(AgentError::BoardError(format!(
                    "firmware file {} is missing",
                    binfile.name
                )));
            }
        }
        Ok(())
    }
}

/// The board catalog manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoardCatalog {
    #[serde(default)]
    pub release: String,

    #[serde(default)]
    pub version: String,

    /// Monitor baud rate for the serial console
    #[serde(default)]
    pub baudrate: String,

    pub boards: Vec<Board>,
}

impl BoardCatalog {
    /// Load the catalog manifest
    pub async fn load(file: &File) -> Result<Self, AgentError> {
        if !file.exists().await {
            return Err(AgentError::ConfigError(format!(
                "board catalog {} not found",
                file.path().display()
            )));
        }

        let catalog: Self = file.read_json().await?;
        if catalog.boards.is_empty() {
            return Err(AgentError::ConfigError(
                "no boards found in the catalog".to_string(),
            ));
        }

        Ok(catalog)
    }

    /// Look up a board by name
    pub fn find(&self, name: &str) -> Option<&Board> {
        self.boards.iter().find(|b| b.name == name)
    }
}
