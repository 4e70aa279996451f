//! Provisioning session state
//!
//! Everything one run needs to know about its environment: the selected
//! board, the serial port, the workspace layout, the resolved tool
//! binaries, and the shared device configuration. Constructed once by the
//! caller and passed down explicitly, so the pipeline and the resolver
//! carry no process-wide state.

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::boards::Board;
use crate::config::device::DeviceConfig;
use crate::storage::layout::{ToolLayout, ToolPaths};

/// Shared state for one provisioning session
#[derive(Clone)]
pub struct Session {
    /// The selected board descriptor
    pub board: Board,

    /// Serial port name or device path
    pub port: String,

    /// Workspace directory layout
    pub layout: ToolLayout,

    /// Resolved external tool binaries
    pub tools: ToolPaths,

    /// Device configuration resolver, filled in by the unpack follow-up
    pub device_config: Arc<RwLock<DeviceConfig>>,
}

impl Session {
    /// Create a session with tools resolved from the workspace layout
    pub fn new(board: Board, port: String, layout: ToolLayout) -> Self {
        let tools = ToolPaths::resolve(&layout);
        Self {
            board,
            port,
            layout,
            tools,
            device_config: Arc::new(RwLock::new(DeviceConfig::new())),
        }
    }

    /// Serial device path handed to the flasher.
    ///
    /// Bare port names get the /dev/ prefix on Unix; full paths and
    /// Windows port names pass through unchanged.
    pub fn port_path(&self) -> String {
        if cfg!(windows) || self.port.contains('/') {
            self.port.clone()
        } else {
            format!("/dev/{}", self.port)
        }
    }
}
