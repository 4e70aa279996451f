//! Application configuration options

use std::path::PathBuf;

use crate::logs::LogLevel;
use crate::pipeline::action::PipelineAction;
use crate::pipeline::task::FailurePolicy;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Workspace directory holding bin/, fs/, firmware/ and downloaded/
    pub base_dir: PathBuf,

    /// Board name as listed in the catalog; the first catalog entry is
    /// used when unset
    pub board: Option<String>,

    /// Serial port name or device path
    pub port: String,

    /// The action to execute
    pub action: PipelineAction,

    /// Failure policy for multi-step actions
    pub policy: FailurePolicy,

    /// Log level
    pub log_level: LogLevel,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            board: None,
            port: String::new(),
            action: PipelineAction::Noop,
            policy: FailurePolicy::default(),
            log_level: LogLevel::Info,
        }
    }
}
