//! Error types for the provisioning agent

use thiserror::Error;

/// Main error type for the provisioning agent
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("failed to start {tool}: {reason}")]
    ToolStart { tool: String, reason: String },

    #[error("{stage}: {tool} exited with code {code}")]
    NonZeroExit {
        stage: String,
        tool: String,
        code: i32,
    },

    #[error("Serial port error: {0}")]
    PortError(String),

    #[error("Board error: {0}")]
    BoardError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pipeline error: {0}")]
    PipelineError(String),

    #[error("Update package error: {0}")]
    UpdateError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for AgentError {
    fn from(err: anyhow::Error) -> Self {
        AgentError::Internal(err.to_string())
    }
}
