//! Error types for aotship

use thiserror::Error;

/// Main error type for the deploy pipeline
#[derive(Error, Debug)]
pub enum DeployError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("SSH error: {0}")]
    SshError(#[from] ssh2::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Toolchain missing: {0}")]
    ToolchainMissing(String),

    #[error("Build error: {0}")]
    Build(String),

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Transfer error for {path}: {message}")]
    Transfer { path: String, message: String },

    #[error("Remote command error: {0}")]
    RemoteExec(String),

    #[error("Notification error: {0}")]
    Notify(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DeployError {
    /// Shorthand for a transfer failure on `path`
    pub fn transfer(path: impl Into<String>, message: impl ToString) -> Self {
        DeployError::Transfer {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

impl From<anyhow::Error> for DeployError {
    fn from(err: anyhow::Error) -> Self {
        DeployError::Internal(err.to_string())
    }
}

impl From<tokio::task::JoinError> for DeployError {
    fn from(err: tokio::task::JoinError) -> Self {
        DeployError::Internal(format!("blocking task failed: {err}"))
    }
}
