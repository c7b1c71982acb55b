//! Finite State Machine for one deploy

use serde::{Deserialize, Serialize};

use crate::models::connection::DeployTarget;

/// Deploy state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployState {
    /// Nothing has run yet
    Idle,

    /// Build in progress
    Publishing,

    /// Mirroring the output to the server
    Uploading,

    /// Running the start command
    Starting,

    /// Finished successfully
    Done,

    /// A step failed
    Failed,
}

impl DeployState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeployState::Done | DeployState::Failed)
    }
}

/// Deploy event
#[derive(Debug, Clone)]
pub enum DeployEvent {
    /// Start publishing
    Publish,

    /// Publish finished successfully
    Published,

    /// Upload finished successfully
    Uploaded,

    /// Start command exited cleanly
    Started,

    /// The current step failed
    Fail(String),
}

/// Deploy FSM
#[derive(Debug, Clone)]
pub struct DeployFsm {
    target: DeployTarget,
    state: DeployState,
    error: Option<String>,
}

impl DeployFsm {
    /// Create a new FSM in idle state
    pub fn new(target: DeployTarget) -> Self {
        Self {
            target,
            state: DeployState::Idle,
            error: None,
        }
    }

    /// Get current state
    pub fn state(&self) -> DeployState {
        self.state
    }

    /// Get error message if any
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Process an event and transition state
    pub fn process(&mut self, event: DeployEvent) -> Result<(), String> {
        let new_state = match (self.state, &event) {
            (DeployState::Idle, DeployEvent::Publish) => DeployState::Publishing,

            (DeployState::Publishing, DeployEvent::Published) => match self.target {
                DeployTarget::Local => DeployState::Done,
                DeployTarget::Server => DeployState::Uploading,
            },

            (DeployState::Uploading, DeployEvent::Uploaded) => DeployState::Starting,
            (DeployState::Starting, DeployEvent::Started) => DeployState::Done,

            // Any running step may fail; there is no retry
            (
                DeployState::Publishing | DeployState::Uploading | DeployState::Starting,
                DeployEvent::Fail(err),
            ) => {
                self.error = Some(err.clone());
                DeployState::Failed
            }

            // Invalid transitions
            (state, event) => {
                return Err(format!("Invalid transition: {:?} -> {:?}", state, event));
            }
        };

        self.state = new_state;
        Ok(())
    }
}
