use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Step of the camera → tracker → socket initialization sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InitStep {
    Camera,
    Tracker,
    Socket,
}

impl InitStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Camera => "camera",
            Self::Tracker => "tracker",
            Self::Socket => "socket",
        }
    }
}

impl fmt::Display for InitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure reported by a capture/tracker/socket collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceError {
    #[error("device not found: {0}")]
    NotFound(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("device failure: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error("{step} initialization failed after {attempts} attempt(s): {source}")]
    InitFailed {
        step: InitStep,
        attempts: u32,
        #[source]
        source: DeviceError,
    },
    #[error("session already started")]
    AlreadyStarted,
    #[error("session already terminated")]
    Terminated,
    #[error("invalid session config: {0}")]
    InvalidConfig(String),
    #[error("result submission failed: {0}")]
    Submission(#[from] SinkError),
}

impl SessionError {
    /// Whether this error ended the session. Only init failures do; channel
    /// loss during init is reported as a socket `InitFailed`.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InitFailed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    #[error("result sink closed")]
    Closed,
    #[error("result sink rejected submission: {0}")]
    Rejected(String),
}
