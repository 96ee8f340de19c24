//! Error types shared across the voice subsystem
//!
//! None of these cross the public event boundary. The controller resolves
//! them locally and reports them as status/error events.

/// The user or platform refused microphone access
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("microphone access denied: {reason}")]
pub struct PermissionDenied {
    pub reason: String,
}

impl PermissionDenied {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors when starting the raw audio recorder
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecorderError {
    #[error("recorder already running for {0}")]
    AlreadyRecording(String),
    #[error("recorder failed to start: {0}")]
    Backend(String),
}

/// Errors loading or validating a command table
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("failed to read command table: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse command table: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("command descriptor {index} has an empty keyword")]
    EmptyKeyword { index: usize },
    #[error("keyword '{0}' is claimed by more than one command")]
    DuplicateKeyword(String),
    #[error("command table defines no wake phrases")]
    NoWakePhrases,
    #[error("wake phrase cannot be empty")]
    EmptyWakePhrase,
}
