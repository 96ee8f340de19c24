//! Events emitted by the lifecycle controller
//!
//! Consumed by the note editor, the UI and the status layer. This is the only
//! way faults become visible outside the voice subsystem.

use serde::{Deserialize, Serialize};

use crate::audio::AudioArtifact;
use crate::commands::{AppAction, EditorAction};
use crate::state::ListeningMode;

/// Coarse lifecycle status attached to status updates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningStatus {
    Listening,
    WakeDetected,
    Stopping,
    Restarting,
    Idle,
    Error,
}

/// Events emitted by the controller
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum VoiceEvent {
    /// Human-readable lifecycle tick
    CommandStatusUpdate {
        status: ListeningStatus,
        message: String,
    },

    /// A session opened
    ListeningStarted { mode: ListeningMode },

    /// Provisional dictated content, not yet committed
    DictationUpdate { transcript: String },

    /// Committed content segment to append to the note body
    DictationFinalized { transcript: String },

    /// A session was torn down
    ListeningFinished {
        mode: ListeningMode,
        /// Recording of the session, dictation only
        audio_artifact: Option<AudioArtifact>,
        /// Duration in milliseconds that the session was open
        duration_ms: u64,
    },

    /// An application command was recognized
    CommandExecute { command: AppAction, keyword: String },

    /// An editor command forwarded to the note editor
    EditorCommand { action: EditorAction, keyword: String },

    /// A command session heard something that is not a known command
    CommandUnrecognized { transcript: String },

    /// Speech recognition is unavailable; the subsystem is disabled
    RecognitionUnsupported { message: String },

    /// Microphone access was refused
    PermissionDenied { message: String },
}

impl VoiceEvent {
    pub fn status(status: ListeningStatus, message: impl Into<String>) -> Self {
        VoiceEvent::CommandStatusUpdate {
            status,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for VoiceEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoiceEvent::CommandStatusUpdate { status, message } => {
                write!(f, "STATUS {:?}: {}", status, message)
            }
            VoiceEvent::ListeningStarted { mode } => write!(f, "LISTENING_STARTED ({})", mode),
            VoiceEvent::DictationUpdate { transcript } => {
                write!(f, "DICTATION_UPDATE \"{}\"", transcript)
            }
            VoiceEvent::DictationFinalized { transcript } => {
                write!(f, "DICTATION_FINALIZED \"{}\"", transcript)
            }
            VoiceEvent::ListeningFinished {
                mode,
                audio_artifact,
                duration_ms,
            } => write!(
                f,
                "LISTENING_FINISHED ({}, {}ms, audio: {})",
                mode,
                duration_ms,
                audio_artifact.as_ref().map_or(0, |a| a.byte_len)
            ),
            VoiceEvent::CommandExecute { command, keyword } => {
                write!(f, "COMMAND_EXECUTE {:?} (\"{}\")", command, keyword)
            }
            VoiceEvent::EditorCommand { action, keyword } => {
                write!(f, "EDITOR_COMMAND {:?} (\"{}\")", action, keyword)
            }
            VoiceEvent::CommandUnrecognized { transcript } => {
                write!(f, "COMMAND_UNRECOGNIZED \"{}\"", transcript)
            }
            VoiceEvent::RecognitionUnsupported { message } => {
                write!(f, "RECOGNITION_UNSUPPORTED: {}", message)
            }
            VoiceEvent::PermissionDenied { message } => write!(f, "PERMISSION_DENIED: {}", message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = VoiceEvent::ListeningFinished {
            mode: ListeningMode::ActiveDictation,
            audio_artifact: None,
            duration_ms: 1500,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("listening_finished"));
        assert!(json.contains("active_dictation"));
        assert!(json.contains("1500"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"editor_command","action":"delete_last_word","keyword":"delete last word"}"#;
        let event: VoiceEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(
            event,
            VoiceEvent::EditorCommand { action: EditorAction::DeleteLastWord, .. }
        ));
    }

    #[test]
    fn test_display() {
        let event = VoiceEvent::ListeningStarted {
            mode: ListeningMode::AmbientListening,
        };
        assert_eq!(event.to_string(), "LISTENING_STARTED (AmbientListening)");
    }
}
