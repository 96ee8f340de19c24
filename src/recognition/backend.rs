//! Platform-facing traits and the raw events a recognizer reports
//!
//! Implementations push [`RecognizerEvent`]s into the controller's input
//! channel. Events within one stream must be delivered in order.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::PermissionDenied;

/// Identifies one continuous recognizer stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub u64);

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "stream-{}", self.0)
    }
}

/// Recognizer stream configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Keep recognizing across pauses instead of ending after one utterance
    pub continuous: bool,
    /// Report provisional results before they are final
    pub interim_results: bool,
    pub max_alternatives: u32,
}

impl StreamOptions {
    /// Low-granularity stream used while waiting for a wake phrase
    pub fn ambient() -> Self {
        Self {
            continuous: true,
            interim_results: false,
            max_alternatives: 1,
        }
    }

    /// High-granularity stream used for commands and dictation
    pub fn active() -> Self {
        Self {
            continuous: true,
            interim_results: true,
            max_alternatives: 1,
        }
    }
}

/// One recognized segment inside a result event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecognitionSegment {
    pub transcript: String,
    pub is_final: bool,
}

impl RecognitionSegment {
    pub fn interim(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: false,
        }
    }

    pub fn final_(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            is_final: true,
        }
    }
}

/// Error codes a recognizer stream can report
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecognizerErrorKind {
    NoSpeech,
    AudioCapture,
    Aborted,
    NotAllowed,
    ServiceNotAllowed,
    LanguageNotSupported,
    Network,
    Other(String),
}

impl RecognizerErrorKind {
    /// Errors that are logged and otherwise ignored
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::NoSpeech | Self::AudioCapture | Self::Aborted)
    }

    /// Errors meaning recognition can never work on this platform
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::ServiceNotAllowed | Self::LanguageNotSupported)
    }
}

impl std::fmt::Display for RecognizerErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoSpeech => write!(f, "no-speech"),
            Self::AudioCapture => write!(f, "audio-capture"),
            Self::Aborted => write!(f, "aborted"),
            Self::NotAllowed => write!(f, "not-allowed"),
            Self::ServiceNotAllowed => write!(f, "service-not-allowed"),
            Self::LanguageNotSupported => write!(f, "language-not-supported"),
            Self::Network => write!(f, "network"),
            Self::Other(code) => write!(f, "{}", code),
        }
    }
}

/// Raw notification from a recognizer stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognizerEventKind {
    Started,
    /// One result tick, possibly carrying several segments
    Result(Vec<RecognitionSegment>),
    Error(RecognizerErrorKind),
    Ended,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizerEvent {
    pub stream: StreamId,
    pub kind: RecognizerEventKind,
}

/// Errors when opening a recognizer stream
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognizerError {
    #[error("speech recognition is not supported on this platform")]
    Unsupported,
    #[error("recognizer failed to start: {0}")]
    Backend(String),
}

/// A continuous speech recognizer
///
/// `start`/`stop` only issue requests; the outcome arrives later as
/// `Started`/`Ended` events for the same stream.
pub trait SpeechRecognizer: Send {
    fn is_supported(&self) -> bool;

    fn start(&mut self, stream: StreamId, options: StreamOptions) -> Result<(), RecognizerError>;

    fn stop(&mut self, stream: StreamId);
}

/// Microphone permission gate, the only asynchronous step of starting a session
#[async_trait]
pub trait MicrophoneAccess: Send + Sync {
    async fn request(&self) -> Result<(), PermissionDenied>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(RecognizerErrorKind::NoSpeech.is_transient());
        assert!(RecognizerErrorKind::AudioCapture.is_transient());
        assert!(!RecognizerErrorKind::Network.is_transient());
        assert!(RecognizerErrorKind::LanguageNotSupported.is_unsupported());
        assert!(!RecognizerErrorKind::NotAllowed.is_unsupported());
    }

    #[test]
    fn test_error_kind_uses_recognizer_codes() {
        let json = serde_json::to_string(&RecognizerErrorKind::NoSpeech).unwrap();
        assert_eq!(json, "\"no-speech\"");
        assert_eq!(RecognizerErrorKind::AudioCapture.to_string(), "audio-capture");
    }
}
