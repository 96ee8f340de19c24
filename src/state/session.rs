//! Listening modes and the per-session value the controller owns

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::audio::AudioCaptureCoordinator;
use crate::recognition::{RecognitionSession, StreamOptions};

/// The four possible listening modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListeningMode {
    /// Nothing is listening
    #[default]
    Idle,
    /// Low-engagement recognition waiting for a wake phrase
    AmbientListening,
    /// A single spoken command is expected
    ActiveCommand,
    /// Speech is committed as note content, audio is recorded
    ActiveDictation,
}

impl ListeningMode {
    /// Whether this mode is one of the two active modes
    pub fn is_active(self) -> bool {
        matches!(self, Self::ActiveCommand | Self::ActiveDictation)
    }

    /// Recognizer options used for streams opened in this mode
    pub fn stream_options(self) -> StreamOptions {
        match self {
            Self::AmbientListening => StreamOptions::ambient(),
            _ => StreamOptions::active(),
        }
    }
}

impl std::fmt::Display for ListeningMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ListeningMode::Idle => write!(f, "Idle"),
            ListeningMode::AmbientListening => write!(f, "AmbientListening"),
            ListeningMode::ActiveCommand => write!(f, "ActiveCommand"),
            ListeningMode::ActiveDictation => write!(f, "ActiveDictation"),
        }
    }
}

/// Which active mode a caller is asking for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActiveKind {
    Command,
    Dictation,
}

impl From<ActiveKind> for ListeningMode {
    fn from(kind: ActiveKind) -> Self {
        match kind {
            ActiveKind::Command => ListeningMode::ActiveCommand,
            ActiveKind::Dictation => ListeningMode::ActiveDictation,
        }
    }
}

/// Identifies one listening session (and its audio recording)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// State of the session currently open
///
/// Created when the controller starts listening, discarded once the
/// recognizer has ended and audio/content have been finalized.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub mode: ListeningMode,
    pub started_at: Instant,
    /// Cleared before any stop/cleanup logic runs. While false, an `Ended`
    /// notification finalizes the session instead of restarting the stream.
    pub is_active: bool,
    /// Finalized dictated content, dictation only
    pub transcript_buffer: String,
    /// Consecutive self-ended streams without any speech in between
    pub stream_restarts: u32,
    pub recognition: RecognitionSession,
    /// Present iff `mode == ActiveDictation`
    pub capture: Option<AudioCaptureCoordinator>,
}

impl Session {
    pub fn new(
        id: SessionId,
        mode: ListeningMode,
        recognition: RecognitionSession,
        capture: Option<AudioCaptureCoordinator>,
    ) -> Self {
        debug_assert_eq!(capture.is_some(), mode == ListeningMode::ActiveDictation);
        Self {
            id,
            mode,
            started_at: Instant::now(),
            is_active: true,
            transcript_buffer: String::new(),
            stream_restarts: 0,
            recognition,
            capture,
        }
    }

    /// Append a committed content segment to the transcript buffer
    pub fn append_transcript(&mut self, segment: &str) {
        if !self.transcript_buffer.is_empty() {
            self.transcript_buffer.push(' ');
        }
        self.transcript_buffer.push_str(segment);
    }

    pub fn duration_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recognition::StreamId;

    #[test]
    fn test_default_mode_is_idle() {
        assert_eq!(ListeningMode::default(), ListeningMode::Idle);
        assert!(!ListeningMode::AmbientListening.is_active());
        assert!(ListeningMode::ActiveCommand.is_active());
    }

    #[test]
    fn test_active_kind_maps_to_mode() {
        assert_eq!(ListeningMode::from(ActiveKind::Dictation), ListeningMode::ActiveDictation);
        assert_eq!(ListeningMode::from(ActiveKind::Command), ListeningMode::ActiveCommand);
    }

    #[test]
    fn test_ambient_streams_are_final_only() {
        let options = ListeningMode::AmbientListening.stream_options();
        assert!(!options.interim_results);
        assert!(options.continuous);
        assert_eq!(options.max_alternatives, 1);

        let active = ListeningMode::ActiveDictation.stream_options();
        assert!(active.interim_results);
        assert!(active.continuous);
    }

    #[tokio::test]
    async fn test_transcript_buffer_joins_segments() {
        let recognition = RecognitionSession::new(StreamId(1), StreamOptions::active());
        let mut session =
            Session::new(SessionId(1), ListeningMode::ActiveCommand, recognition, None);
        session.append_transcript("first thought");
        session.append_transcript("second thought");
        assert_eq!(session.transcript_buffer, "first thought second thought");
        assert!(session.is_active);
    }
}
