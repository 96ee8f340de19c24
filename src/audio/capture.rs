//! Audio capture coordinator
//!
//! Collects recorder chunks for one dictation session and turns them into a
//! single embeddable artifact. The artifact is only produced once both the
//! recognizer stream and the recorder have reported completion, so a trailing
//! chunk flushed after the last transcript is never lost.

use base64::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::RecorderError;
use crate::state::SessionId;

/// A raw audio recorder
///
/// Chunks and completion are reported back as [`RecorderEvent`]s.
pub trait AudioRecorder: Send {
    fn start(&mut self, session: SessionId) -> Result<(), RecorderError>;

    /// Request the recorder to flush its last chunk and stop
    fn stop(&mut self, session: SessionId);

    /// Container format of the produced chunks, e.g. `audio/webm`
    fn mime_type(&self) -> &str;
}

/// Notification from the recorder, strictly ordered per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderEvent {
    DataAvailable { session: SessionId, data: Vec<u8> },
    Stopped { session: SessionId },
}

impl RecorderEvent {
    pub fn session(&self) -> SessionId {
        match self {
            RecorderEvent::DataAvailable { session, .. } | RecorderEvent::Stopped { session } => {
                *session
            }
        }
    }
}

/// Finalized recording of one dictation session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioArtifact {
    pub mime_type: String,
    /// Size of the merged recording before encoding
    pub byte_len: usize,
    /// `data:<mime>;base64,<payload>`
    pub data_url: String,
}

impl AudioArtifact {
    fn encode(mime_type: &str, data: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            byte_len: data.len(),
            data_url: format!("data:{};base64,{}", mime_type, BASE64_STANDARD.encode(data)),
        }
    }

    /// Decode the payload back into raw bytes
    pub fn decode(&self) -> Option<Vec<u8>> {
        let (_, payload) = self.data_url.split_once(";base64,")?;
        BASE64_STANDARD.decode(payload).ok()
    }
}

/// Owns the audio chunks of one dictation session
#[derive(Debug)]
pub struct AudioCaptureCoordinator {
    session: SessionId,
    mime_type: String,
    chunks: Vec<Vec<u8>>,
    recognizer_done: bool,
    recorder_done: bool,
}

impl AudioCaptureCoordinator {
    pub fn new(session: SessionId, mime_type: impl Into<String>) -> Self {
        Self {
            session,
            mime_type: mime_type.into(),
            chunks: Vec::new(),
            recognizer_done: false,
            recorder_done: false,
        }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// The recorder could not start; treat it as finished with no data
    pub fn mark_recorder_unavailable(&mut self) {
        self.recorder_done = true;
    }

    pub fn push_chunk(&mut self, data: Vec<u8>) {
        if self.recorder_done {
            debug!(session = %self.session, "chunk after recorder stop ignored");
            return;
        }
        if data.is_empty() {
            return;
        }
        debug!(session = %self.session, bytes = data.len(), "audio chunk captured");
        self.chunks.push(data);
    }

    /// Record that the recorder finished. Returns whether finalization can run.
    pub fn recorder_stopped(&mut self) -> bool {
        self.recorder_done = true;
        self.is_ready()
    }

    /// Record that the recognizer stream finished. Returns whether finalization can run.
    pub fn recognizer_ended(&mut self) -> bool {
        self.recognizer_done = true;
        self.is_ready()
    }

    pub fn is_ready(&self) -> bool {
        self.recognizer_done && self.recorder_done
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Merge all chunks in arrival order into one artifact
    ///
    /// Returns `None` when nothing was captured.
    pub fn finalize(self) -> Option<AudioArtifact> {
        let total: usize = self.chunks.iter().map(Vec::len).sum();
        if total == 0 {
            info!(session = %self.session, "dictation finished without audio");
            return None;
        }

        let mut merged = Vec::with_capacity(total);
        for chunk in &self.chunks {
            merged.extend_from_slice(chunk);
        }

        info!(
            session = %self.session,
            chunks = self.chunks.len(),
            bytes = total,
            "audio artifact finalized"
        );
        Some(AudioArtifact::encode(&self.mime_type, &merged))
    }
}
