//! Uniform view over one recognizer stream
//!
//! Ambient streams are final-only; active streams report interim and final
//! text. Either way the controller sees the same [`SessionOutput`] values.

use tracing::debug;

use super::backend::{
    RecognitionSegment, RecognizerErrorKind, RecognizerEventKind, StreamId, StreamOptions,
};

/// Normalized callback produced from a raw recognizer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutput {
    Started,
    Interim(String),
    Final(String),
    Error(RecognizerErrorKind),
    Ended,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamState {
    Opening,
    Open,
    Ended,
}

/// Wrapper over a single continuous recognizer stream
#[derive(Debug)]
pub struct RecognitionSession {
    stream: StreamId,
    options: StreamOptions,
    state: StreamState,
}

impl RecognitionSession {
    pub fn new(stream: StreamId, options: StreamOptions) -> Self {
        Self {
            stream,
            options,
            state: StreamState::Opening,
        }
    }

    pub fn stream(&self) -> StreamId {
        self.stream
    }

    pub fn options(&self) -> StreamOptions {
        self.options
    }

    pub fn has_ended(&self) -> bool {
        self.state == StreamState::Ended
    }

    /// Translate one raw event into session callbacks
    pub fn handle(&mut self, kind: RecognizerEventKind) -> Vec<SessionOutput> {
        if self.state == StreamState::Ended {
            debug!(stream = %self.stream, ?kind, "event after stream end ignored");
            return Vec::new();
        }

        match kind {
            RecognizerEventKind::Started => {
                self.state = StreamState::Open;
                vec![SessionOutput::Started]
            }
            RecognizerEventKind::Result(segments) => self.collect_results(&segments),
            RecognizerEventKind::Error(kind) => vec![SessionOutput::Error(kind)],
            RecognizerEventKind::Ended => {
                self.state = StreamState::Ended;
                vec![SessionOutput::Ended]
            }
        }
    }

    /// Merge a result tick into at most one final and one interim callback
    ///
    /// All final segments of the tick are joined in order so a dictated
    /// sentence is never split across callbacks.
    fn collect_results(&self, segments: &[RecognitionSegment]) -> Vec<SessionOutput> {
        let mut final_text = String::new();
        let mut interim_text = String::new();

        for segment in segments {
            let text = segment.transcript.trim();
            if text.is_empty() {
                continue;
            }
            let target = if segment.is_final {
                &mut final_text
            } else if self.options.interim_results {
                &mut interim_text
            } else {
                continue;
            };
            if !target.is_empty() {
                target.push(' ');
            }
            target.push_str(text);
        }

        let mut outputs = Vec::with_capacity(2);
        if !final_text.is_empty() {
            outputs.push(SessionOutput::Final(final_text));
        }
        if !interim_text.is_empty() {
            outputs.push(SessionOutput::Interim(interim_text));
        }
        outputs
    }
}
