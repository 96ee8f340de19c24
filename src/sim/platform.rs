//! Scripted recognizer, recorder and microphone
//!
//! Stands in for real hardware: every request is answered by pushing the
//! matching event into the controller's input channel, and speech is injected
//! through a [`SimHandle`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, error};

use crate::audio::{AudioRecorder, RecorderEvent};
use crate::error::{PermissionDenied, RecorderError};
use crate::lifecycle::{ControllerInput, Platform};
use crate::recognition::{
    MicrophoneAccess, RecognitionSegment, RecognizerError, RecognizerErrorKind, RecognizerEvent,
    RecognizerEventKind, SpeechRecognizer, StreamId, StreamOptions,
};
use crate::state::SessionId;

#[derive(Debug, Default)]
struct SimState {
    stream: Option<StreamId>,
    stream_options: Option<StreamOptions>,
    recording: Option<SessionId>,
    started_streams: Vec<StreamId>,
    open_streams: usize,
    peak_open_streams: usize,
    trailing_chunk: Vec<u8>,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<SimState>,
    supported: AtomicBool,
    microphone_granted: AtomicBool,
    input_tx: mpsc::UnboundedSender<ControllerInput>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn push(&self, input: impl Into<ControllerInput>) {
        // Unbounded: completions (`Ended`, `Stopped`) must never be dropped
        // while the controller is alive.
        if self.input_tx.send(input.into()).is_err() {
            error!("controller gone, simulated platform event lost");
        }
    }
}

/// Build a simulated platform feeding `input_tx`
pub fn simulated_platform(input_tx: mpsc::UnboundedSender<ControllerInput>) -> (Platform, SimHandle) {
    let shared = Arc::new(Shared {
        state: Mutex::new(SimState::default()),
        supported: AtomicBool::new(true),
        microphone_granted: AtomicBool::new(true),
        input_tx,
    });

    let platform = Platform {
        recognizer: Box::new(SimRecognizer {
            shared: Arc::clone(&shared),
        }),
        recorder: Box::new(SimRecorder {
            shared: Arc::clone(&shared),
        }),
        microphone: Arc::new(SimMicrophone {
            shared: Arc::clone(&shared),
        }),
    };
    (platform, SimHandle { shared })
}

struct SimRecognizer {
    shared: Arc<Shared>,
}

impl SpeechRecognizer for SimRecognizer {
    fn is_supported(&self) -> bool {
        self.shared.supported.load(Ordering::SeqCst)
    }

    fn start(&mut self, stream: StreamId, options: StreamOptions) -> Result<(), RecognizerError> {
        if !self.is_supported() {
            return Err(RecognizerError::Unsupported);
        }
        if options.max_alternatives == 0 {
            return Err(RecognizerError::Backend(
                "at least one alternative is required".to_string(),
            ));
        }
        {
            let mut state = self.shared.state();
            if let Some(open) = state.stream {
                return Err(RecognizerError::Backend(format!("{} is still open", open)));
            }
            state.stream = Some(stream);
            state.stream_options = Some(options);
            state.started_streams.push(stream);
            state.open_streams += 1;
            state.peak_open_streams = state.peak_open_streams.max(state.open_streams);
        }
        debug!(%stream, "simulated stream started");
        self.shared.push(RecognizerEvent {
            stream,
            kind: RecognizerEventKind::Started,
        });
        Ok(())
    }

    fn stop(&mut self, stream: StreamId) {
        if close_stream(&self.shared, stream) {
            self.shared.push(RecognizerEvent {
                stream,
                kind: RecognizerEventKind::Ended,
            });
        }
    }
}

fn close_stream(shared: &Shared, stream: StreamId) -> bool {
    let mut state = shared.state();
    if state.stream != Some(stream) {
        return false;
    }
    state.stream = None;
    state.open_streams = state.open_streams.saturating_sub(1);
    true
}

struct SimRecorder {
    shared: Arc<Shared>,
}

impl AudioRecorder for SimRecorder {
    fn start(&mut self, session: SessionId) -> Result<(), RecorderError> {
        let mut state = self.shared.state();
        if let Some(current) = state.recording {
            return Err(RecorderError::AlreadyRecording(current.to_string()));
        }
        state.recording = Some(session);
        Ok(())
    }

    fn stop(&mut self, session: SessionId) {
        let trailing = {
            let mut state = self.shared.state();
            if state.recording != Some(session) {
                return;
            }
            state.recording = None;
            std::mem::take(&mut state.trailing_chunk)
        };
        if !trailing.is_empty() {
            self.shared.push(RecorderEvent::DataAvailable {
                session,
                data: trailing,
            });
        }
        self.shared.push(RecorderEvent::Stopped { session });
    }

    fn mime_type(&self) -> &str {
        "audio/webm"
    }
}

struct SimMicrophone {
    shared: Arc<Shared>,
}

#[async_trait]
impl MicrophoneAccess for SimMicrophone {
    async fn request(&self) -> Result<(), PermissionDenied> {
        tokio::task::yield_now().await;
        if self.shared.microphone_granted.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(PermissionDenied::new("blocked by user"))
        }
    }
}

/// Drives the simulated platform: injects speech, faults and audio
#[derive(Clone)]
pub struct SimHandle {
    shared: Arc<Shared>,
}

impl SimHandle {
    pub fn set_supported(&self, supported: bool) {
        self.shared.supported.store(supported, Ordering::SeqCst);
    }

    pub fn set_microphone_granted(&self, granted: bool) {
        self.shared.microphone_granted.store(granted, Ordering::SeqCst);
    }

    /// Bytes the recorder flushes when it is stopped
    pub fn set_trailing_chunk(&self, data: Vec<u8>) {
        self.shared.state().trailing_chunk = data;
    }

    pub fn current_stream(&self) -> Option<StreamId> {
        self.shared.state().stream
    }

    pub fn current_stream_options(&self) -> Option<StreamOptions> {
        let state = self.shared.state();
        state.stream.and(state.stream_options)
    }

    pub fn current_recording(&self) -> Option<SessionId> {
        self.shared.state().recording
    }

    pub fn started_streams(&self) -> Vec<StreamId> {
        self.shared.state().started_streams.clone()
    }

    /// Highest number of streams that were open at the same time
    pub fn peak_open_streams(&self) -> usize {
        self.shared.state().peak_open_streams
    }

    /// Deliver a recognition result to the open stream
    pub fn hear(&self, text: &str, is_final: bool) -> bool {
        let segment = if is_final {
            RecognitionSegment::final_(text)
        } else {
            RecognitionSegment::interim(text)
        };
        self.hear_segments(vec![segment])
    }

    pub fn hear_segments(&self, segments: Vec<RecognitionSegment>) -> bool {
        self.send_to_stream(RecognizerEventKind::Result(segments))
    }

    pub fn fail(&self, kind: RecognizerErrorKind) -> bool {
        self.send_to_stream(RecognizerEventKind::Error(kind))
    }

    /// The recognizer ends the open stream on its own
    pub fn end_stream(&self) -> bool {
        let Some(stream) = self.current_stream() else {
            return false;
        };
        if !close_stream(&self.shared, stream) {
            return false;
        }
        self.shared.push(RecognizerEvent {
            stream,
            kind: RecognizerEventKind::Ended,
        });
        true
    }

    /// The recorder reports a chunk of audio
    pub fn chunk(&self, data: Vec<u8>) -> bool {
        let Some(session) = self.current_recording() else {
            return false;
        };
        self.shared.push(RecorderEvent::DataAvailable { session, data });
        true
    }

    fn send_to_stream(&self, kind: RecognizerEventKind) -> bool {
        let (stream, continuous) = {
            let state = self.shared.state();
            let Some(stream) = state.stream else {
                debug!("no open stream, speech dropped");
                return false;
            };
            (stream, state.stream_options.map_or(true, |o| o.continuous))
        };

        let utterance_done = matches!(
            &kind,
            RecognizerEventKind::Result(segments) if segments.iter().any(|s| s.is_final)
        );
        self.shared.push(RecognizerEvent { stream, kind });

        // A single-utterance stream ends after its first final result
        if utterance_done && !continuous && close_stream(&self.shared, stream) {
            self.shared.push(RecognizerEvent {
                stream,
                kind: RecognizerEventKind::Ended,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_reports_end_once() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut platform, handle) = simulated_platform(tx);

        platform.recognizer.start(StreamId(1), StreamOptions::active()).unwrap();
        assert_eq!(handle.current_stream(), Some(StreamId(1)));
        platform.recognizer.stop(StreamId(1));
        platform.recognizer.stop(StreamId(1));

        let mut kinds = Vec::new();
        while let Ok(ControllerInput::Recognizer(event)) = rx.try_recv() {
            kinds.push(event.kind);
        }
        assert_eq!(kinds, vec![RecognizerEventKind::Started, RecognizerEventKind::Ended]);
        assert_eq!(handle.current_stream(), None);
    }

    #[test]
    fn test_second_stream_is_refused_while_open() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut platform, handle) = simulated_platform(tx);

        platform.recognizer.start(StreamId(1), StreamOptions::ambient()).unwrap();
        assert!(platform.recognizer.start(StreamId(2), StreamOptions::active()).is_err());
        assert_eq!(handle.peak_open_streams(), 1);
    }

    #[test]
    fn test_recorder_flushes_trailing_chunk() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut platform, handle) = simulated_platform(tx);
        handle.set_trailing_chunk(vec![7, 7]);

        platform.recorder.start(SessionId(3)).unwrap();
        platform.recorder.stop(SessionId(3));

        assert_eq!(
            rx.try_recv().unwrap(),
            ControllerInput::Recorder(RecorderEvent::DataAvailable {
                session: SessionId(3),
                data: vec![7, 7],
            })
        );
        assert_eq!(
            rx.try_recv().unwrap(),
            ControllerInput::Recorder(RecorderEvent::Stopped { session: SessionId(3) })
        );
    }

    #[test]
    fn test_single_utterance_stream_ends_after_final() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut platform, handle) = simulated_platform(tx);
        let options = StreamOptions {
            continuous: false,
            ..StreamOptions::active()
        };

        platform.recognizer.start(StreamId(1), options).unwrap();
        assert!(handle.hear("new", false));
        assert_eq!(handle.current_stream(), Some(StreamId(1)));
        assert!(handle.hear("new note", true));
        assert_eq!(handle.current_stream(), None);

        let mut last = None;
        while let Ok(ControllerInput::Recognizer(event)) = rx.try_recv() {
            last = Some(event.kind);
        }
        assert_eq!(last, Some(RecognizerEventKind::Ended));
    }

    #[test]
    fn test_zero_alternatives_refused() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (mut platform, handle) = simulated_platform(tx);
        let options = StreamOptions {
            max_alternatives: 0,
            ..StreamOptions::ambient()
        };
        assert!(matches!(
            platform.recognizer.start(StreamId(1), options),
            Err(RecognizerError::Backend(_))
        ));
        assert!(handle.started_streams().is_empty());
    }

    #[test]
    fn test_completion_delivered_after_a_burst() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (mut platform, handle) = simulated_platform(tx);

        platform.recorder.start(SessionId(5)).unwrap();
        for i in 0..500u32 {
            assert!(handle.chunk(i.to_le_bytes().to_vec()));
        }
        platform.recorder.stop(SessionId(5));

        let mut received = Vec::new();
        while let Ok(input) = rx.try_recv() {
            received.push(input);
        }
        assert_eq!(received.len(), 501);
        assert_eq!(
            received.last(),
            Some(&ControllerInput::Recorder(RecorderEvent::Stopped { session: SessionId(5) }))
        );
    }

    #[test]
    fn test_microphone_denial() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let (platform, handle) = simulated_platform(tx);
        handle.set_microphone_granted(false);
        let result = tokio_test::block_on(platform.microphone.request());
        assert!(result.is_err());
    }
}
