//! Speech recognition seam and the session wrapper over one recognizer stream

mod backend;
mod session;

pub use backend::{
    MicrophoneAccess, RecognitionSegment, RecognizerError, RecognizerErrorKind, RecognizerEvent,
    RecognizerEventKind, SpeechRecognizer, StreamId, StreamOptions,
};
pub use session::{RecognitionSession, SessionOutput};
