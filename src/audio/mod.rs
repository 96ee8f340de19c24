//! Raw audio capture that runs alongside a dictation session

mod capture;

pub use capture::{AudioArtifact, AudioCaptureCoordinator, AudioRecorder, RecorderEvent};
