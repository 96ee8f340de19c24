//! second-brain-voice: hands-free voice control and dictation for notes
//!
//! Listens for a wake phrase, switches into a short command session or an
//! extended dictation session, separates spoken commands from dictated
//! content, and records the dictation audio alongside the transcript.
//!
//! The [`LifecycleController`] is the single owner of all listening state.
//! Platform speech/audio/microphone access is injected through the traits in
//! [`recognition`] and [`audio`]; everything observable leaves through
//! [`VoiceEvent`]s.

pub mod audio;
pub mod commands;
pub mod config;
pub mod error;
pub mod events;
pub mod lifecycle;
pub mod recognition;
pub mod sim;
pub mod state;

pub use config::{Config, ControllerConfig, Settings, SharedSettings};
pub use events::VoiceEvent;
pub use lifecycle::{ControlRequest, ControllerInput, LifecycleController, Platform};
pub use state::{ActiveKind, ListeningMode};

