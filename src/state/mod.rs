//! Listening state owned by the lifecycle controller
//!
//! Exactly one [`ListeningMode`] is current at any time:
//! - Idle: nothing is listening
//! - AmbientListening: watching for a wake phrase
//! - ActiveCommand: short-lived session for a single spoken command
//! - ActiveDictation: extended session, speech becomes note content

mod session;

pub use session::{ActiveKind, ListeningMode, Session, SessionId};
