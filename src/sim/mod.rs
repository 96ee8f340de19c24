//! Simulated platform for development and tests
//!
//! Replaces the speech recognizer, recorder and microphone with scripted
//! stand-ins so the controller can be driven without hardware.

mod platform;
mod script;

pub use platform::{simulated_platform, SimHandle};
pub use script::ScriptLine;
