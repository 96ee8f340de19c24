//! Lifecycle control: the listening state machine and process shutdown

mod controller;
mod shutdown;

pub use controller::{ControlRequest, ControllerInput, LifecycleController, Platform};
pub use shutdown::ShutdownSignal;
