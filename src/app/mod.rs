pub mod keyboard_input;
pub mod render;

mod capture_worker;
mod controller;
mod runtime;
mod shutdown;
mod startup;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use capture_worker::{CaptureCommand, CaptureWorker};
pub use controller::BoothController;
pub use render::{LogRenderSink, RenderSink};
pub use state::ComponentStates;
pub use types::{ComponentState, InputEvent, ShutdownReason};
