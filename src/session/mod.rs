mod recorder;
mod state;
mod types;

#[cfg(test)]
mod tests;

pub use recorder::CaptureRecorder;
pub use state::{Session, SessionState};
pub use types::{
    CaptureOrder, DisplayIntent, FinishedSession, SessionEffect, SessionSettings, TextLine,
    CAPTURE_STALL_WARNING,
};
