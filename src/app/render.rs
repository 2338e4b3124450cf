use crate::frame::Frame;
use crate::session::{DisplayIntent, TextLine};
use std::sync::Arc;
use tracing::{debug, info, trace};

/// Display collaborator. Gets the newest preview frame once per tick and the
/// display intents emitted by the booth in between.
pub trait RenderSink: Send {
    fn show_frame(&mut self, frame: &Arc<Frame>);

    fn apply(&mut self, intent: DisplayIntent);
}

/// Headless sink: logs text changes, overlays and screen switches
#[derive(Debug, Default)]
pub struct LogRenderSink {
    lines: Vec<TextLine>,
    last_frame_id: Option<u64>,
    frames_shown: u64,
    look_at_camera: bool,
}

impl LogRenderSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames_shown(&self) -> u64 {
        self.frames_shown
    }
}

impl RenderSink for LogRenderSink {
    fn show_frame(&mut self, frame: &Arc<Frame>) {
        if frame.is_placeholder() || self.last_frame_id == Some(frame.id) {
            return;
        }
        self.last_frame_id = Some(frame.id);
        self.frames_shown += 1;
        trace!("Preview frame {} ({}x{})", frame.id, frame.width(), frame.height());
    }

    fn apply(&mut self, intent: DisplayIntent) {
        match intent {
            DisplayIntent::Lines(lines) => {
                if lines != self.lines {
                    let text: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
                    info!("Display: {}", text.join(" | "));
                    self.lines = lines;
                }
            }
            DisplayIntent::LookAtCamera { visible } => {
                if visible != self.look_at_camera {
                    trace!("Look-at-camera cue {}", if visible { "on" } else { "off" });
                    self.look_at_camera = visible;
                }
            }
            DisplayIntent::BeginOverlay { image_number } => {
                debug!("Shutter overlay for photo {}", image_number);
            }
            DisplayIntent::EndOverlay {
                image_number,
                preview,
            } => {
                debug!("Photo {} ready: {}", image_number, preview.display());
            }
            DisplayIntent::Montage { images } => {
                info!("Showing montage of {} photos", images.len());
            }
            DisplayIntent::SessionView { session_id } => {
                info!("Session {} on screen", session_id);
            }
            DisplayIntent::IdleScreen { previews } => {
                self.lines.clear();
                info!("Idle screen with {} recent sessions", previews.len());
            }
        }
    }
}
