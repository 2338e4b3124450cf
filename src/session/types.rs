use crate::config::{BoothConfig, MessagesConfig, TagsConfig};
use crate::storage::ImagePaths;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::time::Duration;

/// How long a capture order may stay unanswered before it is reported
pub const CAPTURE_STALL_WARNING: Duration = Duration::from_secs(30);

/// One line of text for the display collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextLine {
    pub text: String,
    /// Render with the emphasized (big) font
    pub big: bool,
}

impl TextLine {
    pub fn normal<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            big: false,
        }
    }

    pub fn big<S: Into<String>>(text: S) -> Self {
        Self {
            text: text.into(),
            big: true,
        }
    }
}

/// Requests for the render collaborator. Rendering itself happens elsewhere.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayIntent {
    /// Replace the text area
    Lines(Vec<TextLine>),
    /// Show or hide the look-at-camera cue
    LookAtCamera { visible: bool },
    /// Shutter animation starts for a photo
    BeginOverlay { image_number: u8 },
    /// Photo has been captured and its preview is on disk
    EndOverlay { image_number: u8, preview: PathBuf },
    /// Animate the medium images of the just-finished session
    Montage { images: Vec<PathBuf> },
    /// A session became active
    SessionView { session_id: u32 },
    /// No active session; recent sessions, newest first
    IdleScreen { previews: Vec<Vec<PathBuf>> },
}

/// Full-resolution capture request for the capture worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOrder {
    pub session_id: u32,
    pub image_number: u8,
    pub paths: ImagePaths,
}

/// Everything the booth asks the outside world to do as a result of a tick
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEffect {
    Display(DisplayIntent),
    StartPreview,
    /// Pause the preview and cold-reopen the camera
    StopPreview,
    Capture(CaptureOrder),
    /// The montage started: print and upload this session, once
    SessionFinished(FinishedSession),
}

/// A completed session, either just finished or recovered from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSession {
    pub id: u32,
    pub preview_images: Vec<PathBuf>,
    pub medium_images: Vec<PathBuf>,
    pub full_images: Vec<PathBuf>,
    pub tags: Vec<String>,
}

/// Texts and timings a session runs with, resolved once from configuration
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub initial_countdown: Duration,
    pub midphoto_countdown: Duration,
    pub montage_display: Duration,
    pub look_at_camera: Duration,
    pub messages: MessagesConfig,
    pub montage_texts: Vec<String>,
    pub tags: TagsConfig,
}

impl SessionSettings {
    pub fn from_config(config: &BoothConfig) -> Self {
        Self {
            initial_countdown: config.control.initial_countdown(),
            midphoto_countdown: config.control.midphoto_countdown(),
            montage_display: config.control.montage_display(),
            look_at_camera: config.control.look_at_camera(),
            messages: config.messages.clone(),
            montage_texts: config.messages.during_merge_lines(),
            tags: config.tags.clone(),
        }
    }

    /// Random tags attached to a session for printing and uploading
    pub fn draw_tags(&self) -> Vec<String> {
        if !self.tags.enabled {
            return Vec::new();
        }
        self.tags
            .list
            .choose_multiple(&mut rand::thread_rng(), self.tags.count)
            .cloned()
            .collect()
    }
}
