use super::{BoothController, ComponentState};
use crate::config::UploadDriverKind;
use crate::peripheral::PeripheralRequest;
use crate::session::DisplayIntent;
use tracing::{info, warn};

impl BoothController {
    /// Bring up input, show the idle screen and queue unfinished uploads
    pub async fn start(&mut self) {
        info!("Starting booth components");

        self.components.set("camera", ComponentState::Running);
        self.components.set("capture", ComponentState::Running);
        self.components.set("printer", ComponentState::Running);
        self.components.set("uploader", ComponentState::Running);

        if self.keyboard_enabled {
            self.components.set("keyboard", ComponentState::Starting);
            if let Some(keyboard) = &self.keyboard_handler {
                keyboard.start();
            }
            self.components.set("keyboard", ComponentState::Running);
        } else {
            info!("Keyboard input disabled");
        }

        self.render.apply(DisplayIntent::IdleScreen {
            previews: self.model.idle_previews(),
        });

        let retried = self.retry_pending_uploads();
        if retried > 0 {
            info!("Re-queued {} sessions for upload", retried);
        }

        info!("Booth is running");
    }

    /// Sessions recovered without an upload stamp go back to the uploader
    pub(super) fn retry_pending_uploads(&mut self) -> usize {
        if !self.config.upload.retry_pending || self.config.upload.driver == UploadDriverKind::None
        {
            return 0;
        }

        let pending = std::mem::take(&mut self.recovery.pending_upload);
        let mut queued = 0;
        for session in pending {
            let request = PeripheralRequest::UploadSession {
                session_id: session.id,
                medium_images: session.medium_images,
                full_images: session.full_images,
                tags: session.tags,
            };
            match self.uploader.send(request) {
                Ok(()) => queued += 1,
                Err(e) => warn!("Cannot retry upload of session {}: {}", session.id, e),
            }
        }
        queued
    }
}
