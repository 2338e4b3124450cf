use crate::storage::ImagePaths;
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct RecorderSlot {
    session_id: Option<u32>,
    images: BTreeMap<u8, ImagePaths>,
}

/// Captured images of the active session. The capture worker writes into it
/// and the session's TakePicture state polls it; it is the only state shared
/// between the two threads.
#[derive(Debug, Clone, Default)]
pub struct CaptureRecorder {
    slot: Arc<Mutex<RecorderSlot>>,
}

impl CaptureRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting captures for `session_id`, forgetting any previous ones
    pub(crate) fn activate(&self, session_id: u32) {
        let mut slot = self.slot.lock();
        slot.session_id = Some(session_id);
        slot.images.clear();
    }

    pub(crate) fn release(&self) {
        let mut slot = self.slot.lock();
        slot.session_id = None;
        slot.images.clear();
    }

    pub fn active_session(&self) -> Option<u32> {
        self.slot.lock().session_id
    }

    /// Store a finished capture. Captures for a session that is no longer
    /// active, and repeated captures of the same photo, are refused.
    pub fn record_capture(&self, session_id: u32, image_number: u8, images: ImagePaths) -> bool {
        let mut slot = self.slot.lock();

        if slot.session_id != Some(session_id) {
            warn!(
                "Discarding capture {} of session {}: session is not active",
                image_number, session_id
            );
            return false;
        }

        if slot.images.contains_key(&image_number) {
            warn!(
                "Discarding repeated capture {} of session {}",
                image_number, session_id
            );
            return false;
        }

        debug!("Recorded capture {} of session {}", image_number, session_id);
        slot.images.insert(image_number, images);
        true
    }

    pub fn has_image(&self, session_id: u32, image_number: u8) -> bool {
        let slot = self.slot.lock();
        slot.session_id == Some(session_id) && slot.images.contains_key(&image_number)
    }

    /// Images recorded so far, ordered by photo number
    pub fn images(&self, session_id: u32) -> BTreeMap<u8, ImagePaths> {
        let slot = self.slot.lock();
        if slot.session_id == Some(session_id) {
            slot.images.clone()
        } else {
            BTreeMap::new()
        }
    }
}
