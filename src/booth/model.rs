use crate::config::BoothConfig;
use crate::error::SessionError;
use crate::session::{
    CaptureRecorder, DisplayIntent, FinishedSession, Session, SessionEffect, SessionSettings,
};
use crate::storage::{EventStorage, ImageKind, ImagePaths};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Outcome of recovering the event directory at startup
#[derive(Debug, Clone, Default)]
pub struct RecoveryResult {
    /// Id the next session will get
    pub next_id: u32,
    /// Complete sessions found on disk
    pub finished: usize,
    /// Complete sessions without the upload stamp, oldest first
    pub pending_upload: Vec<FinishedSession>,
}

/// Owns session identity and lifecycle: at most one active session, ids that
/// are never reused, and the recency list shown on the idle screen.
pub struct BoothModel {
    settings: Arc<SessionSettings>,
    storage: EventStorage,
    recorder: CaptureRecorder,
    idle_after: Duration,
    idle_previews_cnt: usize,
    exempt_setup_session: bool,
    current: Option<Session>,
    next_id: u32,
    /// Every session id is taken; no new session can start
    ids_exhausted: bool,
    /// Oldest first
    finished: VecDeque<FinishedSession>,
    is_first_session: bool,
}

impl BoothModel {
    pub fn new(config: &BoothConfig) -> Self {
        Self {
            settings: Arc::new(SessionSettings::from_config(config)),
            storage: EventStorage::new(&config.storage),
            recorder: CaptureRecorder::new(),
            idle_after: config.control.idle(),
            idle_previews_cnt: config.control.idle_previews_cnt,
            exempt_setup_session: config.control.exempt_setup_session_from_idle,
            current: None,
            next_id: 1,
            ids_exhausted: false,
            finished: VecDeque::new(),
            is_first_session: true,
        }
    }

    /// Rebuild the recency list from the event directory and reserve every id
    /// found there, complete or not.
    pub fn load_from_disk(&mut self) -> Result<RecoveryResult, SessionError> {
        self.storage.ensure_root()?;
        let scan = self.storage.scan()?;

        let mut pending_upload = Vec::new();
        let mut finished = Vec::new();
        for stored in scan.complete() {
            let session = self.finished_from_disk(stored.id);
            if !stored.uploaded {
                pending_upload.push(session.clone());
            }
            finished.push(session);
        }

        self.next_id = self.next_id.max(scan.next_id);
        if scan.ids_exhausted {
            error!("Event directory holds the last session id, new sessions are disabled");
            self.ids_exhausted = true;
        }
        let finished_count = finished.len();
        self.finished = finished.into();
        self.trim_finished();

        info!(
            "Recovered {} finished sessions ({} not uploaded), next session id {}",
            finished_count,
            pending_upload.len(),
            self.next_id
        );

        Ok(RecoveryResult {
            next_id: self.next_id,
            finished: finished_count,
            pending_upload,
        })
    }

    /// One control tick. Starts a session on a press when none is active,
    /// otherwise advances the active one and ends it when it is finished or
    /// idle.
    pub fn update(&mut self, now: Instant, button_pressed: bool) -> Vec<SessionEffect> {
        let idle_exempt = self.is_first_session && self.exempt_setup_session;
        let idle_after = self.idle_after;

        let Some(session) = self.current.as_mut() else {
            if button_pressed {
                return self.start_session(now);
            }
            return Vec::new();
        };

        let mut effects = session.update(now, button_pressed);

        if session.is_finished() {
            effects.extend(self.end_session());
        } else if !idle_exempt && session.is_idle(now, idle_after) {
            info!("Session {} idle, ending", session.id());
            effects.extend(self.end_session());
        }

        effects
    }

    fn start_session(&mut self, now: Instant) -> Vec<SessionEffect> {
        if self.ids_exhausted {
            error!("No session ids left, ignoring button");
            return Vec::new();
        }

        let id = self.next_id;
        // Burned even if the directory cannot be created
        match id.checked_add(1) {
            Some(next) => self.next_id = next,
            None => self.ids_exhausted = true,
        }

        if let Err(e) = self.storage.create_session_dir(id) {
            error!("Cannot start session {}: {}", id, e);
            return Vec::new();
        }

        let (session, effects) = Session::start(
            id,
            now,
            Arc::clone(&self.settings),
            self.storage.clone(),
            self.recorder.clone(),
        );
        self.current = Some(session);
        effects
    }

    /// Drop the active session, archiving it when it ran to completion
    pub fn end_session(&mut self) -> Vec<SessionEffect> {
        let Some(session) = self.current.take() else {
            return Vec::new();
        };

        // The setup session is over; later sessions time out
        self.is_first_session = false;

        if session.is_finished() {
            info!("Session {} finished", session.id());
            self.finished.push_back(session.finished_session());
            self.trim_finished();
        } else {
            info!(
                "Session {} abandoned after {} photo(s)",
                session.id(),
                session.photo_count()
            );
        }
        self.recorder.release();

        vec![
            SessionEffect::StopPreview,
            SessionEffect::Display(DisplayIntent::IdleScreen {
                previews: self.idle_previews(),
            }),
        ]
    }

    /// Called by the capture worker once a photo and its renditions are on
    /// disk. Only captures for the active session are accepted.
    pub fn record_capture(&self, session_id: u32, image_number: u8, images: ImagePaths) -> bool {
        self.recorder.record_capture(session_id, image_number, images)
    }

    /// Handle for the capture worker thread
    pub fn recorder(&self) -> CaptureRecorder {
        self.recorder.clone()
    }

    /// Preview image lists of recent sessions, newest first
    pub fn idle_previews(&self) -> Vec<Vec<PathBuf>> {
        self.finished
            .iter()
            .rev()
            .map(|s| s.preview_images.clone())
            .collect()
    }

    pub fn active_session(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    pub fn next_session_id(&self) -> u32 {
        self.next_id
    }

    pub fn ids_exhausted(&self) -> bool {
        self.ids_exhausted
    }

    pub fn finished_sessions(&self) -> impl Iterator<Item = &FinishedSession> {
        self.finished.iter()
    }

    pub fn is_first_session(&self) -> bool {
        self.is_first_session
    }

    pub fn storage(&self) -> &EventStorage {
        &self.storage
    }

    fn trim_finished(&mut self) {
        while self.finished.len() > self.idle_previews_cnt {
            if let Some(dropped) = self.finished.pop_front() {
                debug!("Session {} left the idle screen", dropped.id);
            }
        }
    }

    fn finished_from_disk(&self, session_id: u32) -> FinishedSession {
        FinishedSession {
            id: session_id,
            preview_images: self.storage.session_images(session_id, ImageKind::Preview),
            medium_images: self.storage.session_images(session_id, ImageKind::Medium),
            full_images: self.storage.session_images(session_id, ImageKind::Full),
            tags: self.settings.draw_tags(),
        }
    }
}
