use crate::storage::{EventStorage, ImagePaths, IMAGES_PER_SESSION};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::recorder::CaptureRecorder;
use super::types::{
    CaptureOrder, DisplayIntent, FinishedSession, SessionEffect, SessionSettings, TextLine,
    CAPTURE_STALL_WARNING,
};

/// States of one guided shoot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the press that starts the countdown
    Waiting,
    Countdown {
        deadline: Instant,
        duration: Duration,
    },
    /// Capture ordered, waiting for the capture worker to record the photo
    TakePicture {
        ordered_at: Instant,
        stall_reported: bool,
    },
    ShowMontage {
        deadline: Instant,
        duration: Duration,
    },
    /// Terminal
    Finished,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Waiting => "waiting",
            SessionState::Countdown { .. } => "countdown",
            SessionState::TakePicture { .. } => "take_picture",
            SessionState::ShowMontage { .. } => "show_montage",
            SessionState::Finished => "finished",
        }
    }
}

/// One photo session and its state machine. All timing is driven by the
/// `now` passed to [`Session::update`].
#[derive(Debug)]
pub struct Session {
    id: u32,
    state: SessionState,
    photo_count: u8,
    started_at: Instant,
    capture_started_at: Option<Instant>,
    tags: Vec<String>,
    settings: Arc<SessionSettings>,
    storage: EventStorage,
    recorder: CaptureRecorder,
}

impl Session {
    /// Create a session in `Waiting` and return the effects of entering it
    pub fn start(
        id: u32,
        now: Instant,
        settings: Arc<SessionSettings>,
        storage: EventStorage,
        recorder: CaptureRecorder,
    ) -> (Self, Vec<SessionEffect>) {
        info!("Starting new photo session, id={}", id);
        recorder.activate(id);

        let tags = settings.draw_tags();
        let effects = vec![
            SessionEffect::StartPreview,
            SessionEffect::Display(DisplayIntent::SessionView { session_id: id }),
            SessionEffect::Display(DisplayIntent::Lines(vec![TextLine::normal(
                settings.messages.start_pushbutton.clone(),
            )])),
        ];

        let session = Self {
            id,
            state: SessionState::Waiting,
            photo_count: 0,
            started_at: now,
            capture_started_at: None,
            tags,
            settings,
            storage,
            recorder,
        };
        (session, effects)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn photo_count(&self) -> u8 {
        self.photo_count
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn capture_started_at(&self) -> Option<Instant> {
        self.capture_started_at
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    pub fn images(&self) -> BTreeMap<u8, ImagePaths> {
        self.recorder.images(self.id)
    }

    pub fn is_finished(&self) -> bool {
        self.state == SessionState::Finished
    }

    /// Nobody started the countdown within `idle_after` of the session start
    pub fn is_idle(&self, now: Instant, idle_after: Duration) -> bool {
        self.state == SessionState::Waiting
            && self.capture_started_at.is_none()
            && now.saturating_duration_since(self.started_at) > idle_after
    }

    /// Advance the state machine by one tick
    pub fn update(&mut self, now: Instant, button_pressed: bool) -> Vec<SessionEffect> {
        let mut effects = Vec::new();

        let next = match self.state {
            SessionState::Waiting => self.update_waiting(now, button_pressed),
            SessionState::Countdown { deadline, .. } => {
                self.update_countdown(now, deadline, &mut effects)
            }
            SessionState::TakePicture {
                ordered_at,
                stall_reported,
            } => self.update_take_picture(now, ordered_at, stall_reported, &mut effects),
            SessionState::ShowMontage { deadline, duration } => {
                self.update_montage(now, deadline, duration, &mut effects)
            }
            SessionState::Finished => None,
        };

        if let Some(next) = next {
            debug!(
                "Session {}: {} -> {}",
                self.id,
                self.state.name(),
                next.name()
            );
            self.state = next;
        }

        effects
    }

    fn update_waiting(&mut self, now: Instant, button_pressed: bool) -> Option<SessionState> {
        if !button_pressed {
            return None;
        }
        self.capture_started_at = Some(now);
        Some(countdown(now, self.settings.initial_countdown))
    }

    fn update_countdown(
        &mut self,
        now: Instant,
        deadline: Instant,
        effects: &mut Vec<SessionEffect>,
    ) -> Option<SessionState> {
        if now >= deadline {
            effects.push(SessionEffect::Display(DisplayIntent::LookAtCamera {
                visible: false,
            }));
            return Some(self.enter_take_picture(now, effects));
        }

        let remaining = (deadline - now).as_secs_f64();
        let seconds = (remaining + 1.0) as u64;
        let mut lines = vec![TextLine::big(seconds.to_string())];

        if remaining < self.settings.look_at_camera.as_secs_f64() {
            // Blinks at 2 Hz
            let visible = ((remaining * 2.0) as u64) % 2 == 0;
            lines.push(TextLine::normal(self.settings.messages.look_at_camera.clone()));
            effects.push(SessionEffect::Display(DisplayIntent::LookAtCamera {
                visible,
            }));
        }

        effects.push(SessionEffect::Display(DisplayIntent::Lines(lines)));
        None
    }

    fn enter_take_picture(&mut self, now: Instant, effects: &mut Vec<SessionEffect>) -> SessionState {
        self.photo_count += 1;
        let image_number = self.photo_count;
        let paths = self.storage.image_paths(self.id, image_number);
        debug!(
            "Session {}: taking picture {} -> {}",
            self.id,
            image_number,
            paths.full.display()
        );

        effects.push(SessionEffect::Display(DisplayIntent::BeginOverlay {
            image_number,
        }));
        effects.push(SessionEffect::Capture(CaptureOrder {
            session_id: self.id,
            image_number,
            paths,
        }));
        effects.push(SessionEffect::Display(DisplayIntent::Lines(vec![
            TextLine::normal(self.settings.messages.after_capture_text(image_number)),
        ])));

        SessionState::TakePicture {
            ordered_at: now,
            stall_reported: false,
        }
    }

    fn update_take_picture(
        &mut self,
        now: Instant,
        ordered_at: Instant,
        stall_reported: bool,
        effects: &mut Vec<SessionEffect>,
    ) -> Option<SessionState> {
        if self.recorder.has_image(self.id, self.photo_count) {
            if self.photo_count >= IMAGES_PER_SESSION {
                return Some(self.enter_montage(now, effects));
            }
            return Some(countdown(now, self.settings.midphoto_countdown));
        }

        // A missing photo is never skipped; the session waits for it
        let waiting = now.saturating_duration_since(ordered_at);
        if !stall_reported && waiting > CAPTURE_STALL_WARNING {
            warn!(
                "Session {}: capture {} still not recorded after {:?}",
                self.id, self.photo_count, waiting
            );
            return Some(SessionState::TakePicture {
                ordered_at,
                stall_reported: true,
            });
        }

        None
    }

    fn enter_montage(&mut self, now: Instant, effects: &mut Vec<SessionEffect>) -> SessionState {
        let finished = self.finished_session();
        info!("Session {}: all photos taken, showing montage", self.id);

        effects.push(SessionEffect::Display(DisplayIntent::Montage {
            images: finished.medium_images.clone(),
        }));
        effects.push(SessionEffect::SessionFinished(finished));

        let duration = self.settings.montage_display;
        let deadline = now + duration;
        if let Some(text) = self.montage_text(deadline - now, duration) {
            effects.push(SessionEffect::Display(DisplayIntent::Lines(vec![
                TextLine::normal(text),
            ])));
        }

        SessionState::ShowMontage { deadline, duration }
    }

    fn update_montage(
        &mut self,
        now: Instant,
        deadline: Instant,
        duration: Duration,
        effects: &mut Vec<SessionEffect>,
    ) -> Option<SessionState> {
        if now >= deadline {
            return Some(SessionState::Finished);
        }

        if let Some(text) = self.montage_text(deadline - now, duration) {
            effects.push(SessionEffect::Display(DisplayIntent::Lines(vec![
                TextLine::normal(text),
            ])));
        }
        None
    }

    /// Texts rotate in order, each one shown for an equal share of the montage
    fn montage_text(&self, remaining: Duration, duration: Duration) -> Option<String> {
        let texts = &self.settings.montage_texts;
        if texts.is_empty() || duration.is_zero() {
            return None;
        }

        let single = duration.as_secs_f64() / texts.len() as f64;
        let idx = (remaining.as_secs_f64() / single).ceil() as usize;
        let idx = idx.clamp(1, texts.len());
        texts.get(texts.len() - idx).cloned()
    }

    /// Snapshot of this session as a finished one
    pub fn finished_session(&self) -> FinishedSession {
        let images = self.images();

        FinishedSession {
            id: self.id,
            preview_images: images.values().map(|p| p.preview.clone()).collect(),
            medium_images: images.values().map(|p| p.medium.clone()).collect(),
            full_images: images.values().map(|p| p.full.clone()).collect(),
            tags: self.tags.clone(),
        }
    }
}

fn countdown(now: Instant, duration: Duration) -> SessionState {
    SessionState::Countdown {
        deadline: now + duration,
        duration,
    }
}
