use super::*;
use crate::config::BoothConfig;
use crate::storage::EventStorage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

const TICK: Duration = Duration::from_millis(10);

fn create_test_config(dir: &TempDir) -> BoothConfig {
    let mut config = BoothConfig::default();
    config.storage.event_dir = dir.path().to_string_lossy().to_string();
    config.control.initial_countdown_secs = 3;
    config.control.midphoto_countdown_secs = 3;
    config.control.montage_display_secs = 5;
    config
}

fn start_session(config: &BoothConfig, now: Instant) -> (Session, CaptureRecorder, Vec<SessionEffect>) {
    let recorder = CaptureRecorder::new();
    let (session, effects) = Session::start(
        1,
        now,
        Arc::new(SessionSettings::from_config(config)),
        EventStorage::new(&config.storage),
        recorder.clone(),
    );
    (session, recorder, effects)
}

fn capture_orders(effects: &[SessionEffect]) -> Vec<CaptureOrder> {
    effects
        .iter()
        .filter_map(|e| match e {
            SessionEffect::Capture(order) => Some(order.clone()),
            _ => None,
        })
        .collect()
}

fn text_lines(effects: &[SessionEffect]) -> Option<Vec<TextLine>> {
    effects.iter().rev().find_map(|e| match e {
        SessionEffect::Display(DisplayIntent::Lines(lines)) => Some(lines.clone()),
        _ => None,
    })
}

fn look_at_camera(effects: &[SessionEffect]) -> Option<bool> {
    effects.iter().find_map(|e| match e {
        SessionEffect::Display(DisplayIntent::LookAtCamera { visible }) => Some(*visible),
        _ => None,
    })
}

fn assert_near(actual: Duration, expected_secs: f64) {
    let diff = (actual.as_secs_f64() - expected_secs).abs();
    assert!(
        diff < 0.1,
        "expected ~{}s, got {:?}",
        expected_secs,
        actual
    );
}

#[test]
fn test_session_starts_waiting() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let t0 = Instant::now();

    let (mut session, recorder, effects) = start_session(&config, t0);

    assert_eq!(session.state(), SessionState::Waiting);
    assert_eq!(session.photo_count(), 0);
    assert_eq!(recorder.active_session(), Some(1));
    assert!(effects.contains(&SessionEffect::StartPreview));
    assert_eq!(
        text_lines(&effects).unwrap()[0].text,
        config.messages.start_pushbutton
    );

    // Nothing happens until the button is pressed
    assert!(session.update(t0 + Duration::from_secs(10), false).is_empty());
    assert_eq!(session.state(), SessionState::Waiting);
    assert!(session.capture_started_at().is_none());
}

#[test]
fn test_full_session_timing() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let t0 = Instant::now();

    let (mut session, recorder, _) = start_session(&config, t0);
    session.update(t0, true);
    assert_eq!(session.capture_started_at(), Some(t0));

    let mut order_times = Vec::new();
    let mut finished_notifications = Vec::new();
    let mut finished_at = None;
    let mut now = t0;

    while now < t0 + Duration::from_secs(30) {
        now += TICK;
        let effects = session.update(now, false);

        for order in capture_orders(&effects) {
            order_times.push(now - t0);
            // Capture worker completes instantly
            assert!(recorder.record_capture(order.session_id, order.image_number, order.paths));
        }

        for effect in &effects {
            if let SessionEffect::SessionFinished(finished) = effect {
                finished_notifications.push(finished.clone());
            }
        }

        if session.is_finished() {
            finished_at = Some(now - t0);
            break;
        }
    }

    assert_eq!(order_times.len(), 4);
    for (i, at) in order_times.iter().enumerate() {
        assert_near(*at, 3.0 * (i + 1) as f64);
    }

    assert_eq!(finished_notifications.len(), 1);
    let finished = &finished_notifications[0];
    assert_eq!(finished.id, 1);
    assert_eq!(finished.preview_images.len(), 4);
    assert_eq!(finished.full_images[3], dir.path().join("1").join("4.jpg"));

    assert_near(finished_at.unwrap(), 17.0);
    assert_eq!(session.photo_count(), 4);

    // Terminal state stays terminal
    assert!(session.update(now + Duration::from_secs(60), true).is_empty());
    assert!(session.is_finished());
}

#[test]
fn test_countdown_display() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let t0 = Instant::now();

    let (mut session, _recorder, _) = start_session(&config, t0);
    session.update(t0, true);

    let effects = session.update(t0 + Duration::from_millis(500), false);
    let lines = text_lines(&effects).unwrap();
    assert_eq!(lines, vec![TextLine::big("3")]);
    assert_eq!(look_at_camera(&effects), None);

    // 1.8s remaining: cue window, odd half-second, hidden
    let effects = session.update(t0 + Duration::from_millis(1200), false);
    assert_eq!(look_at_camera(&effects), Some(false));
    let lines = text_lines(&effects).unwrap();
    assert_eq!(lines[0], TextLine::big("2"));
    assert_eq!(lines[1].text, config.messages.look_at_camera);

    // 1.2s remaining: even half-second, visible
    let effects = session.update(t0 + Duration::from_millis(1800), false);
    assert_eq!(look_at_camera(&effects), Some(true));

    let effects = session.update(t0 + Duration::from_millis(2600), false);
    assert_eq!(text_lines(&effects).unwrap()[0], TextLine::big("1"));
}

#[test]
fn test_take_picture_waits_for_capture() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let t0 = Instant::now();

    let (mut session, recorder, _) = start_session(&config, t0);
    session.update(t0, true);

    let effects = session.update(t0 + Duration::from_secs(3), false);
    let orders = capture_orders(&effects);
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].image_number, 1);
    assert!(effects.contains(&SessionEffect::Display(DisplayIntent::BeginOverlay {
        image_number: 1
    })));
    assert_eq!(
        text_lines(&effects).unwrap()[0].text,
        config.messages.after_capture_text(1)
    );

    // No completion: the session stalls without skipping the photo
    for secs in [4, 10, 40, 600] {
        let effects = session.update(t0 + Duration::from_secs(secs), false);
        assert!(capture_orders(&effects).is_empty());
        assert!(matches!(session.state(), SessionState::TakePicture { .. }));
    }
    assert!(!session.is_idle(t0 + Duration::from_secs(600), config.control.idle()));

    recorder.record_capture(1, 1, orders[0].paths.clone());
    session.update(t0 + Duration::from_secs(601), false);
    assert!(matches!(session.state(), SessionState::Countdown { .. }));
    assert_eq!(session.photo_count(), 1);
}

#[test]
fn test_idle_detection() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let idle = config.control.idle();
    let t0 = Instant::now();

    let (session, _recorder, _) = start_session(&config, t0);
    assert!(!session.is_idle(t0 + idle, idle));
    assert!(session.is_idle(t0 + idle + Duration::from_millis(1), idle));

    let (mut started, _recorder, _) = start_session(&config, t0);
    started.update(t0 + Duration::from_secs(1), true);
    assert!(!started.is_idle(t0 + idle * 10, idle));
}

#[test]
fn test_montage_text_rotation() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.control.montage_display_secs = 6;
    config.messages.during_merge = "first\nsecond\nthird".to_string();
    let t0 = Instant::now();

    let (mut session, recorder, _) = start_session(&config, t0);
    session.update(t0, true);

    let mut now = t0;
    let mut montage_start = None;
    while montage_start.is_none() {
        now += TICK;
        let effects = session.update(now, false);
        for order in capture_orders(&effects) {
            recorder.record_capture(order.session_id, order.image_number, order.paths);
        }
        if matches!(session.state(), SessionState::ShowMontage { .. }) {
            assert_eq!(text_lines(&effects).unwrap()[0].text, "first");
            montage_start = Some(now);
        }
    }
    let start = montage_start.unwrap();

    let effects = session.update(start + Duration::from_millis(500), false);
    assert_eq!(text_lines(&effects).unwrap()[0].text, "first");

    let effects = session.update(start + Duration::from_millis(2500), false);
    assert_eq!(text_lines(&effects).unwrap()[0].text, "second");

    let effects = session.update(start + Duration::from_millis(5500), false);
    assert_eq!(text_lines(&effects).unwrap()[0].text, "third");

    session.update(start + Duration::from_secs(6), false);
    assert!(session.is_finished());
}

#[test]
fn test_recorder_refuses_foreign_and_repeated_captures() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let storage = EventStorage::new(&config.storage);
    let recorder = CaptureRecorder::new();

    // No active session
    assert!(!recorder.record_capture(1, 1, storage.image_paths(1, 1)));

    recorder.activate(2);
    assert!(!recorder.record_capture(1, 1, storage.image_paths(1, 1)));
    assert!(recorder.record_capture(2, 1, storage.image_paths(2, 1)));
    assert!(!recorder.record_capture(2, 1, storage.image_paths(2, 1)));
    assert!(recorder.has_image(2, 1));
    assert_eq!(recorder.images(2).len(), 1);

    recorder.release();
    assert!(!recorder.has_image(2, 1));
    assert!(recorder.images(2).is_empty());
}

#[test]
fn test_session_tags_drawn_from_list() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    config.tags.enabled = true;
    config.tags.count = 2;
    config.tags.list = vec!["party".into(), "booth".into(), "friends".into()];
    let t0 = Instant::now();

    let (session, _recorder, _) = start_session(&config, t0);
    assert_eq!(session.tags().len(), 2);
    assert!(session
        .tags()
        .iter()
        .all(|tag| config.tags.list.contains(tag)));
    assert_ne!(session.tags()[0], session.tags()[1]);
}
