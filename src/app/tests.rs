use super::*;
use crate::camera::CameraDriver;
use crate::config::{BoothConfig, UploadDriverKind};
use crate::error::CameraError;
use crate::frame::Frame;
use crate::session::DisplayIntent;
use crate::storage::{EventStorage, ImageKind};
use image::{Rgb, RgbImage};
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> BoothConfig {
    let mut config = BoothConfig::default();
    let path = |name: &str| dir.path().join(name).to_string_lossy().to_string();

    config.camera.preview_resolution = (64, 48);
    config.camera.capture_resolution = (120, 80);
    config.camera.dummy_preview_path = path("missing_preview.jpg");
    config.camera.dummy_capture_path = path("missing_capture.jpg");
    config.camera.dummy_capture_delay_ms = 5;

    config.control.initial_countdown_secs = 1;
    config.control.midphoto_countdown_secs = 1;
    config.control.montage_display_secs = 1;
    config.control.look_at_camera_secs = 1;

    config.storage.event_dir = path("events");
    config.storage.medium_size = (60, 40);
    config.storage.preview_size = (30, 20);

    config.printer.null_output_dir = path("prints");
    config
}

/// Keeps every intent it is handed
#[derive(Clone, Default)]
struct RecordingRenderSink {
    intents: Arc<Mutex<Vec<DisplayIntent>>>,
    frames: Arc<Mutex<u64>>,
}

impl RenderSink for RecordingRenderSink {
    fn show_frame(&mut self, _frame: &Arc<Frame>) {
        *self.frames.lock() += 1;
    }

    fn apply(&mut self, intent: DisplayIntent) {
        self.intents.lock().push(intent);
    }
}

fn create_controller(config: BoothConfig) -> (BoothController, RecordingRenderSink) {
    let sink = RecordingRenderSink::default();
    let mut controller = BoothController::new(config, Box::new(sink.clone())).unwrap();
    controller.set_keyboard_enabled(false);
    (controller, sink)
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Drive ticks with a simulated clock, giving the capture thread real time
/// between them
fn tick_until(
    controller: &mut BoothController,
    now: &mut Instant,
    mut done: impl FnMut(&BoothController) -> bool,
) -> bool {
    for _ in 0..3000 {
        *now += Duration::from_millis(50);
        assert!(controller.tick(*now).is_none());
        if done(controller) {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    false
}

#[test]
fn test_full_session_reaches_printer_and_disk() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    let (mut controller, sink) = create_controller(config.clone());
    let input = controller.input_sender();

    // First press creates the session, the second starts the countdown
    let mut now = Instant::now();
    input.send(InputEvent::ButtonPressed).unwrap();
    controller.tick(now);
    assert_eq!(controller.model().active_session().unwrap().id(), 1);

    now += Duration::from_millis(10);
    input.send(InputEvent::ButtonPressed).unwrap();
    controller.tick(now);

    let finished = tick_until(&mut controller, &mut now, |c| {
        c.model().finished_sessions().count() == 1
    });
    assert!(finished, "session never finished");
    assert!(controller.model().active_session().is_none());

    let storage = EventStorage::new(&config.storage);
    assert!(storage.is_complete(1));
    let medium = image::open(storage.image_path(1, 4, ImageKind::Medium)).unwrap();
    assert_eq!((medium.width(), medium.height()), (60, 40));

    let intents = sink.intents.lock().clone();
    let overlays = intents
        .iter()
        .filter(|i| matches!(i, DisplayIntent::EndOverlay { .. }))
        .count();
    assert_eq!(overlays, 4);
    assert!(intents
        .iter()
        .any(|i| matches!(i, DisplayIntent::Montage { images } if images.len() == 4)));
    assert!(matches!(
        intents.last(),
        Some(DisplayIntent::IdleScreen { previews }) if previews.len() == 1
    ));

    let print = dir.path().join("prints").join("print-0.jpg");
    assert!(wait_until(Duration::from_secs(5), || print.exists()));
    assert!(*sink.frames.lock() > 0);
}

#[test]
fn test_quit_input_requests_shutdown() {
    let dir = TempDir::new().unwrap();
    let (mut controller, _sink) = create_controller(create_test_config(&dir));

    controller.input_sender().send(InputEvent::Quit).unwrap();
    assert_eq!(
        controller.tick(Instant::now()),
        Some(ShutdownReason::UserRequest)
    );
}

#[test]
fn test_print_preview_needs_a_frame() {
    let dir = TempDir::new().unwrap();
    let (mut controller, _sink) = create_controller(create_test_config(&dir));
    let input = controller.input_sender();

    // Preview is paused at startup: nothing to print
    input.send(InputEvent::PrintPreview).unwrap();
    controller.tick(Instant::now());
    assert_eq!(controller.printer.stats().enqueued, 0);

    controller.camera().start_preview();
    assert!(wait_until(Duration::from_secs(5), || {
        !controller.camera().capture_preview().is_placeholder()
    }));

    input.send(InputEvent::PrintPreview).unwrap();
    controller.tick(Instant::now());
    assert_eq!(controller.printer.stats().enqueued, 1);

    let print = dir.path().join("prints").join("print-0.jpg");
    assert!(wait_until(Duration::from_secs(5), || print.exists()));
}

/// Opens fine, then fails on the first preview frame
struct BrokenCamera;

impl CameraDriver for BrokenCamera {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn open(&mut self) -> std::result::Result<(), CameraError> {
        Ok(())
    }

    fn close(&mut self) {}

    fn capture_preview(&mut self) -> std::result::Result<Vec<u8>, CameraError> {
        Err(CameraError::Driver {
            operation: "capture_preview".to_string(),
            details: "usb disconnected".to_string(),
        })
    }

    fn capture_image(&mut self, _path: &Path) -> std::result::Result<(), CameraError> {
        Err(CameraError::Driver {
            operation: "capture_image".to_string(),
            details: "usb disconnected".to_string(),
        })
    }
}

#[test]
fn test_camera_failure_is_fatal() {
    let dir = TempDir::new().unwrap();
    let sink = RecordingRenderSink::default();
    let mut controller = BoothController::with_driver(
        create_test_config(&dir),
        Box::new(BrokenCamera),
        Box::new(sink),
    )
    .unwrap();

    // Starting a session starts the preview, which fails
    controller.input_sender().send(InputEvent::ButtonPressed).unwrap();
    let start = Instant::now();
    assert!(controller.tick(start).is_none());

    let mut reason = None;
    let found = wait_until(Duration::from_secs(5), || {
        reason = controller.tick(Instant::now());
        reason.is_some()
    });
    assert!(found);

    let reason = reason.unwrap();
    assert!(matches!(reason, ShutdownReason::Fatal(ref msg) if msg.contains("usb disconnected")));
    assert_eq!(reason.exit_code(), 1);
}

fn write_complete_session(config: &BoothConfig, session_id: u32) {
    let storage = EventStorage::new(&config.storage);
    std::fs::create_dir_all(storage.session_dir(session_id)).unwrap();
    for kind in [ImageKind::Full, ImageKind::Medium, ImageKind::Preview] {
        for path in storage.session_images(session_id, kind) {
            RgbImage::from_pixel(8, 6, Rgb([90, 90, 90]))
                .save(path)
                .unwrap();
        }
    }
}

#[test]
fn test_pending_uploads_are_retried() {
    let dir = TempDir::new().unwrap();
    let mut config = create_test_config(&dir);
    write_complete_session(&config, 1);
    write_complete_session(&config, 2);
    EventStorage::new(&config.storage).mark_uploaded(2).unwrap();

    config.upload.driver = UploadDriverKind::Atende;
    config.upload.api_endpoint = "http://127.0.0.1:9".to_string();
    let (mut controller, _sink) = create_controller(config);

    assert_eq!(controller.recovery().next_id, 3);
    assert_eq!(controller.recovery().pending_upload.len(), 1);

    assert_eq!(controller.retry_pending_uploads(), 1);
    assert_eq!(controller.uploader.stats().enqueued, 1);

    // Queued once only
    assert_eq!(controller.retry_pending_uploads(), 0);
}

#[test]
fn test_pending_uploads_skipped_without_uploader() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    write_complete_session(&config, 1);
    let (mut controller, _sink) = create_controller(config);

    assert_eq!(controller.recovery().pending_upload.len(), 1);
    assert_eq!(controller.retry_pending_uploads(), 0);
    assert_eq!(controller.uploader.stats().enqueued, 0);
}

#[tokio::test]
async fn test_start_and_shutdown() {
    let dir = TempDir::new().unwrap();
    let config = create_test_config(&dir);
    write_complete_session(&config, 4);
    let (mut controller, sink) = create_controller(config);

    controller.start().await;
    assert_eq!(
        controller.components().get("camera"),
        Some(&ComponentState::Running)
    );
    assert_eq!(controller.components().get("keyboard"), None);
    assert!(matches!(
        sink.intents.lock().first(),
        Some(DisplayIntent::IdleScreen { previews }) if previews.len() == 1
    ));

    let exit_code = controller.shutdown().await;
    assert_eq!(exit_code, 0);
    assert!(controller.cancellation_token().is_cancelled());

    let states = controller.components();
    for component in ["capture", "camera", "printer", "uploader"] {
        assert_eq!(states.get(component), Some(&ComponentState::Stopped), "{}", component);
    }
    assert_eq!(
        states.summary(),
        "camera=Stopped capture=Stopped printer=Stopped uploader=Stopped"
    );
}

#[test]
fn test_component_state_transitions() {
    let mut states = ComponentStates::default();
    assert_eq!(states.get("printer"), None);

    for state in [
        ComponentState::Starting,
        ComponentState::Running,
        ComponentState::Stopping,
        ComponentState::Stopped,
    ] {
        states.set("printer", state.clone());
        assert_eq!(states.get("printer"), Some(&state));
    }
    assert!(!states.any_failed(&["printer", "camera"]));

    states.set("camera", ComponentState::Failed);
    assert!(states.any_failed(&["printer", "camera"]));
    assert!(!states.any_failed(&["printer"]));
    assert_eq!(states.summary(), "camera=Failed printer=Stopped");
}

#[test]
fn test_shutdown_reason_exit_codes() {
    assert_eq!(ShutdownReason::Signal("SIGTERM".to_string()).exit_code(), 0);
    assert_eq!(ShutdownReason::UserRequest.exit_code(), 0);
    assert_eq!(ShutdownReason::Fatal("camera".to_string()).exit_code(), 1);
}

#[test]
fn test_log_render_sink_counts_new_frames() {
    let mut sink = LogRenderSink::new();
    let frame = Arc::new(Frame::placeholder());
    sink.show_frame(&frame);
    assert_eq!(sink.frames_shown(), 0);

    let real = Arc::new(Frame {
        id: 7,
        ..Frame::placeholder()
    });
    sink.show_frame(&real);
    sink.show_frame(&real);
    assert_eq!(sink.frames_shown(), 1);
}
