use super::*;
use crate::config::{BoothConfig, CameraConfig};
use crate::error::CameraError;
use crate::frame::{encode_test_jpeg, EncodedFrame};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn create_test_config(dir: &TempDir) -> CameraConfig {
    CameraConfig {
        preview_resolution: (64, 48),
        capture_resolution: (96, 64),
        dummy_preview_path: dir.path().join("missing-preview.jpg").display().to_string(),
        dummy_capture_path: dir.path().join("missing-capture.jpg").display().to_string(),
        dummy_capture_delay_ms: 10,
        ..BoothConfig::default().camera
    }
}

fn create_dummy(dir: &TempDir) -> DummyCamera {
    DummyCamera::new(&create_test_config(dir)).with_preview_interval(Duration::from_millis(5))
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    condition()
}

/// Driver whose hardware disappears after a number of preview frames
struct FailingDriver {
    previews_left: u32,
}

impl CameraDriver for FailingDriver {
    fn name(&self) -> &'static str {
        "failing"
    }

    fn open(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    fn close(&mut self) {}

    fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        std::thread::sleep(Duration::from_millis(2));
        if self.previews_left == 0 {
            return Err(CameraError::Driver {
                operation: "capture_preview".to_string(),
                details: "usb disconnected".to_string(),
            });
        }
        self.previews_left -= 1;
        Ok(encode_test_jpeg(8, 8, 10))
    }

    fn capture_image(&mut self, _path: &Path) -> Result<(), CameraError> {
        Err(CameraError::Driver {
            operation: "capture_image".to_string(),
            details: "shutter jammed".to_string(),
        })
    }
}

/// Records every call that finds the hardware already busy
#[derive(Default)]
struct ExclusiveDriver {
    in_use: Arc<AtomicBool>,
    overlaps: Arc<AtomicUsize>,
    previews: Arc<AtomicUsize>,
    captures: Arc<AtomicUsize>,
}

impl ExclusiveDriver {
    fn hold_hardware(&self) {
        if self.in_use.swap(true, Ordering::SeqCst) {
            self.overlaps.fetch_add(1, Ordering::SeqCst);
        }
        std::thread::sleep(Duration::from_millis(3));
        self.in_use.store(false, Ordering::SeqCst);
    }
}

impl CameraDriver for ExclusiveDriver {
    fn name(&self) -> &'static str {
        "exclusive"
    }

    fn open(&mut self) -> Result<(), CameraError> {
        self.hold_hardware();
        Ok(())
    }

    fn close(&mut self) {
        self.hold_hardware();
    }

    fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        self.hold_hardware();
        self.previews.fetch_add(1, Ordering::SeqCst);
        Ok(encode_test_jpeg(8, 8, 40))
    }

    fn capture_image(&mut self, _path: &Path) -> Result<(), CameraError> {
        self.hold_hardware();
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[test]
fn test_queue_keeps_only_newest_frame() {
    let (producer, consumer) = latest_frame_queue();

    let mut dropped = 0;
    for id in 1..=5 {
        dropped += producer.push(EncodedFrame::new(id, vec![id as u8]));
    }

    assert_eq!(dropped, 4);
    assert_eq!(consumer.len(), 1);

    let (frame, skipped) = consumer.recv_newest().unwrap();
    assert_eq!(frame.id, 5);
    assert_eq!(skipped, 0);
    assert!(consumer.is_empty());
}

#[test]
fn test_queue_disconnects_when_producer_dropped() {
    let (producer, consumer) = latest_frame_queue();
    producer.push(EncodedFrame::new(1, vec![1]));
    drop(producer);

    assert_eq!(consumer.recv_newest().unwrap().0.id, 1);
    assert!(consumer.recv_newest().is_err());
}

#[test]
fn test_placeholder_before_first_frame() {
    let dir = TempDir::new().unwrap();
    let service = CameraService::start(Box::new(create_dummy(&dir))).unwrap();

    // Preview starts paused, so nothing has been decoded yet
    assert!(service.is_preview_paused());
    assert!(service.capture_preview().is_placeholder());
    assert_eq!(service.driver_name(), "dummy");

    service.close();
}

#[test]
fn test_preview_publishes_decoded_frames() {
    let dir = TempDir::new().unwrap();
    let service = CameraService::start(Box::new(create_dummy(&dir))).unwrap();

    service.start_preview();
    assert!(wait_until(Duration::from_secs(5), || {
        !service.capture_preview().is_placeholder()
    }));

    let frame = service.capture_preview();
    assert_eq!((frame.width(), frame.height()), (64, 48));
    assert!(service.stats().frames_decoded >= 1);

    service.close();
}

#[test]
fn test_pause_stops_preview_capture() {
    let dir = TempDir::new().unwrap();
    let dummy = create_dummy(&dir);
    let dummy_stats = dummy.stats();
    let service = CameraService::start(Box::new(dummy)).unwrap();

    service.start_preview();
    assert!(wait_until(Duration::from_secs(5), || {
        dummy_stats.previews.load(Ordering::Relaxed) >= 3
    }));

    service.pause_preview();
    // Let an in-flight capture finish
    std::thread::sleep(Duration::from_millis(50));
    let paused_at = dummy_stats.previews.load(Ordering::Relaxed);
    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(dummy_stats.previews.load(Ordering::Relaxed), paused_at);

    // Starting twice is harmless
    service.start_preview();
    service.start_preview();
    assert!(wait_until(Duration::from_secs(5), || {
        dummy_stats.previews.load(Ordering::Relaxed) > paused_at
    }));

    service.close();
}

#[test]
fn test_stop_preview_reopens_hardware() {
    let dir = TempDir::new().unwrap();
    let dummy = create_dummy(&dir);
    let dummy_stats = dummy.stats();
    let service = CameraService::start(Box::new(dummy)).unwrap();

    service.start_preview();
    service.stop_preview().unwrap();

    assert!(service.is_preview_paused());
    assert_eq!(dummy_stats.opens.load(Ordering::Relaxed), 2);
    assert_eq!(dummy_stats.closes.load(Ordering::Relaxed), 1);

    service.close();
}

#[test]
fn test_capture_image_writes_file() {
    let dir = TempDir::new().unwrap();
    let service = CameraService::start(Box::new(create_dummy(&dir))).unwrap();
    let target = dir.path().join("1.jpg");

    service.start_preview();
    service.capture_image(&target).unwrap();

    let written = image::open(&target).unwrap();
    assert_eq!((written.width(), written.height()), (96, 64));
    assert_eq!(service.stats().full_captures, 1);

    service.close();
}

#[test]
fn test_preview_and_full_captures_never_overlap() {
    let dir = TempDir::new().unwrap();
    let driver = ExclusiveDriver::default();
    let overlaps = Arc::clone(&driver.overlaps);
    let previews = Arc::clone(&driver.previews);
    let captures = Arc::clone(&driver.captures);
    let service = Arc::new(CameraService::start(Box::new(driver)).unwrap());

    service.start_preview();
    assert!(wait_until(Duration::from_secs(5), || {
        previews.load(Ordering::SeqCst) >= 2
    }));

    let shooters: Vec<_> = (0..3)
        .map(|n| {
            let service = Arc::clone(&service);
            let path = dir.path().join(format!("{}.jpg", n));
            std::thread::spawn(move || {
                for _ in 0..5 {
                    service.capture_image(&path).unwrap();
                }
            })
        })
        .collect();
    service.stop_preview().unwrap();
    service.start_preview();
    for shooter in shooters {
        shooter.join().unwrap();
    }

    let before = previews.load(Ordering::SeqCst);
    assert!(wait_until(Duration::from_secs(5), || {
        previews.load(Ordering::SeqCst) > before
    }));
    service.close();

    assert_eq!(captures.load(Ordering::SeqCst), 15);
    assert_eq!(service.stats().full_captures, 15);
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
}

#[test]
fn test_close_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let dummy = create_dummy(&dir);
    let dummy_stats = dummy.stats();
    let service = CameraService::start(Box::new(dummy)).unwrap();

    service.start_preview();
    service.close();
    service.close();
    drop(service);

    assert_eq!(dummy_stats.closes.load(Ordering::Relaxed), 1);
}

#[test]
fn test_preview_failure_is_reported_as_fatal() {
    let service = CameraService::start(Box::new(FailingDriver { previews_left: 2 })).unwrap();
    let fatal = service.fatal_errors();

    service.start_preview();
    let err = fatal.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(err.is_fatal());
    assert!(err.to_string().contains("usb disconnected"));

    service.close();
}

#[test]
fn test_capture_failure_is_reported_as_fatal() {
    let dir = TempDir::new().unwrap();
    let service = CameraService::start(Box::new(FailingDriver { previews_left: 0 })).unwrap();
    let fatal = service.fatal_errors();

    let result = service.capture_image(&dir.path().join("1.jpg"));
    assert!(matches!(result, Err(CameraError::Driver { .. })));
    assert!(fatal.recv_timeout(Duration::from_secs(1)).is_ok());

    service.close();
}

#[test]
fn test_create_driver_selects_dummy() {
    let driver = create_driver(&BoothConfig::default().camera).unwrap();
    assert_eq!(driver.name(), "dummy");
}
