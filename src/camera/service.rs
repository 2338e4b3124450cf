use crate::error::CameraError;
use crate::frame::{EncodedFrame, Frame};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::driver::CameraDriver;
use super::queue::{latest_frame_queue, FrameConsumer, FrameProducer};

/// Preview pipeline statistics
#[derive(Debug, Default)]
pub struct CameraStats {
    pub frames_captured: AtomicU64,
    pub frames_decoded: AtomicU64,
    pub frames_dropped: AtomicU64,
    pub decode_errors: AtomicU64,
    pub full_captures: AtomicU64,
}

impl CameraStats {
    pub fn snapshot(&self) -> CameraStatsSnapshot {
        CameraStatsSnapshot {
            frames_captured: self.frames_captured.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            full_captures: self.full_captures.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraStatsSnapshot {
    pub frames_captured: u64,
    pub frames_decoded: u64,
    pub frames_dropped: u64,
    pub decode_errors: u64,
    pub full_captures: u64,
}

struct PreviewGate {
    paused: bool,
    running: bool,
}

struct Shared {
    /// Hardware lock: preview and full captures never interleave on the device
    driver: Mutex<Box<dyn CameraDriver>>,
    gate: Mutex<PreviewGate>,
    gate_cv: Condvar,
    /// Latest decoded frame; single writer (decode worker), many readers
    current: RwLock<Arc<Frame>>,
    stats: CameraStats,
    fatal_tx: Sender<CameraError>,
}

impl Shared {
    fn report_fatal(&self, err: CameraError) {
        error!("CAMERA EXCEPTION, EXITING! {}", err);
        let _ = self.fatal_tx.try_send(err);
    }
}

/// Owns the camera: a capture worker feeds encoded preview frames into a
/// single-slot queue, a decode worker publishes the newest one as the
/// current frame, and full captures share the capture worker's hardware lock.
pub struct CameraService {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    fatal_rx: Receiver<CameraError>,
    driver_name: &'static str,
}

impl CameraService {
    /// Open the driver and start both workers with the preview paused
    pub fn start(mut driver: Box<dyn CameraDriver>) -> Result<Self, CameraError> {
        let driver_name = driver.name();
        info!("Starting camera service with {} driver", driver_name);
        driver.open()?;

        let (fatal_tx, fatal_rx) = channel::bounded(4);
        let shared = Arc::new(Shared {
            driver: Mutex::new(driver),
            gate: Mutex::new(PreviewGate {
                paused: true,
                running: true,
            }),
            gate_cv: Condvar::new(),
            current: RwLock::new(Arc::new(Frame::placeholder())),
            stats: CameraStats::default(),
            fatal_tx,
        });

        let (producer, consumer) = latest_frame_queue();

        let capture_shared = Arc::clone(&shared);
        let capture = thread::Builder::new()
            .name("camera-capture".to_string())
            .spawn(move || capture_worker(capture_shared, producer))
            .map_err(|e| CameraError::Worker {
                worker: "camera-capture".to_string(),
                details: e.to_string(),
            })?;

        let decode_shared = Arc::clone(&shared);
        let decode = thread::Builder::new()
            .name("camera-decode".to_string())
            .spawn(move || decode_worker(decode_shared, consumer))
            .map_err(|e| CameraError::Worker {
                worker: "camera-decode".to_string(),
                details: e.to_string(),
            })?;

        debug!("Camera workers started");

        Ok(Self {
            shared,
            workers: Mutex::new(vec![capture, decode]),
            fatal_rx,
            driver_name,
        })
    }

    pub fn driver_name(&self) -> &'static str {
        self.driver_name
    }

    /// Resume continuous preview capture (idempotent)
    pub fn start_preview(&self) {
        let mut gate = self.shared.gate.lock();
        if gate.paused {
            debug!("start_preview");
        }
        gate.paused = false;
        self.shared.gate_cv.notify_all();
    }

    /// Stop feeding new preview frames; the hardware session stays open
    pub fn pause_preview(&self) {
        self.shared.gate.lock().paused = true;
    }

    /// Pause the preview and cold-reopen the hardware. Some cameras only reset
    /// their mirror/shutter mechanism on a fresh connection.
    pub fn stop_preview(&self) -> Result<(), CameraError> {
        debug!("stop_preview");
        self.pause_preview();

        let mut driver = self.shared.driver.lock();
        driver.close();
        if let Err(e) = driver.open() {
            self.shared.report_fatal(e.clone());
            return Err(e);
        }

        debug!("stop_preview END");
        Ok(())
    }

    /// Latest decoded frame. Never blocks on the camera; returns a placeholder
    /// until the first frame has been decoded.
    pub fn capture_preview(&self) -> Arc<Frame> {
        Arc::clone(&self.shared.current.read())
    }

    /// Blocking full-resolution capture into `path`
    pub fn capture_image(&self, path: &Path) -> Result<(), CameraError> {
        debug!("capture_image: {}", path.display());
        let started = Instant::now();

        let result = {
            let mut driver = self.shared.driver.lock();
            driver.capture_image(path)
        };

        match result {
            Ok(()) => {
                self.shared.stats.full_captures.fetch_add(1, Ordering::Relaxed);
                debug!("capture_image END ({:?})", started.elapsed());
                Ok(())
            }
            Err(e) => {
                if e.is_fatal() {
                    self.shared.report_fatal(e.clone());
                }
                Err(e)
            }
        }
    }

    /// Fatal driver errors raised by any worker; the owner must shut down
    pub fn fatal_errors(&self) -> Receiver<CameraError> {
        self.fatal_rx.clone()
    }

    pub fn stats(&self) -> CameraStatsSnapshot {
        self.shared.stats.snapshot()
    }

    pub fn is_preview_paused(&self) -> bool {
        self.shared.gate.lock().paused
    }

    /// Stop and join the workers, then release the hardware
    pub fn close(&self) {
        let workers: Vec<JoinHandle<()>> = std::mem::take(&mut *self.workers.lock());
        if workers.is_empty() {
            return;
        }

        info!("Closing camera service");
        {
            let mut gate = self.shared.gate.lock();
            gate.running = false;
            self.shared.gate_cv.notify_all();
        }

        for worker in workers {
            let name = worker.thread().name().unwrap_or("camera-worker").to_string();
            if worker.join().is_err() {
                warn!("Camera worker {} panicked", name);
            }
        }

        self.shared.driver.lock().close();
        info!("Camera service closed");
    }
}

impl Drop for CameraService {
    fn drop(&mut self) {
        self.close();
    }
}

fn capture_worker(shared: Arc<Shared>, producer: FrameProducer) {
    let mut frame_id = 0u64;

    loop {
        {
            let mut gate = shared.gate.lock();
            while gate.paused && gate.running {
                shared.gate_cv.wait(&mut gate);
            }
            if !gate.running {
                break;
            }
        }

        let result = {
            let mut driver = shared.driver.lock();
            driver.capture_preview()
        };

        match result {
            Ok(bytes) => {
                frame_id += 1;
                shared.stats.frames_captured.fetch_add(1, Ordering::Relaxed);
                let dropped = producer.push(EncodedFrame::new(frame_id, bytes));
                if dropped > 0 {
                    shared
                        .stats
                        .frames_dropped
                        .fetch_add(dropped as u64, Ordering::Relaxed);
                }
            }
            Err(e) => {
                shared.report_fatal(e);
                break;
            }
        }
    }

    debug!("Camera capture worker exiting");
}

fn decode_worker(shared: Arc<Shared>, consumer: FrameConsumer) {
    while let Ok((encoded, skipped)) = consumer.recv_newest() {
        if skipped > 0 {
            info!("DROPPING {} FRAME(S)!", skipped);
            shared
                .stats
                .frames_dropped
                .fetch_add(skipped as u64, Ordering::Relaxed);
        }

        match encoded.decode() {
            Ok(frame) => {
                *shared.current.write() = Arc::new(frame);
                shared.stats.frames_decoded.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                shared.stats.decode_errors.fetch_add(1, Ordering::Relaxed);
                warn!("{}", e);
            }
        }
    }

    debug!("Camera decode worker exiting");
}
