use crate::camera::CameraService;
use crate::config::StorageConfig;
use crate::error::{BoothError, Result, SessionError};
use crate::session::{CaptureOrder, CaptureRecorder, DisplayIntent};
use crate::storage::ImagePaths;
use crossbeam::channel::{self, Receiver, Sender};
use image::imageops::FilterType;
use image::DynamicImage;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Work for the capture thread, in the order the booth emitted it
#[derive(Debug, Clone)]
pub enum CaptureCommand {
    Capture(CaptureOrder),
    StartPreview,
    StopPreview,
}

#[derive(Debug, Clone, Copy)]
struct Renditions {
    medium: (u32, u32),
    preview: (u32, u32),
}

/// Runs everything that may block on the camera off the control loop:
/// preview switching and full captures with their scaled copies.
pub struct CaptureWorker {
    tx: Option<Sender<CaptureCommand>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureWorker {
    pub fn spawn(
        camera: Arc<CameraService>,
        recorder: CaptureRecorder,
        storage: &StorageConfig,
        display_tx: mpsc::UnboundedSender<DisplayIntent>,
    ) -> Result<Self> {
        let (tx, rx) = channel::unbounded();
        let renditions = Renditions {
            medium: storage.medium_size,
            preview: storage.preview_size,
        };

        let handle = thread::Builder::new()
            .name("capture-orders".to_string())
            .spawn(move || capture_loop(camera, recorder, renditions, rx, display_tx))
            .map_err(|e| BoothError::component("capture", e.to_string()))?;

        Ok(Self {
            tx: Some(tx),
            handle: Some(handle),
        })
    }

    pub fn send(&self, command: CaptureCommand) -> std::result::Result<(), SessionError> {
        let tx = self.tx.as_ref().ok_or(SessionError::CaptureChannelClosed)?;
        tx.send(command).map_err(|_| SessionError::CaptureChannelClosed)
    }

    /// Stop taking commands; queued ones still run. The handle joins the thread.
    pub fn close(&mut self) -> Option<JoinHandle<()>> {
        self.tx.take();
        self.handle.take()
    }
}

fn capture_loop(
    camera: Arc<CameraService>,
    recorder: CaptureRecorder,
    renditions: Renditions,
    rx: Receiver<CaptureCommand>,
    display_tx: mpsc::UnboundedSender<DisplayIntent>,
) {
    debug!("Capture worker running");

    for command in rx.iter() {
        match command {
            CaptureCommand::StartPreview => camera.start_preview(),
            CaptureCommand::StopPreview => {
                if let Err(e) = camera.stop_preview() {
                    error!("Failed to reset the camera: {}", e);
                }
            }
            CaptureCommand::Capture(order) => {
                let image_number = order.image_number;
                match take_picture(&camera, &order, renditions) {
                    Ok(()) => {
                        if recorder.record_capture(order.session_id, image_number, order.paths.clone()) {
                            let _ = display_tx.send(DisplayIntent::EndOverlay {
                                image_number,
                                preview: order.paths.preview.clone(),
                            });
                        }
                    }
                    Err(e) => error!(
                        "Photo {} of session {} failed: {}",
                        image_number, order.session_id, e
                    ),
                }
            }
        }
    }

    debug!("Capture worker stopped");
}

/// Full capture with the preview paused, then the medium and preview copies
fn take_picture(camera: &CameraService, order: &CaptureOrder, renditions: Renditions) -> Result<()> {
    let started = Instant::now();

    camera.pause_preview();
    let captured = camera.capture_image(&order.paths.full);
    camera.start_preview();
    captured?;

    let full = image::open(&order.paths.full)?;
    save_renditions(&full, &order.paths, renditions)?;

    info!(
        "Photo {} of session {} captured in {:?}",
        order.image_number,
        order.session_id,
        started.elapsed()
    );
    Ok(())
}

fn save_renditions(full: &DynamicImage, paths: &ImagePaths, renditions: Renditions) -> Result<()> {
    let (w, h) = renditions.medium;
    let medium = full.resize(w, h, FilterType::Triangle);
    medium.to_rgb8().save(&paths.medium)?;

    // The preview is scaled from the medium copy
    let (w, h) = renditions.preview;
    let preview = medium.resize(w, h, FilterType::Triangle);
    preview.to_rgb8().save(&paths.preview)?;

    if medium.width() > full.width() {
        warn!(
            "Medium size {:?} exceeds the capture ({}x{})",
            renditions.medium,
            full.width(),
            full.height()
        );
    }
    Ok(())
}
