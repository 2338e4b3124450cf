use crate::config::CameraConfig;
use crate::error::CameraError;
use gstreamer::prelude::*;
use gstreamer::{ClockTime, MessageType, MessageView, Pipeline, State};
use gstreamer_app::AppSink;
use std::path::Path;
use tracing::{debug, info, warn};

const PREVIEW_PULL_TIMEOUT_SECS: u64 = 5;
const STILL_CAPTURE_TIMEOUT_SECS: u64 = 15;

/// V4L2 camera driven through GStreamer. The preview pipeline streams MJPEG
/// into an appsink; a full capture tears the preview down and runs a
/// one-shot pipeline at capture resolution straight into the target file.
pub struct GstCamera {
    device: String,
    preview_resolution: (u32, u32),
    capture_resolution: (u32, u32),
    pipeline: Option<Pipeline>,
    appsink: Option<AppSink>,
    playing: bool,
}

impl GstCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            device: config.device.clone(),
            preview_resolution: config.preview_resolution,
            capture_resolution: config.capture_resolution,
            pipeline: None,
            appsink: None,
            playing: false,
        }
    }

    fn preview_pipeline_string(&self) -> String {
        let (width, height) = self.preview_resolution;
        format!(
            "v4l2src device={} io-mode=mmap ! \
             image/jpeg,width={},height={} ! \
             appsink name=sink sync=false max-buffers=1 drop=true emit-signals=false",
            self.device, width, height
        )
    }

    fn still_pipeline_string(&self, path: &Path) -> String {
        let (width, height) = self.capture_resolution;
        format!(
            "v4l2src device={} num-buffers=1 ! \
             image/jpeg,width={},height={} ! \
             filesink location=\"{}\"",
            self.device,
            width,
            height,
            path.display()
        )
    }

    fn driver_error(operation: &str, details: impl ToString) -> CameraError {
        CameraError::Driver {
            operation: operation.to_string(),
            details: details.to_string(),
        }
    }

    fn ensure_playing(&mut self) -> Result<&AppSink, CameraError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .ok_or_else(|| Self::driver_error("capture_preview", "pipeline not initialized"))?;

        if !self.playing {
            pipeline
                .set_state(State::Playing)
                .map_err(|e| Self::driver_error("capture_preview", e))?;
            self.playing = true;
            debug!("Preview pipeline playing");
        }

        self.appsink
            .as_ref()
            .ok_or_else(|| Self::driver_error("capture_preview", "appsink missing"))
    }

    fn halt_preview(&mut self) {
        if let Some(pipeline) = &self.pipeline {
            if let Err(e) = pipeline.set_state(State::Null) {
                warn!("Failed to stop preview pipeline: {}", e);
            }
        }
        self.playing = false;
    }
}

impl super::CameraDriver for GstCamera {
    fn name(&self) -> &'static str {
        "gstreamer"
    }

    fn open(&mut self) -> Result<(), CameraError> {
        gstreamer::init().map_err(|e| CameraError::DeviceOpen {
            device: self.device.clone(),
            details: format!("Failed to initialize GStreamer: {}", e),
        })?;

        let desc = self.preview_pipeline_string();
        info!("Creating GStreamer pipeline: {}", desc);

        let pipeline = gstreamer::parse::launch(&desc)
            .map_err(|e| CameraError::DeviceOpen {
                device: self.device.clone(),
                details: format!("Failed to create pipeline: {}", e),
            })?
            .downcast::<Pipeline>()
            .map_err(|_| CameraError::DeviceOpen {
                device: self.device.clone(),
                details: "Failed to downcast to Pipeline".to_string(),
            })?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| CameraError::DeviceOpen {
                device: self.device.clone(),
                details: "Pipeline has no appsink".to_string(),
            })?;

        self.pipeline = Some(pipeline);
        self.appsink = Some(appsink);
        self.playing = false;
        Ok(())
    }

    fn close(&mut self) {
        self.halt_preview();
        self.appsink = None;
        self.pipeline = None;
        debug!("GStreamer camera closed");
    }

    fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        let appsink = self.ensure_playing()?;

        let sample = appsink
            .try_pull_sample(ClockTime::from_seconds(PREVIEW_PULL_TIMEOUT_SECS))
            .ok_or_else(|| Self::driver_error("capture_preview", "no sample within timeout"))?;
        let buffer = sample
            .buffer()
            .ok_or_else(|| Self::driver_error("capture_preview", "sample without buffer"))?;
        let map = buffer
            .map_readable()
            .map_err(|e| Self::driver_error("capture_preview", e))?;

        Ok(map.as_slice().to_vec())
    }

    fn capture_image(&mut self, path: &Path) -> Result<(), CameraError> {
        // The device can only be opened by one pipeline at a time
        self.halt_preview();

        let desc = self.still_pipeline_string(path);
        debug!("Still capture pipeline: {}", desc);

        let still = gstreamer::parse::launch(&desc)
            .map_err(|e| Self::driver_error("capture_image", e))?
            .downcast::<Pipeline>()
            .map_err(|_| Self::driver_error("capture_image", "not a pipeline"))?;
        let bus = still
            .bus()
            .ok_or_else(|| Self::driver_error("capture_image", "pipeline without bus"))?;

        still
            .set_state(State::Playing)
            .map_err(|e| Self::driver_error("capture_image", e))?;

        let outcome = match bus.timed_pop_filtered(
            ClockTime::from_seconds(STILL_CAPTURE_TIMEOUT_SECS),
            &[MessageType::Eos, MessageType::Error],
        ) {
            Some(msg) => match msg.view() {
                MessageView::Eos(..) => Ok(()),
                MessageView::Error(err) => Err(Self::driver_error("capture_image", err.error())),
                _ => Err(Self::driver_error("capture_image", "unexpected bus message")),
            },
            None => Err(Self::driver_error("capture_image", "timed out waiting for still")),
        };

        let _ = still.set_state(State::Null);
        outcome
    }
}
