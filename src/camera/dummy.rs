use crate::config::CameraConfig;
use crate::error::CameraError;
use image::codecs::jpeg::JpegEncoder;
use image::{imageops, DynamicImage, Rgb, RgbImage};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Four captures per session; each one is blurred less than the previous so
/// the images of a session are distinguishable.
const CAPTURE_COUNT: u32 = 4;
const BLUR_SIGMA_STEP: f32 = 2.0;
const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);

/// Counters exposed for tests and diagnostics
#[derive(Debug, Default)]
pub struct DummyCameraStats {
    pub opens: AtomicU64,
    pub closes: AtomicU64,
    pub previews: AtomicU64,
    pub captures: AtomicU64,
}

/// Development camera serving a static JPEG as preview and producing
/// slightly varied full captures after a simulated shutter delay.
pub struct DummyCamera {
    preview_path: PathBuf,
    capture_path: PathBuf,
    preview_size: (u32, u32),
    capture_size: (u32, u32),
    capture_delay: Duration,
    preview_interval: Duration,
    preview_jpeg: Option<Vec<u8>>,
    curr_capture: u32,
    stats: Arc<DummyCameraStats>,
}

impl DummyCamera {
    pub fn new(config: &CameraConfig) -> Self {
        Self {
            preview_path: PathBuf::from(&config.dummy_preview_path),
            capture_path: PathBuf::from(&config.dummy_capture_path),
            preview_size: config.preview_resolution,
            capture_size: config.capture_resolution,
            capture_delay: Duration::from_millis(config.dummy_capture_delay_ms),
            preview_interval: PREVIEW_INTERVAL,
            preview_jpeg: None,
            curr_capture: 0,
            stats: Arc::new(DummyCameraStats::default()),
        }
    }

    /// Override the preview pacing (tests run it faster)
    pub fn with_preview_interval(mut self, interval: Duration) -> Self {
        self.preview_interval = interval;
        self
    }

    pub fn stats(&self) -> Arc<DummyCameraStats> {
        Arc::clone(&self.stats)
    }

    fn load_or_synthesize(path: &Path, size: (u32, u32)) -> DynamicImage {
        match image::open(path) {
            Ok(img) => img,
            Err(e) => {
                debug!(
                    "Dummy image {} unavailable ({}), generating {}x{} test pattern",
                    path.display(),
                    e,
                    size.0,
                    size.1
                );
                DynamicImage::ImageRgb8(test_pattern(size.0, size.1))
            }
        }
    }
}

impl super::CameraDriver for DummyCamera {
    fn name(&self) -> &'static str {
        "dummy"
    }

    fn open(&mut self) -> Result<(), CameraError> {
        let preview = Self::load_or_synthesize(&self.preview_path, self.preview_size);
        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, 85)
            .encode_image(&preview.to_rgb8())
            .map_err(|e| CameraError::Configuration {
                details: format!("Failed to encode dummy preview: {}", e),
            })?;

        self.preview_jpeg = Some(jpeg);
        self.stats.opens.fetch_add(1, Ordering::Relaxed);
        info!("CAMERA: DummyCamera serving static JPEGs");
        Ok(())
    }

    fn close(&mut self) {
        self.preview_jpeg = None;
        self.stats.closes.fetch_add(1, Ordering::Relaxed);
        debug!("Dummy camera closed");
    }

    fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError> {
        std::thread::sleep(self.preview_interval);

        let jpeg = self.preview_jpeg.as_ref().ok_or_else(|| CameraError::Driver {
            operation: "capture_preview".to_string(),
            details: "dummy camera is not open".to_string(),
        })?;

        self.stats.previews.fetch_add(1, Ordering::Relaxed);
        Ok(jpeg.clone())
    }

    fn capture_image(&mut self, path: &Path) -> Result<(), CameraError> {
        if self.preview_jpeg.is_none() {
            return Err(CameraError::Driver {
                operation: "capture_image".to_string(),
                details: "dummy camera is not open".to_string(),
            });
        }

        std::thread::sleep(self.capture_delay);

        let source = Self::load_or_synthesize(&self.capture_path, self.capture_size);
        let sigma = (CAPTURE_COUNT - self.curr_capture - 1) as f32 * BLUR_SIGMA_STEP;
        let image = if sigma > 0.0 {
            DynamicImage::ImageRgba8(imageops::blur(&source, sigma))
        } else {
            source
        };

        image
            .to_rgb8()
            .save(path)
            .map_err(|e| CameraError::Driver {
                operation: "capture_image".to_string(),
                details: format!("{}: {}", path.display(), e),
            })?;

        self.curr_capture = (self.curr_capture + 1) % CAPTURE_COUNT;
        self.stats.captures.fetch_add(1, Ordering::Relaxed);
        debug!("Dummy capture written to {}", path.display());
        Ok(())
    }
}

/// Diagonal gradient used when no dummy asset is on disk
fn test_pattern(width: u32, height: u32) -> RgbImage {
    let (w, h) = (width.max(1), height.max(1));
    RgbImage::from_fn(w, h, |x, y| {
        Rgb([
            (x * 255 / w) as u8,
            (y * 255 / h) as u8,
            ((x + y) * 255 / (w + h)) as u8,
        ])
    })
}
