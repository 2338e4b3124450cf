use crate::config::{CameraConfig, CameraDriverKind};
use crate::error::CameraError;
use std::path::Path;
use tracing::info;

use super::dummy::DummyCamera;

/// Contract every camera backend fulfils. Calls are serialised by the
/// service's hardware lock, so implementations never see concurrent access.
pub trait CameraDriver: Send {
    /// Short backend name for logs
    fn name(&self) -> &'static str;

    /// Acquire the hardware
    fn open(&mut self) -> Result<(), CameraError>;

    /// Release the hardware
    fn close(&mut self);

    /// Grab one encoded (JPEG) preview frame
    fn capture_preview(&mut self) -> Result<Vec<u8>, CameraError>;

    /// Full-resolution capture written to `path`
    fn capture_image(&mut self, path: &Path) -> Result<(), CameraError>;
}

/// Build the configured backend. The set of backends is closed and picked once
/// at startup.
pub fn create_driver(config: &CameraConfig) -> Result<Box<dyn CameraDriver>, CameraError> {
    info!("Selecting camera driver: {:?}", config.driver);

    match config.driver {
        CameraDriverKind::Dummy => Ok(Box::new(DummyCamera::new(config))),
        #[cfg(all(feature = "camera", target_os = "linux"))]
        CameraDriverKind::Gstreamer => Ok(Box::new(super::gstreamer::GstCamera::new(config))),
        #[cfg(not(all(feature = "camera", target_os = "linux")))]
        CameraDriverKind::Gstreamer => Err(CameraError::Configuration {
            details: "GStreamer camera driver requires the `camera` feature on Linux".to_string(),
        }),
    }
}
