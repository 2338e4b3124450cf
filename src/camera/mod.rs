mod driver;
mod dummy;
#[cfg(all(feature = "camera", target_os = "linux"))]
mod gstreamer;
mod queue;
mod service;
#[cfg(test)]
mod tests;

pub use driver::{create_driver, CameraDriver};
pub use dummy::{DummyCamera, DummyCameraStats};
#[cfg(all(feature = "camera", target_os = "linux"))]
pub use self::gstreamer::GstCamera;
pub use queue::{latest_frame_queue, FrameConsumer, FrameProducer};
pub use service::{CameraService, CameraStats, CameraStatsSnapshot};
