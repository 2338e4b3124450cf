use crate::error::CameraError;
use image::RgbImage;
use std::sync::Arc;
use std::time::SystemTime;

/// Encoded still as returned by the camera driver
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Monotonic frame identifier assigned by the capture worker
    pub id: u64,
    /// Timestamp when the driver handed the frame over
    pub timestamp: SystemTime,
    /// JPEG bytes (shared ownership for efficiency)
    pub data: Arc<Vec<u8>>,
}

impl EncodedFrame {
    pub fn new(id: u64, data: Vec<u8>) -> Self {
        Self {
            id,
            timestamp: SystemTime::now(),
            data: Arc::new(data),
        }
    }

    /// Decode the JPEG payload into an RGB bitmap
    pub fn decode(&self) -> Result<Frame, CameraError> {
        let decoded = image::load_from_memory(&self.data).map_err(|e| CameraError::Decode {
            details: format!("frame {}: {}", self.id, e),
        })?;

        Ok(Frame {
            id: self.id,
            timestamp: self.timestamp,
            image: Arc::new(decoded.to_rgb8()),
        })
    }
}

/// Decoded preview frame; an immutable snapshot shared between the decode
/// worker and any number of readers.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Identifier of the encoded frame this was decoded from (0 for the placeholder)
    pub id: u64,
    pub timestamp: SystemTime,
    pub image: Arc<RgbImage>,
}

impl Frame {
    /// 1x1 black frame served until the first real frame is decoded
    pub fn placeholder() -> Self {
        Self {
            id: 0,
            timestamp: SystemTime::UNIX_EPOCH,
            image: Arc::new(RgbImage::new(1, 1)),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id == 0
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

#[cfg(test)]
pub(crate) fn encode_test_jpeg(width: u32, height: u32, shade: u8) -> Vec<u8> {
    use image::codecs::jpeg::JpegEncoder;

    let img = RgbImage::from_pixel(width, height, image::Rgb([shade, shade / 2, 255 - shade]));
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 85)
        .encode_image(&img)
        .expect("encode test jpeg");
    out
}
