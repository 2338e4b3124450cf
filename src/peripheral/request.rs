use crate::error::PeripheralError;
use image::RgbImage;
use std::path::PathBuf;
use std::sync::Arc;

/// Work for a peripheral worker. Immutable once enqueued.
#[derive(Debug, Clone)]
pub enum PeripheralRequest {
    PrintImage {
        image: Arc<RgbImage>,
    },
    PrintSession {
        session_id: u32,
        images: Vec<PathBuf>,
        tags: Vec<String>,
    },
    PrintVideo {
        url: String,
    },
    CreateUploadPost {
        name: String,
    },
    UploadFile {
        url: String,
        path: PathBuf,
    },
    /// Animation, post and file uploads for a whole session, then the stamp
    UploadSession {
        session_id: u32,
        medium_images: Vec<PathBuf>,
        full_images: Vec<PathBuf>,
        tags: Vec<String>,
    },
}

impl PeripheralRequest {
    pub fn kind(&self) -> &'static str {
        match self {
            PeripheralRequest::PrintImage { .. } => "print_image",
            PeripheralRequest::PrintSession { .. } => "print_session",
            PeripheralRequest::PrintVideo { .. } => "print_video",
            PeripheralRequest::CreateUploadPost { .. } => "create_upload_post",
            PeripheralRequest::UploadFile { .. } => "upload_file",
            PeripheralRequest::UploadSession { .. } => "upload_session",
        }
    }
}

/// Outcomes reported back to the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeripheralEvent {
    PostCreated {
        name: String,
        url: String,
    },
    SessionUploaded {
        session_id: u32,
        url: String,
    },
    RequestFailed {
        worker: String,
        request: &'static str,
        error: String,
    },
}

/// A concrete printer or uploader. Runs on the proxy's worker thread and
/// may block for as long as the device or network needs.
pub trait PeripheralHandler: Send {
    fn name(&self) -> &'static str;

    fn handle(
        &mut self,
        request: PeripheralRequest,
    ) -> Result<Option<PeripheralEvent>, PeripheralError>;
}

pub(crate) fn unsupported(driver: &str, request: &PeripheralRequest) -> PeripheralError {
    PeripheralError::Unsupported {
        driver: driver.to_string(),
        request: request.kind().to_string(),
    }
}
