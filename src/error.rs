use thiserror::Error;

#[derive(Error, Debug)]
pub enum BoothError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Peripheral error: {0}")]
    Peripheral(#[from] PeripheralError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl BoothError {
    pub fn component<C: Into<String>, M: Into<String>>(component: C, message: M) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    /// True when the error must bring the booth down.
    pub fn is_fatal(&self) -> bool {
        matches!(self, BoothError::Camera(e) if e.is_fatal())
    }
}

#[derive(Error, Debug, Clone)]
pub enum CameraError {
    #[error("Failed to open camera {device}: {details}")]
    DeviceOpen { device: String, details: String },

    #[error("Camera driver failure during {operation}: {details}")]
    Driver { operation: String, details: String },

    #[error("Camera configuration error: {details}")]
    Configuration { details: String },

    #[error("Failed to decode preview frame: {details}")]
    Decode { details: String },

    #[error("Camera worker {worker} could not be started: {details}")]
    Worker { worker: String, details: String },
}

impl CameraError {
    /// Driver-level failures have no degraded mode: the camera is mandatory.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CameraError::Driver { .. } | CameraError::DeviceOpen { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum PeripheralError {
    #[error("Printer device {device} unavailable: {details}")]
    PrinterDevice { device: String, details: String },

    #[error("Cannot encode QR code: {details}")]
    QrCode { details: String },

    #[error("Upload request failed: {details}")]
    Upload { details: String },

    #[error("Upload driver returned HTTP {status}: {body}")]
    UploadStatus { status: u16, body: String },

    #[error("{driver} does not support {request}")]
    Unsupported { driver: String, request: String },

    #[error("Peripheral worker {worker} is gone")]
    WorkerGone { worker: String },

    #[error("Request handler panicked: {details}")]
    HandlerPanic { details: String },
}

impl From<reqwest::Error> for PeripheralError {
    fn from(e: reqwest::Error) -> Self {
        PeripheralError::Upload {
            details: e.to_string(),
        }
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Failed to create session directory {path}: {source}")]
    DirectoryCreation {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Event directory {path} is not readable: {details}")]
    EventDirectory { path: String, details: String },

    #[error("Capture order channel closed")]
    CaptureChannelClosed,
}

pub type Result<T> = std::result::Result<T, BoothError>;
