pub mod app;
pub mod booth;
pub mod camera;
pub mod config;
pub mod error;
pub mod frame;
pub mod peripheral;
pub mod session;
pub mod storage;

pub use app::{BoothController, ComponentState, InputEvent, LogRenderSink, RenderSink, ShutdownReason};
pub use booth::{BoothModel, RecoveryResult};
pub use camera::{create_driver, CameraDriver, CameraService};
pub use config::BoothConfig;
pub use error::{BoothError, Result};
pub use frame::{EncodedFrame, Frame};
pub use peripheral::{PeripheralEvent, PeripheralProxy, PeripheralRequest};
pub use session::{DisplayIntent, Session, SessionEffect, SessionState};
pub use storage::EventStorage;
