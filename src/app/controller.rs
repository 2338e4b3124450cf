use super::capture_worker::CaptureWorker;
use super::keyboard_input::KeyboardInputHandler;
use super::render::RenderSink;
use super::state::ComponentStates;
use super::types::InputEvent;
use crate::booth::{BoothModel, RecoveryResult};
use crate::camera::{create_driver, CameraDriver, CameraService};
use crate::config::BoothConfig;
use crate::error::{CameraError, Result};
use crate::peripheral::{create_printer, create_uploader, PeripheralEvent, PeripheralProxy};
use crate::session::DisplayIntent;
use crossbeam::channel::Receiver;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Wires the booth model to the camera, the capture thread, the display and
/// the peripheral workers, and drives it all from one tick loop.
pub struct BoothController {
    pub(super) config: BoothConfig,
    pub(super) model: BoothModel,
    pub(super) recovery: RecoveryResult,

    // Components
    pub(super) camera: Arc<CameraService>,
    pub(super) capture: CaptureWorker,
    pub(super) printer: PeripheralProxy,
    pub(super) uploader: PeripheralProxy,
    pub(super) render: Box<dyn RenderSink>,
    pub(super) keyboard_handler: Option<KeyboardInputHandler>,
    pub(super) keyboard_enabled: bool,

    // Channels into the tick loop
    pub(super) input_tx: mpsc::UnboundedSender<InputEvent>,
    pub(super) input_rx: mpsc::UnboundedReceiver<InputEvent>,
    pub(super) display_rx: mpsc::UnboundedReceiver<DisplayIntent>,
    pub(super) peripheral_events: mpsc::UnboundedReceiver<PeripheralEvent>,
    pub(super) camera_errors: Receiver<CameraError>,

    // Lifecycle management
    pub(super) components: ComponentStates,
    pub(super) cancellation_token: CancellationToken,
}

impl BoothController {
    /// Recover the event directory, open the configured camera and spawn the
    /// workers
    pub fn new(config: BoothConfig, render: Box<dyn RenderSink>) -> Result<Self> {
        let driver = create_driver(&config.camera)?;
        Self::with_driver(config, driver, render)
    }

    pub fn with_driver(
        config: BoothConfig,
        driver: Box<dyn CameraDriver>,
        render: Box<dyn RenderSink>,
    ) -> Result<Self> {
        let mut model = BoothModel::new(&config);
        let recovery = model.load_from_disk()?;

        let camera = Arc::new(CameraService::start(driver)?);
        let camera_errors = camera.fatal_errors();

        let (display_tx, display_rx) = mpsc::unbounded_channel();
        let capture = CaptureWorker::spawn(
            Arc::clone(&camera),
            model.recorder(),
            &config.storage,
            display_tx,
        )?;

        let (events_tx, peripheral_events) = mpsc::unbounded_channel();
        let printer = PeripheralProxy::spawn(
            "printer",
            create_printer(&config.printer),
            Some(events_tx.clone()),
        )?;
        let uploader = PeripheralProxy::spawn(
            "uploader",
            create_uploader(&config.upload, model.storage().clone()),
            Some(events_tx),
        )?;

        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let keyboard_handler = Some(KeyboardInputHandler::new(input_tx.clone()));

        info!(
            "Booth controller ready: camera {}, next session {}",
            camera.driver_name(),
            recovery.next_id
        );

        Ok(Self {
            config,
            model,
            recovery,
            camera,
            capture,
            printer,
            uploader,
            render,
            keyboard_handler,
            keyboard_enabled: true,
            input_tx,
            input_rx,
            display_rx,
            peripheral_events,
            camera_errors,
            components: ComponentStates::default(),
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Enable or disable the keyboard input handler
    pub fn set_keyboard_enabled(&mut self, enabled: bool) {
        self.keyboard_enabled = enabled;
    }

    /// Feed for other input sources (GPIO button, tests)
    pub fn input_sender(&self) -> mpsc::UnboundedSender<InputEvent> {
        self.input_tx.clone()
    }

    pub fn model(&self) -> &BoothModel {
        &self.model
    }

    pub fn recovery(&self) -> &RecoveryResult {
        &self.recovery
    }

    pub fn components(&self) -> &ComponentStates {
        &self.components
    }

    pub fn camera(&self) -> &Arc<CameraService> {
        &self.camera
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }
}
