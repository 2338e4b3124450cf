use super::capture_worker::CaptureCommand;
use super::{BoothController, InputEvent, ShutdownReason};
use crate::peripheral::{PeripheralEvent, PeripheralRequest};
use crate::session::SessionEffect;
use std::sync::Arc;
use std::time::Instant;
use tokio::signal;
use tokio::sync::{oneshot, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

impl BoothController {
    /// Run the tick loop until a signal, a quit key or a fatal camera error
    pub async fn run(&mut self) -> i32 {
        info!("Photo booth is running");

        let (shutdown_sender, mut shutdown_receiver) = oneshot::channel();
        self.setup_signal_handlers(shutdown_sender);

        let mut interval = tokio::time::interval(self.config.control.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let cancelled = self.cancellation_token.clone();

        let reason = loop {
            tokio::select! {
                Ok(reason) = &mut shutdown_receiver => break reason,
                _ = cancelled.cancelled() => break ShutdownReason::UserRequest,
                _ = interval.tick() => {
                    if let Some(reason) = self.tick(Instant::now()) {
                        break reason;
                    }
                }
            }
        };

        info!("Shutdown initiated: {:?}", reason);
        let exit_code = self.shutdown().await.max(reason.exit_code());

        info!("Photo booth shutdown complete");
        exit_code
    }

    /// One pass of the control loop. Never blocks: camera work goes to the
    /// capture thread and peripheral work to the proxies.
    pub fn tick(&mut self, now: Instant) -> Option<ShutdownReason> {
        if let Ok(e) = self.camera_errors.try_recv() {
            error!("Camera failure, shutting down: {}", e);
            return Some(ShutdownReason::Fatal(e.to_string()));
        }

        let mut button_pressed = false;
        while let Ok(input) = self.input_rx.try_recv() {
            match input {
                InputEvent::ButtonPressed => button_pressed = true,
                InputEvent::PrintPreview => self.print_preview(),
                InputEvent::Quit => return Some(ShutdownReason::UserRequest),
            }
        }

        while let Ok(intent) = self.display_rx.try_recv() {
            self.render.apply(intent);
        }

        for effect in self.model.update(now, button_pressed) {
            self.dispatch(effect);
        }

        let frame = self.camera.capture_preview();
        self.render.show_frame(&frame);

        while let Ok(event) = self.peripheral_events.try_recv() {
            self.handle_peripheral_event(event);
        }

        None
    }

    fn dispatch(&mut self, effect: SessionEffect) {
        match effect {
            SessionEffect::Display(intent) => self.render.apply(intent),
            SessionEffect::StartPreview => self.send_capture(CaptureCommand::StartPreview),
            SessionEffect::StopPreview => self.send_capture(CaptureCommand::StopPreview),
            SessionEffect::Capture(order) => self.send_capture(CaptureCommand::Capture(order)),
            SessionEffect::SessionFinished(session) => {
                debug!("Handing session {} to the peripherals", session.id);
                self.send_peripheral(
                    "printer",
                    PeripheralRequest::PrintSession {
                        session_id: session.id,
                        images: session.medium_images.clone(),
                        tags: session.tags.clone(),
                    },
                );
                self.send_peripheral(
                    "uploader",
                    PeripheralRequest::UploadSession {
                        session_id: session.id,
                        medium_images: session.medium_images,
                        full_images: session.full_images,
                        tags: session.tags,
                    },
                );
            }
        }
    }

    fn send_capture(&self, command: CaptureCommand) {
        if let Err(e) = self.capture.send(command) {
            error!("Capture worker unavailable: {}", e);
        }
    }

    fn send_peripheral(&self, worker: &str, request: PeripheralRequest) {
        let proxy = if worker == "printer" {
            &self.printer
        } else {
            &self.uploader
        };
        if let Err(e) = proxy.send(request) {
            warn!("Dropping {} request: {}", worker, e);
        }
    }

    fn print_preview(&self) {
        let frame = self.camera.capture_preview();
        if frame.is_placeholder() {
            warn!("No preview frame to print yet");
            return;
        }
        info!("Printing preview frame {}", frame.id);
        self.send_peripheral(
            "printer",
            PeripheralRequest::PrintImage {
                image: Arc::clone(&frame.image),
            },
        );
    }

    fn handle_peripheral_event(&self, event: PeripheralEvent) {
        match event {
            PeripheralEvent::SessionUploaded { session_id, url } => {
                info!("Session {} is online at {}", session_id, url);
                if self.config.printer.print_upload_url {
                    self.send_peripheral("printer", PeripheralRequest::PrintVideo { url });
                }
            }
            PeripheralEvent::PostCreated { name, url } => {
                debug!("Post '{}' created at {}", name, url);
            }
            PeripheralEvent::RequestFailed {
                worker, request, ..
            } => {
                debug!("{} request on {} was dropped", request, worker);
            }
        }
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(&self, shutdown_sender: oneshot::Sender<ShutdownReason>) {
        let shutdown_sender = Arc::new(Mutex::new(Some(shutdown_sender)));

        // Handle SIGTERM (systemd stop) - Unix only
        #[cfg(unix)]
        {
            let shutdown_sender_sigterm = Arc::clone(&shutdown_sender);
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        error!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                if sigterm.recv().await.is_some() {
                    info!("Received SIGTERM signal");
                    if let Some(sender) = shutdown_sender_sigterm.lock().await.take() {
                        let _ = sender.send(ShutdownReason::Signal("SIGTERM".to_string()));
                    }
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        let shutdown_sender_sigint = Arc::clone(&shutdown_sender);
        tokio::spawn(async move {
            if let Ok(()) = signal::ctrl_c().await {
                info!("Received SIGINT signal (Ctrl+C)");
                if let Some(sender) = shutdown_sender_sigint.lock().await.take() {
                    let _ = sender.send(ShutdownReason::Signal("SIGINT".to_string()));
                }
            }
        });
    }
}
