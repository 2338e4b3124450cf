use super::{BoothController, ComponentState};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::task;
use tokio::time::timeout;
use tracing::{error, info, warn};

const CAPTURE_STOP_TIMEOUT: Duration = Duration::from_secs(20);
const CAMERA_STOP_TIMEOUT: Duration = Duration::from_secs(10);
/// Queued prints and uploads get this long before they are abandoned
const PERIPHERAL_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// A failure to stop these makes the exit code non-zero
const VITAL_COMPONENTS: [&str; 2] = ["capture", "camera"];

impl BoothController {
    /// Perform graceful shutdown of all components
    pub async fn shutdown(&mut self) -> i32 {
        info!("Beginning graceful shutdown");

        self.cancellation_token.cancel();

        if self.keyboard_enabled {
            self.components.set("keyboard", ComponentState::Stopping);
            if let Some(keyboard) = &self.keyboard_handler {
                keyboard.stop().await;
            }
            self.components.set("keyboard", ComponentState::Stopped);
        }

        // Capture thread first: it is the only other user of the camera
        self.components.set("capture", ComponentState::Stopping);
        let state = match self.capture.close() {
            Some(handle) => join_worker("capture", handle, CAPTURE_STOP_TIMEOUT).await,
            None => ComponentState::Stopped,
        };
        self.components.set("capture", state);

        self.components.set("camera", ComponentState::Stopping);
        let camera = Arc::clone(&self.camera);
        let state = match timeout(CAMERA_STOP_TIMEOUT, task::spawn_blocking(move || camera.close())).await {
            Ok(Ok(())) => {
                info!("camera component stopped");
                ComponentState::Stopped
            }
            Ok(Err(e)) => {
                error!("Error stopping camera component: {}", e);
                ComponentState::Failed
            }
            Err(_) => {
                error!("camera component stop timeout");
                ComponentState::Failed
            }
        };
        self.components.set("camera", state);

        for (name, proxy) in [("printer", &self.printer), ("uploader", &self.uploader)] {
            let stats = proxy.stats();
            info!(
                "Stopping {} ({} requests, {} failed)",
                name, stats.enqueued, stats.failed
            );
            let state = match proxy.close() {
                Some(handle) => join_worker(name, handle, PERIPHERAL_DRAIN_TIMEOUT).await,
                None => ComponentState::Stopped,
            };
            self.components.set(name, state);
        }

        let exit_code = i32::from(self.components.any_failed(&VITAL_COMPONENTS));
        info!("Component states: {}", self.components.summary());
        info!("Graceful shutdown completed with exit code: {}", exit_code);
        exit_code
    }
}

async fn join_worker(name: &str, handle: JoinHandle<()>, limit: Duration) -> ComponentState {
    match timeout(limit, task::spawn_blocking(move || handle.join())).await {
        Ok(Ok(Ok(()))) => {
            info!("{} component stopped", name);
            ComponentState::Stopped
        }
        Ok(Ok(Err(_))) => {
            error!("{} worker panicked", name);
            ComponentState::Failed
        }
        Ok(Err(e)) => {
            error!("Error stopping {} component: {}", name, e);
            ComponentState::Failed
        }
        Err(_) => {
            warn!("{} did not stop within {:?}, abandoning it", name, limit);
            ComponentState::Failed
        }
    }
}
