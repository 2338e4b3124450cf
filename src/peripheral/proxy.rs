use crate::error::PeripheralError;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::request::{PeripheralEvent, PeripheralHandler, PeripheralRequest};

#[derive(Debug, Default)]
pub struct ProxyStats {
    pub enqueued: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyStatsSnapshot {
    pub enqueued: u64,
    pub completed: u64,
    pub failed: u64,
}

impl ProxyStats {
    pub fn snapshot(&self) -> ProxyStatsSnapshot {
        ProxyStatsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Fire-and-forget front of an isolated worker thread. Requests are handled
/// one at a time in enqueue order; a failing or panicking request is logged
/// and dropped, and the worker moves on to the next one.
pub struct PeripheralProxy {
    name: String,
    tx: Mutex<Option<mpsc::UnboundedSender<PeripheralRequest>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    stats: Arc<ProxyStats>,
}

impl PeripheralProxy {
    pub fn spawn(
        name: &str,
        handler: Box<dyn PeripheralHandler>,
        events: Option<mpsc::UnboundedSender<PeripheralEvent>>,
    ) -> Result<Self, PeripheralError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(ProxyStats::default());

        let worker_name = name.to_string();
        let worker_stats = Arc::clone(&stats);
        let worker = thread::Builder::new()
            .name(format!("{}-worker", name))
            .spawn(move || request_worker(worker_name, handler, rx, events, worker_stats))
            .map_err(|e| PeripheralError::WorkerGone {
                worker: format!("{} ({})", name, e),
            })?;

        info!("{} worker started", name);

        Ok(Self {
            name: name.to_string(),
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
            stats,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueue a request without waiting for the worker
    pub fn send(&self, request: PeripheralRequest) -> Result<(), PeripheralError> {
        let guard = self.tx.lock();
        let tx = guard.as_ref().ok_or_else(|| PeripheralError::WorkerGone {
            worker: self.name.clone(),
        })?;

        debug!("{}: enqueue {}", self.name, request.kind());
        tx.send(request).map_err(|_| PeripheralError::WorkerGone {
            worker: self.name.clone(),
        })?;
        self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn stats(&self) -> ProxyStatsSnapshot {
        self.stats.snapshot()
    }

    /// Stop accepting requests. The worker finishes what is already queued
    /// and exits; the returned handle joins it.
    pub fn close(&self) -> Option<JoinHandle<()>> {
        if self.tx.lock().take().is_some() {
            debug!("{}: closed for new requests", self.name);
        }
        self.worker.lock().take()
    }
}

impl Drop for PeripheralProxy {
    fn drop(&mut self) {
        // Detach: in-flight work is abandoned at process exit
        self.tx.lock().take();
    }
}

fn request_worker(
    name: String,
    mut handler: Box<dyn PeripheralHandler>,
    mut rx: mpsc::UnboundedReceiver<PeripheralRequest>,
    events: Option<mpsc::UnboundedSender<PeripheralEvent>>,
    stats: Arc<ProxyStats>,
) {
    info!("{} worker running with {} driver", name, handler.name());

    while let Some(request) = rx.blocking_recv() {
        let kind = request.kind();
        let started = Instant::now();
        info!("{}: processing {}", name, kind);

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request)))
            .unwrap_or_else(|payload| {
                Err(PeripheralError::HandlerPanic {
                    details: panic_message(payload.as_ref()),
                })
            });

        let event = match outcome {
            Ok(event) => {
                stats.completed.fetch_add(1, Ordering::Relaxed);
                info!("{}: {} done in {:?}", name, kind, started.elapsed());
                event
            }
            Err(e) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                error!("{}: {} failed after {:?}: {}", name, kind, started.elapsed(), e);
                Some(PeripheralEvent::RequestFailed {
                    worker: name.clone(),
                    request: kind,
                    error: e.to_string(),
                })
            }
        };

        if let (Some(events), Some(event)) = (events.as_ref(), event) {
            if events.send(event).is_err() {
                warn!("{}: event receiver gone", name);
            }
        }
    }

    info!("{} worker stopped", name);
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
