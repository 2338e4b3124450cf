use crate::frame::EncodedFrame;
use crossbeam::channel::{self, Receiver, RecvError, Sender, TryRecvError, TrySendError};
use tracing::trace;

/// Create the single-slot hand-off between the preview capture worker and the
/// decode worker. A push onto a full slot replaces the unconsumed frame, so at
/// most one undecoded frame is ever retained. Dropping the producer
/// disconnects the consumer once the slot is drained.
pub fn latest_frame_queue() -> (FrameProducer, FrameConsumer) {
    let (tx, rx) = channel::bounded(1);
    (
        FrameProducer {
            tx,
            evict: rx.clone(),
        },
        FrameConsumer { rx },
    )
}

pub struct FrameProducer {
    tx: Sender<EncodedFrame>,
    evict: Receiver<EncodedFrame>,
}

impl FrameProducer {
    /// Push a frame, evicting the older unconsumed one if present.
    /// Returns the number of frames dropped (0 or 1).
    pub fn push(&self, frame: EncodedFrame) -> usize {
        let mut dropped = 0;
        let mut pending = frame;

        loop {
            match self.tx.try_send(pending) {
                Ok(()) => return dropped,
                Err(TrySendError::Full(back)) => {
                    if let Ok(stale) = self.evict.try_recv() {
                        trace!("Dropping stale preview frame {}", stale.id);
                        dropped += 1;
                    }
                    pending = back;
                }
                Err(TrySendError::Disconnected(_)) => return dropped,
            }
        }
    }
}

pub struct FrameConsumer {
    rx: Receiver<EncodedFrame>,
}

impl FrameConsumer {
    /// Block until a frame is available, then return the newest one along
    /// with the number of older frames skipped on the way.
    pub fn recv_newest(&self) -> Result<(EncodedFrame, usize), RecvError> {
        let mut frame = self.rx.recv()?;
        let mut skipped = 0;

        loop {
            match self.rx.try_recv() {
                Ok(newer) => {
                    skipped += 1;
                    frame = newer;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }

        Ok((frame, skipped))
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
