//! Single-slot "latest frame wins" handoff between a capture thread and the
//! processing loop.
//!
//! The producer never blocks: publishing overwrites whatever frame is still
//! waiting. The consumer blocks until a frame is available, the deadline
//! passes, or every sender is gone.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    #[error("timed out waiting for a frame")]
    Timeout,
    #[error("frame source closed")]
    Disconnected,
}

struct Slot<T> {
    frame: Option<T>,
    senders: usize,
    published: u64,
    dropped: u64,
}

struct Shared<T> {
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

/// Create a connected sender/receiver pair.
pub fn latest_frame_slot<T>() -> (FrameSender<T>, FrameReceiver<T>) {
    let shared = Arc::new(Shared {
        slot: Mutex::new(Slot {
            frame: None,
            senders: 1,
            published: 0,
            dropped: 0,
        }),
        ready: Condvar::new(),
    });
    (
        FrameSender {
            shared: Arc::clone(&shared),
        },
        FrameReceiver { shared },
    )
}

pub struct FrameSender<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameSender<T> {
    /// Store `frame` as the latest one, replacing any unconsumed frame.
    pub fn publish(&self, frame: T) {
        let mut slot = self.shared.slot.lock();
        if slot.frame.replace(frame).is_some() {
            slot.dropped += 1;
        }
        slot.published += 1;
        drop(slot);
        self.shared.ready.notify_one();
    }
}

impl<T> Clone for FrameSender<T> {
    fn clone(&self) -> Self {
        self.shared.slot.lock().senders += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Drop for FrameSender<T> {
    fn drop(&mut self) {
        let mut slot = self.shared.slot.lock();
        slot.senders -= 1;
        let last = slot.senders == 0;
        drop(slot);
        if last {
            self.shared.ready.notify_all();
        }
    }
}

pub struct FrameReceiver<T> {
    shared: Arc<Shared<T>>,
}

impl<T> FrameReceiver<T> {
    /// Take the waiting frame without blocking.
    pub fn try_recv(&self) -> Result<T, RecvError> {
        let mut slot = self.shared.slot.lock();
        match slot.frame.take() {
            Some(frame) => Ok(frame),
            None if slot.senders == 0 => Err(RecvError::Disconnected),
            None => Err(RecvError::Timeout),
        }
    }

    /// Block until a frame is available or `deadline` passes.
    ///
    /// A frame published before the last sender dropped is still delivered.
    pub fn recv_deadline(&self, deadline: Instant) -> Result<T, RecvError> {
        self.recv_until(Some(deadline))
    }

    /// Like [`recv_deadline`](Self::recv_deadline); a timeout past the
    /// clock's range waits without a deadline.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        self.recv_until(Instant::now().checked_add(timeout))
    }

    fn recv_until(&self, deadline: Option<Instant>) -> Result<T, RecvError> {
        let mut slot = self.shared.slot.lock();
        loop {
            if let Some(frame) = slot.frame.take() {
                return Ok(frame);
            }
            if slot.senders == 0 {
                return Err(RecvError::Disconnected);
            }
            let Some(deadline) = deadline else {
                self.shared.ready.wait(&mut slot);
                continue;
            };
            if self.shared.ready.wait_until(&mut slot, deadline).timed_out() {
                return slot.frame.take().ok_or(if slot.senders == 0 {
                    RecvError::Disconnected
                } else {
                    RecvError::Timeout
                });
            }
        }
    }

    /// Frames published so far.
    pub fn published(&self) -> u64 {
        self.shared.slot.lock().published
    }

    /// Frames overwritten before the consumer took them.
    pub fn dropped(&self) -> u64 {
        self.shared.slot.lock().dropped
    }
}
