//! Render-request trigger shared between the scheduler and the render side.
//!
//! The scheduler never waits on the consumer. Requests coalesce: while one
//! is pending, further requests are dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// One-way "render is due" signal.
pub trait RenderTrigger: Send + Sync {
    /// Must not block.
    fn request_render(&self);
}

/// Coalescing trigger backed by a single-slot channel.
#[derive(Debug, Clone)]
pub struct RenderSignal {
    sender:    flume::Sender<()>,
    requested: Arc<AtomicU64>,
}

/// Consumer end of a [`RenderSignal`].
#[derive(Debug, Clone)]
pub struct RenderRequests {
    receiver: flume::Receiver<()>,
}

impl RenderSignal {
    pub fn new() -> (Self, RenderRequests) {
        let (sender, receiver) = flume::bounded(1);
        let signal = Self {
            sender,
            requested: Arc::new(AtomicU64::new(0)),
        };
        (signal, RenderRequests { receiver })
    }

    /// Total requests issued, including coalesced ones.
    pub fn requested(&self) -> u64 {
        self.requested.load(Ordering::Relaxed)
    }
}

impl RenderTrigger for RenderSignal {
    fn request_render(&self) {
        self.requested.fetch_add(1, Ordering::Relaxed);
        match self.sender.try_send(()) {
            Ok(()) | Err(flume::TrySendError::Full(())) => {}
            Err(flume::TrySendError::Disconnected(())) => {
                log::trace!("render request dropped: no consumer");
            }
        }
    }
}

impl RenderRequests {
    /// Block until a render is due or `timeout` elapses.
    pub fn wait(&self, timeout: Duration) -> bool {
        self.receiver.recv_timeout(timeout).is_ok()
    }

    /// Take a pending request without blocking.
    pub fn try_take(&self) -> bool {
        self.receiver.try_recv().is_ok()
    }
}
