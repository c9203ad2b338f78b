//! Cross-context termination request.

use mio::Waker;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Handle that asks a running engine to report `sig_int`.
///
/// Cloneable and `Send`, so it can be moved into a signal handler. The
/// request is latched until the next [`Engine::poll`](crate::Engine::poll)
/// observes it; triggering again before then has no further effect.
#[derive(Clone)]
pub struct Interrupt {
    waker: Arc<Waker>,
    pending: Arc<AtomicBool>,
}

impl Interrupt {
    pub(crate) fn new(waker: Arc<Waker>) -> Self {
        Self {
            waker,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Request termination and wake the engine.
    pub fn trigger(&self) -> io::Result<()> {
        self.pending.store(true, Ordering::SeqCst);
        self.waker.wake()
    }

    /// Whether a request is waiting to be observed.
    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    pub(crate) fn take(&self) -> bool {
        self.pending.swap(false, Ordering::SeqCst)
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("pending", &self.is_pending())
            .finish()
    }
}
