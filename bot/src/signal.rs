//! Signal handling for graceful shutdown.
//!
//! SIGINT and SIGTERM are forwarded to the engine as an interrupt. The main
//! loop then sends `QUIT` and exits. A second signal exits immediately.

use io_engine::Interrupt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Install the process-wide handler. Can only succeed once per process.
pub fn install_signal_handler(interrupt: Interrupt) -> Result<(), ctrlc::Error> {
    let received = Arc::new(AtomicBool::new(false));

    ctrlc::set_handler(move || {
        if received.swap(true, Ordering::SeqCst) {
            tracing::warn!("Received second signal, forcing immediate exit");
            std::process::exit(1);
        }
        tracing::info!("Received shutdown signal, disconnecting...");
        if let Err(e) = interrupt.trigger() {
            tracing::error!(error = %e, "failed to wake event loop, exiting");
            std::process::exit(1);
        }
    })
}
