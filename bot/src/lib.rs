//! IRC bot built on the single-connection engine.
//!
//! The engine keeps the connection alive and moves bytes; the [`Session`]
//! speaks IRC over the engine's buffers. [`run`] ties them together and
//! returns once the process is asked to stop.

pub mod config;
pub mod dispatch;
pub mod logging;
pub mod session;
pub mod signal;

pub use config::Config;
pub use session::Session;

use io_engine::{Buffers, Dialer, Engine, State};
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Reason sent with `QUIT` on shutdown.
pub const QUIT_REASON: &str = "shutting down";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Engine(#[from] io_engine::Error),
    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Connect with the configured settings and run until SIGINT or SIGTERM.
pub fn run(config: &Config) -> Result<(), Error> {
    let mut engine = Engine::new(&config.engine_config(), Instant::now())?;
    signal::install_signal_handler(engine.interrupt())?;
    run_engine(config, &mut engine)?;
    Ok(())
}

/// Drive an existing engine until its interrupt fires.
pub fn run_engine<D: Dialer>(config: &Config, engine: &mut Engine<D>) -> Result<(), io_engine::Error> {
    let mut buffers = Buffers::new(config.engine.buffer_size);
    let mut session = Session::new(config);
    let timeout = config.engine.poll_timeout();

    info!(
        host = %config.server.host,
        port = config.server.port,
        "starting"
    );

    loop {
        let outcome = engine.poll(&mut buffers, Instant::now(), Some(timeout))?;

        if outcome.resolve_failed {
            warn!(host = %config.server.host, "failed to resolve host");
        }

        if outcome.connected {
            if let Some(peer) = engine.connection().peer_addr() {
                info!(%peer, "connected to host");
            }
            session.on_connected(&mut buffers.write);
        }

        session.process(&mut buffers);

        if outcome.disconnected {
            let stats = engine.connection().stats();
            info!(
                bytes_read = stats.bytes_read,
                bytes_written = stats.bytes_written,
                "disconnected from host"
            );
            session.on_disconnected();
            buffers.clear();
        }

        if outcome.sig_int {
            info!("interrupt received, terminating");
            if engine.state() == State::Connected {
                session.quit(Some(QUIT_REASON), &mut buffers.write);
                engine.poll(&mut buffers, Instant::now(), Some(Duration::ZERO))?;
            }
            return Ok(());
        }
    }
}
