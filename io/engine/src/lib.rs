//! Single-connection event engine.
//!
//! Keeps one outbound TCP connection alive. Names are resolved off-thread,
//! each resolved address is tried in turn with a non-blocking connect and a
//! per-attempt deadline, and a lost connection is retried after a fixed
//! delay. Data moves through a pair of caller-owned ring buffers with
//! backpressure in both directions.
//!
//! ```no_run
//! use io_engine::{Buffers, Config, Engine};
//! use std::time::{Duration, Instant};
//!
//! let config = Config::new("irc.libera.chat", 6667);
//! let mut engine = Engine::new(&config, Instant::now())?;
//! let mut buffers = Buffers::new(2048);
//!
//! loop {
//!     let outcome = engine.poll(&mut buffers, Instant::now(), Some(Duration::from_millis(500)))?;
//!     if outcome.connected {
//!         buffers.write.put(b"NICK example\r\n");
//!     }
//!     if outcome.sig_int {
//!         break;
//!     }
//! }
//! # Ok::<(), io_engine::Error>(())
//! ```

mod config;
mod connection;
mod dialer;
mod engine;
mod error;
mod interrupt;
mod poller;
mod resolver;
mod ring_buffer;

pub use config::{Config, DEFAULT_CONNECT_TIMEOUT, DEFAULT_EVENT_CAPACITY, DEFAULT_RETRY_DELAY};
pub use connection::{Connection, FlowControl, State, Stats};
pub use dialer::{Dialer, TcpDialer};
pub use engine::{COMPLETION, Engine, Outcome, SOCKET};
pub use error::{Error, ResolveError};
pub use interrupt::Interrupt;
pub use poller::{Poller, Readiness};
pub use resolver::{AddressResolver, Resolution, Resolve};
pub use ring_buffer::{Buffers, RingBuffer};
