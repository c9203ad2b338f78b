//! The poll cycle that ties the pieces together.

use crate::config::Config;
use crate::connection::{Connection, State};
use crate::dialer::{Dialer, TcpDialer};
use crate::error::Error;
use crate::interrupt::Interrupt;
use crate::poller::Poller;
use crate::resolver::AddressResolver;
use crate::ring_buffer::Buffers;
use mio::{Token, Waker};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::trace;

/// Token of the connection socket.
pub const SOCKET: Token = Token(0);
/// Token of the completion channel shared by the resolver and [`Interrupt`].
pub const COMPLETION: Token = Token(1);

/// What happened during one [`Engine::poll`] call.
///
/// More than one flag may be set. A connection that is established and
/// lost in the same cycle reports both `connected` and `disconnected`.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Outcome {
    /// The connection reached `Connected`.
    pub connected: bool,
    /// An established connection was lost.
    pub disconnected: bool,
    /// Termination was requested through [`Interrupt`].
    pub sig_int: bool,
    /// Name resolution failed or could not be started.
    pub resolve_failed: bool,
}

impl Outcome {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Single-connection, single-threaded I/O engine.
///
/// Callers own the [`Buffers`]: bytes placed into `write` are sent, bytes
/// received appear in `read`. Each [`poll`](Self::poll) flushes and refills
/// them, waits for readiness, and applies every state transition that
/// became due.
pub struct Engine<D = TcpDialer> {
    poller: Poller,
    resolver: AddressResolver,
    interrupt: Interrupt,
    connection: Connection<D>,
}

impl Engine<TcpDialer> {
    /// Create an engine that dials with plain TCP sockets.
    pub fn new(config: &Config, now: Instant) -> Result<Self, Error> {
        Self::with_dialer(config, TcpDialer::new(config.tcp_nodelay), now)
    }
}

impl<D: Dialer> Engine<D> {
    /// Create an engine that opens connections through `dialer`.
    pub fn with_dialer(config: &Config, dialer: D, now: Instant) -> Result<Self, Error> {
        let poller = Poller::new(config.event_capacity).map_err(Error::Poller)?;
        let waker = Waker::new(poller.registry(), COMPLETION)
            .map(Arc::new)
            .map_err(Error::CompletionChannel)?;

        Ok(Self {
            resolver: AddressResolver::new(waker.clone()),
            interrupt: Interrupt::new(waker),
            connection: Connection::new(config, dialer, now),
            poller,
        })
    }

    /// A handle that makes the next poll report `sig_int`.
    pub fn interrupt(&self) -> Interrupt {
        self.interrupt.clone()
    }

    pub fn state(&self) -> State {
        self.connection.state()
    }

    pub fn connection(&self) -> &Connection<D> {
        &self.connection
    }

    /// Run one cycle: flush and refill the buffers, wait for readiness for
    /// at most `timeout` (`None` waits indefinitely), dispatch the events,
    /// then apply time-driven transitions using `now`.
    ///
    /// The wait is shortened so a pending retry or connect deadline is
    /// never overslept. Only failures of the multiplexer itself are
    /// returned as errors; connection trouble is reported through the
    /// returned [`Outcome`] and recovered from automatically.
    pub fn poll(
        &mut self,
        buffers: &mut Buffers,
        now: Instant,
        timeout: Option<Duration>,
    ) -> Result<Outcome, Error> {
        let mut outcome = Outcome::default();

        self.connection.pump(now, &self.poller, buffers, &mut outcome);

        let timeout = match self.connection.next_deadline() {
            Some(deadline) => {
                let until = deadline.saturating_duration_since(now);
                Some(timeout.map_or(until, |t| t.min(until)))
            }
            None => timeout,
        };

        self.poller.wait(timeout).map_err(Error::Wait)?;

        let ready = self.poller.take_ready();
        for event in ready.iter().copied() {
            match event.token {
                SOCKET => self.connection.on_readiness(
                    event,
                    now,
                    &self.poller,
                    buffers,
                    &mut outcome,
                ),
                COMPLETION => {
                    if self.interrupt.take() {
                        outcome.sig_int = true;
                    }
                    while let Some(result) = self.resolver.complete() {
                        self.connection.on_resolved(result, now, &mut outcome);
                    }
                }
                token => trace!(?token, "readiness for unknown token"),
            }
        }
        self.poller.restore_ready(ready);

        self.connection
            .advance(now, &self.poller, &mut self.resolver, &mut outcome);

        Ok(outcome)
    }
}
