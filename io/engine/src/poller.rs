//! Thin wrapper over the OS readiness multiplexer.
//!
//! Uses mio (epoll on Linux, kqueue on macOS). mio registrations are
//! edge-triggered: a handle is reported once per not-ready to ready
//! transition, so every consumer must drain until `WouldBlock`.

use mio::event::Source;
use mio::{Events, Interest, Poll, Registry, Token};
use std::io;
use std::time::Duration;

/// Readiness reported for one registered handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Readiness {
    pub token: Token,
    pub readable: bool,
    pub writable: bool,
    /// Peer hung up in either direction.
    pub closed: bool,
    pub error: bool,
}

/// Owns the multiplexer handle and the scratch space for one wait call.
pub struct Poller {
    poll: Poll,
    events: Events,
    ready: Vec<Readiness>,
}

impl Poller {
    /// Create a poller that reports up to `capacity` handles per wait.
    pub fn new(capacity: usize) -> io::Result<Self> {
        Ok(Self {
            poll: Poll::new()?,
            events: Events::with_capacity(capacity),
            ready: Vec::with_capacity(capacity),
        })
    }

    /// Registry for creating wakers and (re)registering handles.
    pub fn registry(&self) -> &Registry {
        self.poll.registry()
    }

    pub fn register<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().register(source, token, interest)
    }

    pub fn reregister<S>(&self, source: &mut S, token: Token, interest: Interest) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().reregister(source, token, interest)
    }

    pub fn deregister<S>(&self, source: &mut S) -> io::Result<()>
    where
        S: Source + ?Sized,
    {
        self.poll.registry().deregister(source)
    }

    /// Block until at least one handle is ready or `timeout` elapses.
    ///
    /// A wait interrupted by a signal is reported as zero ready handles.
    /// The results stay valid until the next call and are read with
    /// [`take_ready`](Self::take_ready).
    pub fn wait(&mut self, timeout: Option<Duration>) -> io::Result<usize> {
        self.ready.clear();

        match self.poll.poll(&mut self.events, timeout) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::Interrupted => return Ok(0),
            Err(e) => return Err(e),
        }

        self.ready.extend(self.events.iter().map(|e| Readiness {
            token: e.token(),
            readable: e.is_readable(),
            writable: e.is_writable(),
            closed: e.is_read_closed() || e.is_write_closed(),
            error: e.is_error(),
        }));

        Ok(self.ready.len())
    }

    /// Take the results of the last wait, leaving the scratch list with
    /// the caller. Hand it back with [`restore_ready`](Self::restore_ready)
    /// to keep its allocation.
    pub fn take_ready(&mut self) -> Vec<Readiness> {
        std::mem::take(&mut self.ready)
    }

    pub fn restore_ready(&mut self, mut ready: Vec<Readiness>) {
        ready.clear();
        self.ready = ready;
    }
}
