//! Connection state machine.
//!
//! Drives one outbound connection through
//! `Disconnected -> Resolving -> Resolved -> Connecting -> Connected` and
//! back to `Disconnected` on any failure, forever. The socket only exists
//! in `Connecting` and `Connected`; the candidate list only exists in
//! `Resolved` and `Connecting`. Both invariants are carried by [`Phase`].
//!
//! Every method takes the current time explicitly. Nothing here reads a
//! clock, so transitions are a pure function of (time, readiness) inputs.

use crate::config::Config;
use crate::dialer::Dialer;
use crate::engine::{Outcome, SOCKET};
use crate::poller::{Poller, Readiness};
use crate::resolver::{Resolution, Resolve};
use crate::ring_buffer::{Buffers, RingBuffer};
use mio::net::TcpStream;
use mio::Interest;
use std::io::{self, Read, Write};
use std::net::SocketAddr;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// Externally visible connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Disconnected,
    Resolving,
    Resolved,
    Connecting,
    Connected,
}

/// Backpressure flags, one per direction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    /// The last read stopped because the read buffer was full. Read
    /// interest has to be re-armed once there is room again.
    pub read_full: bool,
    /// The last write stopped because the socket would block with data
    /// still queued. Writes now wait for writable readiness.
    pub write_full: bool,
}

/// Counters kept across reconnects.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Candidates handed to the dialer.
    pub connect_attempts: u64,
    /// Times read interest was re-armed after the read buffer drained.
    pub read_rearms: u64,
    pub bytes_read: u64,
    pub bytes_written: u64,
    /// Transitions out of `Connected`.
    pub disconnects: u64,
}

/// Resolved addresses and a cursor to the next untried one. Never empty.
#[derive(Debug)]
struct Candidates {
    addrs: Vec<SocketAddr>,
    next: usize,
}

impl Candidates {
    fn new(addrs: Vec<SocketAddr>) -> Option<Self> {
        if addrs.is_empty() {
            None
        } else {
            Some(Self { addrs, next: 0 })
        }
    }
}

impl Iterator for Candidates {
    type Item = SocketAddr;

    fn next(&mut self) -> Option<SocketAddr> {
        let addr = self.addrs.get(self.next).copied()?;
        self.next += 1;
        Some(addr)
    }
}

#[derive(Debug)]
enum Phase {
    Disconnected {
        retry_at: Instant,
    },
    Resolving,
    Resolved {
        candidates: Candidates,
    },
    Connecting {
        stream: TcpStream,
        addr: SocketAddr,
        candidates: Candidates,
        deadline: Instant,
    },
    Connected {
        stream: TcpStream,
        peer: SocketAddr,
    },
}

/// What to do once the borrow of the current phase has ended.
enum Next {
    Stay,
    Established,
    NextCandidate,
    Disconnect(io::Error),
}

/// State machine for the single outbound connection.
pub struct Connection<D> {
    host: String,
    port: u16,
    retry_delay: Duration,
    connect_timeout: Duration,
    dialer: D,
    phase: Phase,
    flow: FlowControl,
    /// Whether the socket registration currently includes WRITABLE.
    write_interest: bool,
    stats: Stats,
}

impl<D: Dialer> Connection<D> {
    /// Create a disconnected state machine whose first retry is due at `now`.
    pub fn new(config: &Config, dialer: D, now: Instant) -> Self {
        Self {
            host: config.host.clone(),
            port: config.port,
            retry_delay: config.retry_delay,
            connect_timeout: config.connect_timeout,
            dialer,
            phase: Phase::Disconnected { retry_at: now },
            flow: FlowControl::default(),
            write_interest: false,
            stats: Stats::default(),
        }
    }

    pub fn state(&self) -> State {
        match self.phase {
            Phase::Disconnected { .. } => State::Disconnected,
            Phase::Resolving => State::Resolving,
            Phase::Resolved { .. } => State::Resolved,
            Phase::Connecting { .. } => State::Connecting,
            Phase::Connected { .. } => State::Connected,
        }
    }

    pub fn flow(&self) -> FlowControl {
        self.flow
    }

    pub fn stats(&self) -> Stats {
        self.stats
    }

    #[cfg(test)]
    fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Address of the connected peer.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        match self.phase {
            Phase::Connected { peer, .. } => Some(peer),
            _ => None,
        }
    }

    /// The candidate currently being connected to.
    pub fn connecting_addr(&self) -> Option<SocketAddr> {
        match self.phase {
            Phase::Connecting { addr, .. } => Some(addr),
            _ => None,
        }
    }

    /// The earliest time at which [`advance`](Self::advance) will act on
    /// its own, if any.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.phase {
            Phase::Disconnected { retry_at } => Some(retry_at),
            Phase::Connecting { deadline, .. } => Some(deadline),
            _ => None,
        }
    }

    /// Time-driven transitions, evaluated once per poll cycle after event
    /// dispatch.
    pub fn advance<R: Resolve>(
        &mut self,
        now: Instant,
        poller: &Poller,
        resolver: &mut R,
        outcome: &mut Outcome,
    ) {
        match self.phase {
            Phase::Disconnected { retry_at } if now >= retry_at => {
                match resolver.start(&self.host, self.port) {
                    Ok(()) => {
                        trace!(host = %self.host, port = self.port, "resolving");
                        self.phase = Phase::Resolving;
                    }
                    Err(e) => {
                        debug!(error = %e, "failed to submit resolution");
                        outcome.resolve_failed = true;
                        self.phase = Phase::Disconnected {
                            retry_at: now + self.retry_delay,
                        };
                    }
                }
            }
            Phase::Resolved { .. } => self.try_next_candidate(now, poller),
            Phase::Connecting { deadline, addr, .. } if now >= deadline => {
                debug!(%addr, "connect timed out");
                self.try_next_candidate(now, poller);
            }
            _ => {}
        }
    }

    /// Deliver the result of the outstanding resolution request.
    pub fn on_resolved(&mut self, result: Resolution, now: Instant, outcome: &mut Outcome) {
        if !matches!(self.phase, Phase::Resolving) {
            trace!("ignoring stale resolution");
            return;
        }

        match result.map(Candidates::new) {
            Ok(Some(candidates)) => {
                trace!(count = candidates.addrs.len(), "resolved");
                self.phase = Phase::Resolved { candidates };
            }
            Ok(None) => {
                debug!(host = %self.host, "resolution returned no addresses");
                self.fail_resolution(now, outcome);
            }
            Err(e) => {
                debug!(error = %e, "resolution failed");
                self.fail_resolution(now, outcome);
            }
        }
    }

    /// Handle readiness reported for the socket.
    pub fn on_readiness(
        &mut self,
        event: Readiness,
        now: Instant,
        poller: &Poller,
        buffers: &mut Buffers,
        outcome: &mut Outcome,
    ) {
        let next = match &mut self.phase {
            Phase::Connecting { stream, addr, .. } => {
                if event.error || event.closed {
                    let error = stream.take_error().ok().flatten();
                    debug!(%addr, ?error, "connect failed");
                    Next::NextCandidate
                } else if event.writable {
                    match confirm_connected(stream) {
                        Ok(true) => {
                            match poller.reregister(stream, SOCKET, Interest::READABLE) {
                                Ok(()) => Next::Established,
                                Err(e) => {
                                    debug!(%addr, error = %e, "failed to reregister");
                                    Next::NextCandidate
                                }
                            }
                        }
                        // Spurious wakeup, keep waiting
                        Ok(false) => Next::Stay,
                        Err(e) => {
                            debug!(%addr, error = %e, "connect failed");
                            Next::NextCandidate
                        }
                    }
                } else {
                    Next::Stay
                }
            }
            Phase::Connected { stream, .. } => {
                let mut next = Next::Stay;

                // Pick up whatever arrived ahead of a hangup before acting on it
                if event.readable && buffers.read.free_space() > 0 {
                    if let Err(e) = fill(stream, &mut buffers.read, &mut self.flow, &mut self.stats)
                    {
                        next = Next::Disconnect(e);
                    }
                }

                if matches!(next, Next::Stay) && (event.error || event.closed) {
                    let error = stream
                        .take_error()
                        .ok()
                        .flatten()
                        .unwrap_or_else(|| io::Error::from(io::ErrorKind::ConnectionReset));
                    next = Next::Disconnect(error);
                }

                if matches!(next, Next::Stay) && event.writable {
                    self.flow.write_full = false;
                    if !buffers.write.is_empty() {
                        if let Err(e) =
                            drain(stream, &mut buffers.write, &mut self.flow, &mut self.stats)
                        {
                            next = Next::Disconnect(e);
                        }
                    }
                }

                next
            }
            _ => Next::Stay,
        };

        match next {
            Next::Stay => {}
            Next::Established => self.establish(outcome),
            Next::NextCandidate => self.try_next_candidate(now, poller),
            Next::Disconnect(e) => self.disconnect(now, poller, outcome, e),
        }
    }

    /// Reconcile buffers and readiness interest before waiting.
    ///
    /// Readiness is edge-triggered, so a socket that was left readable
    /// because the read buffer filled up will never be reported again on
    /// its own. Re-registering makes the kernel re-evaluate it.
    pub fn pump(
        &mut self,
        now: Instant,
        poller: &Poller,
        buffers: &mut Buffers,
        outcome: &mut Outcome,
    ) {
        let Phase::Connected { stream, .. } = &mut self.phase else {
            return;
        };

        let mut rearm = false;
        let mut failure = None;

        if buffers.read.free_space() > 0 {
            if self.flow.read_full {
                self.flow.read_full = false;
                self.stats.read_rearms += 1;
                rearm = true;
            } else if let Err(e) = fill(stream, &mut buffers.read, &mut self.flow, &mut self.stats)
            {
                failure = Some(e);
            }
        }

        if failure.is_none() {
            if buffers.write.is_empty() {
                self.flow.write_full = false;
            } else if !self.flow.write_full {
                if let Err(e) = drain(stream, &mut buffers.write, &mut self.flow, &mut self.stats) {
                    failure = Some(e);
                }
            }
        }

        if failure.is_none() {
            let want_write = self.flow.write_full;
            if rearm || want_write != self.write_interest {
                let interest = if want_write {
                    Interest::READABLE | Interest::WRITABLE
                } else {
                    Interest::READABLE
                };
                match poller.reregister(stream, SOCKET, interest) {
                    Ok(()) => self.write_interest = want_write,
                    Err(e) => failure = Some(e),
                }
            }
        }

        if let Some(e) = failure {
            self.disconnect(now, poller, outcome, e);
        }
    }

    fn establish(&mut self, outcome: &mut Outcome) {
        let Phase::Connecting { stream, addr, .. } =
            std::mem::replace(&mut self.phase, Phase::Resolving)
        else {
            unreachable!("establish called outside of connecting");
        };

        debug!(%addr, "connected");
        self.flow = FlowControl::default();
        self.write_interest = false;
        self.phase = Phase::Connected { stream, peer: addr };
        outcome.connected = true;
    }

    /// Close any in-progress socket and dial candidates until one is
    /// connecting or the list is exhausted.
    fn try_next_candidate(&mut self, now: Instant, poller: &Poller) {
        let mut candidates = match std::mem::replace(&mut self.phase, Phase::Resolving) {
            Phase::Resolved { candidates } => candidates,
            Phase::Connecting {
                mut stream,
                candidates,
                ..
            } => {
                let _ = poller.deregister(&mut stream);
                candidates
            }
            other => {
                self.phase = other;
                return;
            }
        };

        while let Some(addr) = candidates.next() {
            self.stats.connect_attempts += 1;
            match self.open(addr, poller) {
                Ok(stream) => {
                    trace!(%addr, "connecting");
                    self.phase = Phase::Connecting {
                        stream,
                        addr,
                        candidates,
                        deadline: now + self.connect_timeout,
                    };
                    return;
                }
                Err(e) => debug!(%addr, error = %e, "connect attempt failed"),
            }
        }

        debug!(host = %self.host, "all candidates exhausted");
        self.phase = Phase::Disconnected {
            retry_at: now + self.retry_delay,
        };
    }

    fn open(&mut self, addr: SocketAddr, poller: &Poller) -> io::Result<TcpStream> {
        let mut stream = self.dialer.dial(addr)?;
        poller.register(
            &mut stream,
            SOCKET,
            Interest::READABLE | Interest::WRITABLE,
        )?;
        Ok(stream)
    }

    fn fail_resolution(&mut self, now: Instant, outcome: &mut Outcome) {
        outcome.resolve_failed = true;
        self.phase = Phase::Disconnected {
            retry_at: now + self.retry_delay,
        };
    }

    fn disconnect(&mut self, now: Instant, poller: &Poller, outcome: &mut Outcome, e: io::Error) {
        let previous = std::mem::replace(
            &mut self.phase,
            Phase::Disconnected {
                retry_at: now + self.retry_delay,
            },
        );

        if let Phase::Connected { mut stream, peer } = previous {
            debug!(%peer, error = %e, "disconnected");
            let _ = poller.deregister(&mut stream);
            self.stats.disconnects += 1;
            outcome.disconnected = true;
        }

        self.flow = FlowControl::default();
        self.write_interest = false;
    }
}

/// Check that a writable stream really finished connecting.
fn confirm_connected(stream: &TcpStream) -> io::Result<bool> {
    if let Some(e) = stream.take_error()? {
        return Err(e);
    }
    match stream.peer_addr() {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotConnected => Ok(false),
        Err(e) => Err(e),
    }
}

/// Read from the socket into the buffer until it would block or the buffer
/// is full. End of stream is reported as an error.
fn fill(
    stream: &mut TcpStream,
    buf: &mut RingBuffer,
    flow: &mut FlowControl,
    stats: &mut Stats,
) -> io::Result<()> {
    loop {
        let span = buf.contiguous_write_span();
        if span.is_empty() {
            flow.read_full = true;
            return Ok(());
        }

        match stream.read(span) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "connection closed by peer",
                ));
            }
            Ok(n) => {
                buf.reserve(n);
                stats.bytes_read += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                flow.read_full = false;
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
}

/// Write queued bytes to the socket until it would block or the buffer is
/// empty.
fn drain(
    stream: &mut TcpStream,
    buf: &mut RingBuffer,
    flow: &mut FlowControl,
    stats: &mut Stats,
) -> io::Result<()> {
    while !buf.is_empty() {
        match stream.write(buf.contiguous_read_span()) {
            Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
            Ok(n) => {
                buf.consume(n);
                stats.bytes_written += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                flow.write_full = true;
                return Ok(());
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }

    flow.write_full = false;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResolveError;
        use std::net::TcpListener;
    use std::thread;

    const T5S: Duration = Duration::from_secs(5);
    const T30S: Duration = Duration::from_secs(30);

    #[derive(Default)]
    struct StubResolver {
        starts: usize,
        fail: bool,
    }

    impl Resolve for StubResolver {
        fn start(&mut self, _host: &str, _port: u16) -> Result<(), ResolveError> {
            self.starts += 1;
            if self.fail {
                Err(ResolveError::Submit(io::Error::other("no threads")))
            } else {
                Ok(())
            }
        }
    }

    /// Fails every candidate synchronously.
    #[derive(Default)]
    struct RefusingDialer {
        attempts: Vec<SocketAddr>,
    }

    impl Dialer for RefusingDialer {
        fn dial(&mut self, addr: SocketAddr) -> io::Result<TcpStream> {
            self.attempts.push(addr);
            Err(io::ErrorKind::ConnectionRefused.into())
        }
    }

    /// Connects every candidate to a local listener, so the stream is real
    /// but the candidate address is only recorded.
    struct LoopbackDialer {
        listener: TcpListener,
        attempts: Vec<SocketAddr>,
    }

    impl LoopbackDialer {
        fn new() -> Self {
            Self {
                listener: TcpListener::bind("127.0.0.1:0").unwrap(),
                attempts: Vec::new(),
            }
        }
    }

    impl Dialer for LoopbackDialer {
        fn dial(&mut self, addr: SocketAddr) -> io::Result<TcpStream> {
            self.attempts.push(addr);
            let stream = std::net::TcpStream::connect(self.listener.local_addr()?)?;
            stream.set_nonblocking(true)?;
            Ok(TcpStream::from_std(stream))
        }
    }

    fn config() -> Config {
        let mut config = Config::new("irc.example.net", 6667);
        config.retry_delay = T30S;
        config.connect_timeout = T5S;
        config
    }

    fn candidates(n: u8) -> Vec<SocketAddr> {
        (1..=n)
            .map(|i| SocketAddr::from(([192, 0, 2, i], 6667)))
            .collect()
    }

    fn readiness(readable: bool, writable: bool) -> Readiness {
        Readiness {
            token: SOCKET,
            readable,
            writable,
            closed: false,
            error: false,
        }
    }

    #[test]
    fn test_due_retry_starts_resolution() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();

        assert_eq!(conn.state(), State::Disconnected);
        conn.advance(now, &poller, &mut resolver, &mut outcome);

        assert_eq!(conn.state(), State::Resolving);
        assert_eq!(resolver.starts, 1);
        assert!(outcome.is_empty());

        // No duplicate request while resolving
        conn.advance(now + T30S, &poller, &mut resolver, &mut outcome);
        assert_eq!(resolver.starts, 1);
    }

    #[test]
    fn test_retry_waits_for_deadline() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();

        conn.advance(now, &poller, &mut resolver, &mut outcome);
        conn.on_resolved(Ok(candidates(1)), now, &mut outcome);
        conn.advance(now, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Disconnected);
        assert_eq!(conn.next_deadline(), Some(now + T30S));

        conn.advance(
            now + T30S - Duration::from_millis(1),
            &poller,
            &mut resolver,
            &mut outcome,
        );
        assert_eq!(conn.state(), State::Disconnected);

        conn.advance(now + T30S, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Resolving);
        assert_eq!(resolver.starts, 2);
    }

    #[test]
    fn test_submit_failure_reschedules() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut resolver = StubResolver {
            fail: true,
            ..Default::default()
        };
        let mut outcome = Outcome::default();

        conn.advance(now, &poller, &mut resolver, &mut outcome);

        assert_eq!(conn.state(), State::Disconnected);
        assert!(outcome.resolve_failed);
        assert_eq!(conn.next_deadline(), Some(now + T30S));
    }

    #[test]
    fn test_resolution_failure_returns_to_disconnected() {
        let now = Instant::now();
        let poller = Poller::new(8).unwrap();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();

        conn.advance(now, &poller, &mut resolver, &mut outcome);
        let err = ResolveError::Lookup {
            host: "irc.example.net".to_string(),
            port: 6667,
            source: io::Error::other("NXDOMAIN"),
        };
        conn.on_resolved(Err(err), now, &mut outcome);

        assert_eq!(conn.state(), State::Disconnected);
        assert!(outcome.resolve_failed);
        assert!(!outcome.disconnected);
    }

    #[test]
    fn test_empty_resolution_is_a_failure() {
        let now = Instant::now();
        let poller = Poller::new(8).unwrap();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut outcome = Outcome::default();

        conn.advance(now, &poller, &mut StubResolver::default(), &mut outcome);
        conn.on_resolved(Ok(Vec::new()), now, &mut outcome);

        assert_eq!(conn.state(), State::Disconnected);
        assert!(outcome.resolve_failed);
    }

    #[test]
    fn test_stale_resolution_ignored() {
        let now = Instant::now();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut outcome = Outcome::default();

        conn.on_resolved(Ok(candidates(2)), now, &mut outcome);
        assert_eq!(conn.state(), State::Disconnected);
    }

    #[test]
    fn test_candidate_exhaustion() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = Connection::new(&config(), RefusingDialer::default(), now);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();

        conn.advance(now, &poller, &mut resolver, &mut outcome);
        conn.on_resolved(Ok(candidates(3)), now, &mut outcome);
        assert_eq!(conn.state(), State::Resolved);

        conn.advance(now, &poller, &mut resolver, &mut outcome);

        assert_eq!(conn.state(), State::Disconnected);
        assert_eq!(conn.dialer().attempts, candidates(3));
        assert_eq!(conn.stats().connect_attempts, 3);
        assert_eq!(conn.next_deadline(), Some(now + T30S));
        assert!(!outcome.connected);
        assert!(!outcome.disconnected);
    }

    #[test]
    fn test_connect_timeout_advances_candidate() {
        let poller = Poller::new(8).unwrap();
        let t = Instant::now();
        let mut conn = Connection::new(&config(), LoopbackDialer::new(), t);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();

        conn.advance(t, &poller, &mut resolver, &mut outcome);
        conn.on_resolved(Ok(candidates(2)), t, &mut outcome);
        conn.advance(t, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Connecting);
        assert_eq!(conn.connecting_addr(), Some(candidates(2)[0]));

        conn.advance(
            t + T5S - Duration::from_millis(1),
            &poller,
            &mut resolver,
            &mut outcome,
        );
        assert_eq!(conn.connecting_addr(), Some(candidates(2)[0]));
        assert_eq!(conn.stats().connect_attempts, 1);

        conn.advance(t + T5S, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Connecting);
        assert_eq!(conn.connecting_addr(), Some(candidates(2)[1]));
        assert_eq!(conn.stats().connect_attempts, 2);
        assert_eq!(conn.next_deadline(), Some(t + T5S + T5S));

        conn.advance(t + T5S + T5S, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Disconnected);
        assert_eq!(conn.next_deadline(), Some(t + T5S + T5S + T30S));
    }

    #[test]
    fn test_abandoned_attempt_closes_socket() {
        use std::io::Read as _;

        let poller = Poller::new(8).unwrap();
        let t = Instant::now();
        let mut conn = Connection::new(&config(), LoopbackDialer::new(), t);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();

        conn.advance(t, &poller, &mut resolver, &mut outcome);
        conn.on_resolved(Ok(candidates(1)), t, &mut outcome);
        conn.advance(t, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Connecting);

        let (mut server, _) = conn.dialer().listener.accept().unwrap();
        server
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();

        conn.advance(t + T5S, &poller, &mut resolver, &mut outcome);
        assert_eq!(conn.state(), State::Disconnected);
        assert_eq!(conn.stats().connect_attempts, 1);

        // The timed out stream was dropped, so the peer sees end of stream
        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    fn connected(now: Instant, poller: &Poller) -> Connection<LoopbackDialer> {
        let mut conn = Connection::new(&config(), LoopbackDialer::new(), now);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();
        let mut buffers = Buffers::new(16);

        conn.advance(now, poller, &mut resolver, &mut outcome);
        conn.on_resolved(Ok(candidates(1)), now, &mut outcome);
        conn.advance(now, poller, &mut resolver, &mut outcome);
        conn.on_readiness(
            readiness(false, true),
            now,
            poller,
            &mut buffers,
            &mut outcome,
        );

        assert_eq!(conn.state(), State::Connected);
        assert!(outcome.connected);
        conn
    }

    #[test]
    fn test_writable_while_connecting_establishes() {
        let poller = Poller::new(8).unwrap();
        let conn = connected(Instant::now(), &poller);
        assert_eq!(conn.peer_addr(), Some(candidates(1)[0]));
        assert_eq!(conn.flow(), FlowControl::default());
    }

    #[test]
    fn test_error_while_connecting_tries_next() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = Connection::new(&config(), LoopbackDialer::new(), now);
        let mut resolver = StubResolver::default();
        let mut outcome = Outcome::default();
        let mut buffers = Buffers::new(16);

        conn.advance(now, &poller, &mut resolver, &mut outcome);
        conn.on_resolved(Ok(candidates(2)), now, &mut outcome);
        conn.advance(now, &poller, &mut resolver, &mut outcome);

        let mut event = readiness(false, true);
        event.error = true;
        conn.on_readiness(event, now, &poller, &mut buffers, &mut outcome);

        assert_eq!(conn.state(), State::Connecting);
        assert_eq!(conn.connecting_addr(), Some(candidates(2)[1]));
        assert!(!outcome.disconnected);
    }

    #[test]
    fn test_hangup_while_connected_disconnects() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = connected(now, &poller);
        let mut buffers = Buffers::new(16);
        let mut outcome = Outcome::default();

        let mut event = readiness(false, false);
        event.closed = true;
        conn.on_readiness(event, now, &poller, &mut buffers, &mut outcome);

        assert_eq!(conn.state(), State::Disconnected);
        assert!(outcome.disconnected);
        assert_eq!(conn.stats().disconnects, 1);
        assert_eq!(conn.next_deadline(), Some(now + T30S));
    }

    #[test]
    fn test_read_backpressure_rearms_once() {
        use std::io::Write as _;

        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = connected(now, &poller);
        let (mut server, _) = conn.dialer().listener.accept().unwrap();
        let mut buffers = Buffers::new(16);
        let mut outcome = Outcome::default();

        server.write_all(&[7u8; 16]).unwrap();

        for _ in 0..100 {
            conn.on_readiness(
                readiness(true, false),
                now,
                &poller,
                &mut buffers,
                &mut outcome,
            );
            if buffers.read.is_full() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert!(buffers.read.is_full());
        assert!(conn.flow().read_full);
        assert_eq!(conn.state(), State::Connected);

        // Still full: nothing to re-arm
        conn.pump(now, &poller, &mut buffers, &mut outcome);
        assert!(conn.flow().read_full);
        assert_eq!(conn.stats().read_rearms, 0);

        let mut out = [0u8; 16];
        assert_eq!(buffers.read.get(&mut out), 16);

        conn.pump(now, &poller, &mut buffers, &mut outcome);
        assert!(!conn.flow().read_full);
        assert_eq!(conn.stats().read_rearms, 1);

        conn.pump(now, &poller, &mut buffers, &mut outcome);
        assert_eq!(conn.stats().read_rearms, 1);
        assert_eq!(conn.state(), State::Connected);
        assert!(outcome.is_empty());
    }

    #[test]
    fn test_end_of_stream_is_a_disconnect() {
        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = connected(now, &poller);
        let (server, _) = conn.dialer().listener.accept().unwrap();
        let mut buffers = Buffers::new(16);
        let mut outcome = Outcome::default();

        drop(server);

        for _ in 0..100 {
            conn.on_readiness(
                readiness(true, false),
                now,
                &poller,
                &mut buffers,
                &mut outcome,
            );
            if outcome.disconnected {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        assert!(outcome.disconnected);
        assert_eq!(conn.state(), State::Disconnected);
    }

    #[test]
    fn test_pump_writes_queued_bytes() {
        use std::io::Read as _;

        let poller = Poller::new(8).unwrap();
        let now = Instant::now();
        let mut conn = connected(now, &poller);
        let (mut server, _) = conn.dialer().listener.accept().unwrap();
        let mut buffers = Buffers::new(16);
        let mut outcome = Outcome::default();

        buffers.write.put(b"NICK bot\r\n");
        conn.pump(now, &poller, &mut buffers, &mut outcome);

        assert!(buffers.write.is_empty());
        assert!(!conn.flow().write_full);
        assert_eq!(conn.stats().bytes_written, 10);

        let mut out = [0u8; 10];
        server.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"NICK bot\r\n");
    }
}
