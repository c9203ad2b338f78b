//! Asynchronous name resolution delivered through the completion channel.
//!
//! Each request runs `getaddrinfo` on a short-lived worker thread. The
//! result is handed back over a channel and the shared [`Waker`] is fired,
//! so resolution completes inside the same multiplexer wait as socket
//! readiness. Only one request may be outstanding.

use crate::error::ResolveError;
use crossbeam_channel::{Receiver, Sender};
use mio::Waker;
use std::net::{SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::thread;

/// Result of one resolution request: the ordered candidate addresses.
pub type Resolution = Result<Vec<SocketAddr>, ResolveError>;

/// Something that can accept one outstanding resolution request.
///
/// Completion is delivered out of band; see [`AddressResolver::complete`].
pub trait Resolve {
    /// Submit a request. Fails only if it cannot be submitted.
    fn start(&mut self, host: &str, port: u16) -> Result<(), ResolveError>;
}

/// Resolver backed by a worker thread per request.
pub struct AddressResolver {
    waker: Arc<Waker>,
    tx: Sender<Resolution>,
    rx: Receiver<Resolution>,
    in_flight: bool,
}

impl AddressResolver {
    /// Create a resolver that signals completion through `waker`.
    pub fn new(waker: Arc<Waker>) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(1);
        Self {
            waker,
            tx,
            rx,
            in_flight: false,
        }
    }

    /// Whether a request has been submitted and not yet collected.
    #[cfg(test)]
    fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Collect the result of the outstanding request, if it has arrived.
    pub fn complete(&mut self) -> Option<Resolution> {
        let result = self.rx.try_recv().ok()?;
        self.in_flight = false;
        Some(result)
    }
}

impl Resolve for AddressResolver {
    fn start(&mut self, host: &str, port: u16) -> Result<(), ResolveError> {
        if self.in_flight {
            return Err(ResolveError::InFlight);
        }

        let host = host.to_owned();
        let tx = self.tx.clone();
        let waker = self.waker.clone();

        thread::Builder::new()
            .name("resolver".to_string())
            .spawn(move || {
                let result = lookup(host, port);
                // The engine may already be gone; nothing left to notify then
                if tx.send(result).is_ok() {
                    let _ = waker.wake();
                }
            })
            .map_err(ResolveError::Submit)?;

        self.in_flight = true;
        Ok(())
    }
}

fn lookup(host: String, port: u16) -> Resolution {
    let addrs = (host.as_str(), port).to_socket_addrs();
    match addrs {
        Ok(addrs) => {
            let addrs: Vec<SocketAddr> = addrs.collect();
            if addrs.is_empty() {
                Err(ResolveError::NoAddresses { host, port })
            } else {
                Ok(addrs)
            }
        }
        Err(source) => Err(ResolveError::Lookup { host, port, source }),
    }
}
