use std::io;

/// Errors returned by the engine.
///
/// Only [`Error::Wait`] can come out of [`Engine::poll`](crate::Engine::poll).
/// Everything that goes wrong with an individual connection is folded back
/// into the state machine and reported through the
/// [`Outcome`](crate::Outcome) instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The readiness multiplexer could not be created.
    #[error("failed to create poller: {0}")]
    Poller(#[source] io::Error),
    /// A completion channel (resolver or interrupt) could not be claimed.
    #[error("failed to claim completion channel: {0}")]
    CompletionChannel(#[source] io::Error),
    /// Waiting on the multiplexer failed with a non-retryable error.
    #[error("poll failed: {0}")]
    Wait(#[source] io::Error),
}

/// Errors from the address resolver.
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    /// A request is already outstanding.
    #[error("resolution already in flight")]
    InFlight,
    /// The worker that performs the lookup could not be started.
    #[error("failed to submit resolution: {0}")]
    Submit(#[source] io::Error),
    /// The lookup itself failed.
    #[error("lookup of {host}:{port} failed: {source}")]
    Lookup {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// The lookup succeeded but produced no addresses.
    #[error("lookup of {host}:{port} returned no addresses")]
    NoAddresses { host: String, port: u16 },
}
