//! Command dispatch.
//!
//! Handlers are keyed by the command word exactly as received, so numerics
//! like `004` are registered by their digits. Several handlers may share a
//! command and run in registration order.

use ahash::AHashMap;
use protocol_irc::Message;

/// Callback invoked with the shared context and the parsed message.
pub type Handler<C> = Box<dyn FnMut(&mut C, &Message<'_>)>;

pub struct Dispatcher<C> {
    handlers: AHashMap<String, Vec<Handler<C>>>,
}

impl<C> Default for Dispatcher<C> {
    fn default() -> Self {
        Self {
            handlers: AHashMap::new(),
        }
    }
}

impl<C> Dispatcher<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler for `command`, after any already registered for it.
    pub fn register<F>(&mut self, command: &str, handler: F)
    where
        F: FnMut(&mut C, &Message<'_>) + 'static,
    {
        self.handlers
            .entry(command.to_string())
            .or_default()
            .push(Box::new(handler));
    }

    /// Run every handler registered for the message's command.
    ///
    /// Returns how many handlers ran; unknown commands run none.
    pub fn dispatch(&mut self, ctx: &mut C, msg: &Message<'_>) -> usize {
        let Some(handlers) = self.handlers.get_mut(msg.command) else {
            return 0;
        };
        for handler in handlers.iter_mut() {
            handler(ctx, msg);
        }
        handlers.len()
    }

    #[cfg(test)]
    fn handles(&self, command: &str) -> bool {
        self.handlers.contains_key(command)
    }
}
