//! Per-connection IRC session.
//!
//! Turns the bytes the engine leaves in the read buffer into messages,
//! runs the registered handlers and queues their replies into the write
//! buffer.

use crate::config::{ChannelConfig, Config, IdentityConfig};
use crate::dispatch::Dispatcher;
use bytes::{Buf, BytesMut};
use io_engine::{Buffers, RingBuffer};
use protocol_irc::{Command, MAX_LINE_LEN, Message, ParseError};
use tracing::{debug, info, warn};

/// Unterminated input beyond this is dropped up to the next line break.
pub const MAX_PENDING: usize = 8 * MAX_LINE_LEN;

/// State shared with handlers.
pub struct Context {
    identity: IdentityConfig,
    channels: Vec<ChannelConfig>,
    /// Registration attempts on this connection, used to pick the nick
    attempt: usize,
    outbox: Vec<Command>,
}

impl Context {
    fn new(identity: IdentityConfig, channels: Vec<ChannelConfig>) -> Self {
        Self {
            identity,
            channels,
            attempt: 0,
            outbox: Vec::new(),
        }
    }

    /// Queue a command to be written after the current batch of messages.
    pub fn send(&mut self, command: Command) {
        self.outbox.push(command);
    }

    /// The nickname currently being registered.
    ///
    /// Walks the configured list in order, then starts over with an extra
    /// `_` appended for every full pass.
    pub fn nick(&self) -> String {
        let nicks = &self.identity.nicks;
        if nicks.is_empty() {
            return String::new();
        }
        let mut nick = nicks[self.attempt % nicks.len()].clone();
        for _ in 0..self.attempt / nicks.len() {
            nick.push('_');
        }
        nick
    }

    /// Move on to the next nickname.
    pub fn next_nick(&mut self) -> String {
        self.attempt += 1;
        self.nick()
    }

    pub fn channels(&self) -> &[ChannelConfig] {
        &self.channels
    }

    fn reset(&mut self) {
        self.attempt = 0;
        self.outbox.clear();
    }
}

pub struct Session {
    ctx: Context,
    dispatcher: Dispatcher<Context>,
    pending: BytesMut,
    /// Dropping input until the end of an oversize line
    discarding: bool,
    scratch: Vec<u8>,
}

impl Session {
    /// Create a session with the default handlers registered.
    pub fn new(config: &Config) -> Self {
        let mut session = Self {
            ctx: Context::new(config.identity.clone(), config.channels.clone()),
            dispatcher: Dispatcher::new(),
            pending: BytesMut::with_capacity(MAX_LINE_LEN),
            discarding: false,
            scratch: Vec::with_capacity(MAX_LINE_LEN),
        };

        session.register("PING", on_ping);
        session.register("004", on_registered);
        session.register("433", on_nick_in_use);
        session.register("ERROR", on_error);
        session
    }

    /// Add a handler, run after those already registered for `command`.
    pub fn register<F>(&mut self, command: &str, handler: F)
    where
        F: FnMut(&mut Context, &Message<'_>) + 'static,
    {
        self.dispatcher.register(command, handler);
    }

    pub fn context(&self) -> &Context {
        &self.ctx
    }

    /// Start registration on a fresh connection.
    pub fn on_connected(&mut self, write: &mut RingBuffer) {
        let nick = self.ctx.nick();
        self.ctx.send(Command::Nick(nick));
        self.ctx.send(Command::User {
            login: self.ctx.identity.login.clone(),
            realname: self.ctx.identity.name.clone(),
        });
        self.flush(write);
    }

    /// Forget everything tied to the lost connection.
    pub fn on_disconnected(&mut self) {
        self.ctx.reset();
        self.pending.clear();
        self.discarding = false;
    }

    /// Queue `QUIT` with an optional reason.
    pub fn quit(&mut self, reason: Option<&str>, write: &mut RingBuffer) {
        self.ctx.send(Command::Quit {
            reason: reason.map(str::to_string),
        });
        self.flush(write);
    }

    /// Consume the read buffer, dispatch every complete line and queue
    /// replies. Returns the number of messages dispatched.
    pub fn process(&mut self, buffers: &mut Buffers) -> usize {
        let mut dispatched = 0;

        while !buffers.read.is_empty() {
            let n = {
                let span = buffers.read.contiguous_read_span();
                self.pending.extend_from_slice(span);
                span.len()
            };
            buffers.read.consume(n);
            dispatched += self.parse_pending();
        }

        self.flush(&mut buffers.write);
        dispatched
    }

    fn parse_pending(&mut self) -> usize {
        let mut dispatched = 0;

        loop {
            if self.discarding {
                match self.pending.iter().position(|&b| b == b'\n') {
                    Some(end) => {
                        self.pending.advance(end + 1);
                        self.discarding = false;
                    }
                    None => {
                        self.pending.clear();
                        return dispatched;
                    }
                }
            }

            match Message::parse(&self.pending) {
                Ok((msg, consumed)) => {
                    debug!(command = msg.command, "received");
                    self.dispatcher.dispatch(&mut self.ctx, &msg);
                    self.pending.advance(consumed);
                    dispatched += 1;
                }
                Err(ParseError::Incomplete) => {
                    if self.pending.len() > MAX_PENDING {
                        warn!(len = self.pending.len(), "discarding oversize line");
                        self.pending.clear();
                        self.discarding = true;
                    }
                    return dispatched;
                }
                Err(ParseError::Invalid) => {
                    // Parse only reports Invalid for a terminated line
                    let end = self
                        .pending
                        .iter()
                        .position(|&b| b == b'\n')
                        .unwrap_or(self.pending.len() - 1);
                    debug!(line = ?String::from_utf8_lossy(&self.pending[..end]), "ignoring malformed line");
                    self.pending.advance(end + 1);
                }
            }
        }
    }

    /// Write queued commands. A line that does not fit is dropped whole.
    fn flush(&mut self, write: &mut RingBuffer) {
        for command in self.ctx.outbox.drain(..) {
            self.scratch.clear();
            command.encode(&mut self.scratch);

            if self.scratch.len() > write.free_space() {
                warn!(
                    len = self.scratch.len(),
                    free = write.free_space(),
                    "write buffer full, dropping outbound line"
                );
                continue;
            }
            write.put(&self.scratch);
        }
    }
}

fn on_ping(ctx: &mut Context, msg: &Message<'_>) {
    ctx.send(Command::Pong {
        params: msg.params.to_vec(),
    });
}

fn on_registered(ctx: &mut Context, _msg: &Message<'_>) {
    info!(nick = %ctx.nick(), "registered");
    let joins: Vec<Command> = ctx
        .channels()
        .iter()
        .map(|c| Command::Join {
            channel: c.name.clone(),
            key: c.key.clone(),
        })
        .collect();
    for join in joins {
        ctx.send(join);
    }
}

fn on_nick_in_use(ctx: &mut Context, _msg: &Message<'_>) {
    let taken = ctx.nick();
    let nick = ctx.next_nick();
    warn!(%taken, %nick, "nickname in use, retrying");
    ctx.send(Command::Nick(nick));
}

fn on_error(_ctx: &mut Context, msg: &Message<'_>) {
    let reason = msg.trailing().unwrap_or(msg.params);
    warn!(reason = %String::from_utf8_lossy(reason), "server closed the link");
}
