//! IRC line protocol.
//!
//! Inbound lines have the shape
//! `[':' prefix ' '] command [' ' params] ('\r\n' | '\n')` and are parsed
//! without copying: a [`Message`] borrows from the input. Outbound lines are
//! built from a [`Command`] and appended to a byte vector.
//!
//! # Example
//!
//! ```
//! use protocol_irc::{Command, Message};
//!
//! let (msg, consumed) = Message::parse(b"PING :irc.example.net\r\n").unwrap();
//! assert_eq!(msg.command, "PING");
//! assert_eq!(consumed, 23);
//!
//! let mut out = Vec::new();
//! Command::Pong { params: msg.params.to_vec() }.encode(&mut out);
//! assert_eq!(out, b"PONG :irc.example.net\r\n");
//! ```

/// Maximum length of one line including the terminator (RFC 1459).
pub const MAX_LINE_LEN: usize = 512;

/// Parse error types.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    /// No line terminator yet.
    #[error("incomplete")]
    Incomplete,
    /// The line carries no usable command.
    #[error("invalid message")]
    Invalid,
}

/// One inbound line, borrowed from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Message<'a> {
    /// Origin of the message, without the leading `:`.
    pub prefix: Option<&'a [u8]>,
    /// Command word or three digit numeric, exactly as received.
    pub command: &'a str,
    /// Everything after the separator following the command.
    pub params: &'a [u8],
}

impl<'a> Message<'a> {
    /// Parse one line from the front of `data`.
    ///
    /// Returns the message and the number of bytes consumed, terminator
    /// included. On [`ParseError::Invalid`] the caller should skip past the
    /// next `'\n'`.
    pub fn parse(data: &'a [u8]) -> Result<(Self, usize), ParseError> {
        let end = data
            .iter()
            .position(|&b| b == b'\n')
            .ok_or(ParseError::Incomplete)?;
        let consumed = end + 1;

        let mut line = &data[..end];
        if let Some((&b'\r', rest)) = line.split_last() {
            line = rest;
        }

        let mut prefix = None;
        if let Some(rest) = line.strip_prefix(b":") {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or(ParseError::Invalid)?;
            prefix = Some(&rest[..space]);
            line = &rest[space..];
        }

        let start = line
            .iter()
            .position(|&b| b != b' ')
            .ok_or(ParseError::Invalid)?;
        line = &line[start..];

        let (command, params) = match line.iter().position(|&b| b == b' ') {
            Some(space) => (&line[..space], &line[space + 1..]),
            None => (line, &line[line.len()..]),
        };

        if !command.iter().all(u8::is_ascii_alphanumeric) {
            return Err(ParseError::Invalid);
        }
        // All ASCII, so this cannot fail
        let command = std::str::from_utf8(command).map_err(|_| ParseError::Invalid)?;

        Ok((
            Message {
                prefix,
                command,
                params,
            },
            consumed,
        ))
    }

    /// The final parameter introduced by `:`, if any.
    pub fn trailing(&self) -> Option<&'a [u8]> {
        if let Some(rest) = self.params.strip_prefix(b":") {
            return Some(rest);
        }
        self.params
            .windows(2)
            .position(|w| w == b" :")
            .map(|i| &self.params[i + 2..])
    }

    /// The first parameter, whether middle or trailing.
    pub fn first_param(&self) -> Option<&'a [u8]> {
        let params = self.params.trim_ascii_start();
        if params.is_empty() {
            return None;
        }
        if let Some(rest) = params.strip_prefix(b":") {
            return Some(rest);
        }
        let end = params.iter().position(|&b| b == b' ').unwrap_or(params.len());
        Some(&params[..end])
    }

    /// Whether the command is a three digit numeric reply.
    pub fn is_numeric(&self) -> bool {
        self.command.len() == 3 && self.command.bytes().all(|b| b.is_ascii_digit())
    }
}

/// An outbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Nick(String),
    User { login: String, realname: String },
    Join { channel: String, key: Option<String> },
    /// Reply to a `PING`, echoing its parameters verbatim.
    Pong { params: Vec<u8> },
    Quit { reason: Option<String> },
}

impl Command {
    /// Append the CRLF terminated line to `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Command::Nick(nick) => {
                buf.extend_from_slice(b"NICK ");
                buf.extend_from_slice(nick.as_bytes());
            }
            Command::User { login, realname } => {
                buf.extend_from_slice(b"USER ");
                buf.extend_from_slice(login.as_bytes());
                buf.extend_from_slice(b" 8 * :");
                buf.extend_from_slice(realname.as_bytes());
            }
            Command::Join { channel, key } => {
                buf.extend_from_slice(b"JOIN ");
                buf.extend_from_slice(channel.as_bytes());
                if let Some(key) = key {
                    buf.push(b' ');
                    buf.extend_from_slice(key.as_bytes());
                }
            }
            Command::Pong { params } => {
                buf.extend_from_slice(b"PONG");
                if !params.is_empty() {
                    buf.push(b' ');
                    buf.extend_from_slice(params);
                }
            }
            Command::Quit { reason } => {
                buf.extend_from_slice(b"QUIT");
                if let Some(reason) = reason {
                    buf.extend_from_slice(b" :");
                    buf.extend_from_slice(reason.as_bytes());
                }
            }
        }
        buf.extend_from_slice(b"\r\n");
    }

    /// The encoded line as a fresh vector.
    #[cfg(test)]
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf
    }
}
