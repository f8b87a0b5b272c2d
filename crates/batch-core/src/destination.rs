//! Destination parsing: `queue[@server[:port]]` or `@server[:port]`.

use crate::{ParseError, QueueName, ServerName, MAX_QUEUE_NAME, MAX_SERVER_NAME};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A parsed destination.
///
/// Either half may be empty. An empty or all-whitespace input parses to an
/// empty destination; callers that need a target must check [`Destination::is_empty`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Destination {
    pub queue: QueueName,
    pub server: ServerName,
}

impl Destination {
    pub fn queue(&self) -> &str {
        self.queue.as_str()
    }

    pub fn server(&self) -> Option<&str> {
        if self.server.is_empty() {
            None
        } else {
            Some(self.server.as_str())
        }
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty() && self.server.is_empty()
    }

    /// Host part of the server name, without any `:port` suffix
    pub fn host(&self) -> Option<&str> {
        self.server()
            .map(|server| server.rsplit_once(':').map_or(server, |(host, _)| host))
    }

    /// Port suffix of the server name, if one is present.
    ///
    /// The port is not split off during parsing; `:` is an ordinary name
    /// character there, so `host:15001` is carried verbatim as the server name.
    pub fn port(&self) -> Result<Option<u16>, ParseError> {
        let Some((_, port)) = self.server().and_then(|s| s.rsplit_once(':')) else {
            return Ok(None);
        };
        port.parse::<u16>()
            .map(Some)
            .map_err(|_| ParseError::BadPort(port.to_string()))
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.queue)?;
        if !self.server.is_empty() {
            write!(f, "@{}", self.server)?;
        }
        Ok(())
    }
}

/// Printable, not blank, and neither `#` nor `@`
fn is_name_char(c: u8) -> bool {
    c.is_ascii_graphic() && c != b'#' && c != b'@'
}

/// Whitespace as the C locale defines it, vertical tab included
fn is_space(c: u8) -> bool {
    matches!(c, b' ' | b'\t' | b'\n' | 0x0b | 0x0c | b'\r')
}

/// End offset of the name run starting at `start`
fn scan_name(bytes: &[u8], start: usize, max: usize) -> Result<usize, ParseError> {
    let mut end = start;
    while end < bytes.len() && is_name_char(bytes[end]) {
        if end - start >= max {
            return Err(ParseError::NameTooLong { max });
        }
        end += 1;
    }
    Ok(end)
}

/// Parse a destination into its queue and server names.
///
/// Pure and stateless. Nothing is returned on failure.
pub fn parse_destination(input: &str) -> Result<Destination, ParseError> {
    let bytes = input.as_bytes();
    let mut pos = bytes.iter().take_while(|c| is_space(**c)).count();

    let queue_end = scan_name(bytes, pos, MAX_QUEUE_NAME)?;
    let queue = &input[pos..queue_end];
    pos = queue_end;

    let mut server = "";
    if bytes.get(pos) == Some(&b'@') {
        pos += 1;
        let server_end = scan_name(bytes, pos, MAX_SERVER_NAME)?;
        if server_end == pos {
            return Err(ParseError::EmptyServerName);
        }
        server = &input[pos..server_end];
        pos = server_end;
    }

    if pos != bytes.len() {
        return Err(ParseError::TrailingGarbage { position: pos });
    }

    Ok(Destination {
        queue: QueueName::new(queue).map_err(|e| ParseError::NameTooLong { max: e.max })?,
        server: ServerName::new(server).map_err(|e| ParseError::NameTooLong { max: e.max })?,
    })
}
