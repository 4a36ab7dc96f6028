//! HTTP upgrade handshake.
//!
//! A WebSocket connection starts life as an HTTP/1.1 GET carrying a random
//! base64 key; the server proves it speaks WebSocket by echoing back a
//! deterministic derivation of that key (SHA-1 over key + a fixed GUID,
//! base64-encoded) in `Sec-WebSocket-Accept`
//! ([RFC 6455 Section 4](https://datatracker.ietf.org/doc/html/rfc6455#section-4)).
//!
//! This module is sans-io: [`ClientHandshake`] and [`ServerHandshake`] are
//! transient records that parse from and serialize to a head buffer (everything
//! up to the blank line). Reading the head off a transport and acting on a
//! validation failure belong to the connection endpoint — in particular, a
//! client that sees an accept value that is not the derivation of the key it
//! sent must tear the connection down rather than proceed.

use base64::prelude::*;
use bytes::Bytes;
use sha1::{Digest, Sha1};

use crate::{Result, WebSocketError};

/// GUID appended to the client key before hashing, fixed by RFC 6455.
const ACCEPT_GUID: &[u8] = b"258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Generates a fresh Sec-WebSocket-Key: 16 random bytes, base64-encoded.
pub fn generate_key() -> String {
    let input: [u8; 16] = rand::random();
    BASE64_STANDARD.encode(input)
}

/// Derives the Sec-WebSocket-Accept value for `key`.
///
/// Purely mechanical: any key derives *some* accept value, including one a
/// client never sent. Whether the derivation matches what the client expects is
/// checked on receipt by [`ServerHandshake::validate`].
pub fn derive_accept_key(key: &str) -> String {
    let mut sha1 = Sha1::new();
    sha1.update(key.as_bytes());
    sha1.update(ACCEPT_GUID);
    BASE64_STANDARD.encode(sha1.finalize())
}

/// Splits a head buffer into its first line and the header lines after it.
fn head_lines(head: &[u8]) -> Option<(&str, std::str::Lines<'_>)> {
    let text = std::str::from_utf8(head).ok()?;
    let mut lines = text.lines();
    let first = lines.next()?;
    Some((first, lines))
}

/// Looks up a header by case-insensitive name among `lines`, returning its
/// trimmed value.
fn find_header<'a>(lines: std::str::Lines<'a>, name: &str) -> Option<&'a str> {
    for line in lines {
        if let Some((header, value)) = line.split_once(':') {
            if header.trim().eq_ignore_ascii_case(name) {
                return Some(value.trim());
            }
        }
    }
    None
}

/// Returns whether a comma-separated header value contains `token`,
/// case-insensitively. "Connection: keep-alive, Upgrade" must match "upgrade".
fn contains_token(value: &str, token: &str) -> bool {
    value
        .split(',')
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// The client's opening request: request line plus the upgrade headers,
/// crucially the random key the server must answer to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientHandshake {
    /// Value for the Host header.
    pub host: String,
    /// Request target, e.g. "/" or "/echo".
    pub resource: String,
    /// The Sec-WebSocket-Key value.
    pub key: String,
}

impl ClientHandshake {
    /// Builds an opening request for `host` and `resource` with a fresh key.
    pub fn new(host: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            resource: resource.into(),
            key: generate_key(),
        }
    }

    /// Serializes the request head, terminated by the blank line.
    pub fn to_bytes(&self) -> Bytes {
        format!(
            "GET {} HTTP/1.1\r\n\
             Host: {}\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Key: {}\r\n\
             Sec-WebSocket-Version: 13\r\n\
             \r\n",
            self.resource, self.host, self.key
        )
        .into()
    }

    /// Parses and validates a client opening request head.
    ///
    /// This is the server-side gate: it checks the request line shape and the
    /// presence and values of the upgrade headers. Failure is reported to the
    /// caller, which decides whether to answer with an error response or drop
    /// the transport.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let (request_line, lines) =
            head_lines(head).ok_or(WebSocketError::InvalidRequestLine)?;

        let mut parts = request_line.split_whitespace();
        let (method, resource, version) = (parts.next(), parts.next(), parts.next());
        if method != Some("GET") || version != Some("HTTP/1.1") || parts.next().is_some() {
            return Err(WebSocketError::InvalidRequestLine);
        }
        let resource = resource.ok_or(WebSocketError::InvalidRequestLine)?;

        let upgrade = find_header(lines.clone(), "Upgrade")
            .ok_or(WebSocketError::InvalidUpgradeHeader)?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(WebSocketError::InvalidUpgradeHeader);
        }

        let connection = find_header(lines.clone(), "Connection")
            .ok_or(WebSocketError::InvalidConnectionHeader)?;
        if !contains_token(connection, "upgrade") {
            return Err(WebSocketError::InvalidConnectionHeader);
        }

        if find_header(lines.clone(), "Sec-WebSocket-Version") != Some("13") {
            return Err(WebSocketError::InvalidSecWebsocketVersion);
        }

        let key = find_header(lines.clone(), "Sec-WebSocket-Key")
            .ok_or(WebSocketError::MissingSecWebSocketKey)?;

        let host = find_header(lines, "Host").unwrap_or_default();

        Ok(Self {
            host: host.to_owned(),
            resource: resource.to_owned(),
            key: key.to_owned(),
        })
    }
}

/// The server's answer: a 101 response whose accept value is derived from the
/// client's key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerHandshake {
    /// The Sec-WebSocket-Accept value.
    pub accept: String,
}

impl ServerHandshake {
    /// Builds the response for `key`.
    ///
    /// The derivation is applied to whatever key is supplied; feeding it a key
    /// the client never sent produces a structurally well-formed response that
    /// the client's [`ServerHandshake::validate`] will reject.
    pub fn for_key(key: &str) -> Self {
        Self {
            accept: derive_accept_key(key),
        }
    }

    /// Serializes the response head, terminated by the blank line.
    pub fn to_bytes(&self) -> Bytes {
        format!(
            "HTTP/1.1 101 Switching Protocols\r\n\
             Upgrade: websocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: {}\r\n\
             \r\n",
            self.accept
        )
        .into()
    }

    /// Parses a server response head.
    ///
    /// Checks the status line (must be 101), the Upgrade and Connection
    /// headers, and the presence of Sec-WebSocket-Accept. Whether the accept
    /// value is *correct* is a separate question answered by
    /// [`ServerHandshake::validate`], since only the client knows the key it
    /// sent.
    pub fn parse(head: &[u8]) -> Result<Self> {
        let (status_line, lines) = head_lines(head).ok_or(WebSocketError::InvalidStatusLine)?;

        let mut parts = status_line.splitn(3, ' ');
        if parts.next() != Some("HTTP/1.1") {
            return Err(WebSocketError::InvalidStatusLine);
        }
        let code: u16 = parts
            .next()
            .and_then(|code| code.parse().ok())
            .ok_or(WebSocketError::InvalidStatusLine)?;
        if code != 101 {
            return Err(WebSocketError::InvalidStatusCode(code));
        }

        let upgrade = find_header(lines.clone(), "Upgrade")
            .ok_or(WebSocketError::InvalidUpgradeHeader)?;
        if !upgrade.eq_ignore_ascii_case("websocket") {
            return Err(WebSocketError::InvalidUpgradeHeader);
        }

        let connection = find_header(lines.clone(), "Connection")
            .ok_or(WebSocketError::InvalidConnectionHeader)?;
        if !contains_token(connection, "upgrade") {
            return Err(WebSocketError::InvalidConnectionHeader);
        }

        let accept = find_header(lines, "Sec-WebSocket-Accept")
            .ok_or(WebSocketError::SecWebSocketAcceptMismatch)?;

        Ok(Self {
            accept: accept.to_owned(),
        })
    }

    /// Checks the accept value against the key this side actually sent.
    ///
    /// This is the client's half of the key exchange. A mismatch means the
    /// peer is not answering our handshake, and the connection endpoint
    /// escalates it to a disconnect.
    pub fn validate(&self, sent_key: &str) -> Result<()> {
        if self.accept != derive_accept_key(sent_key) {
            return Err(WebSocketError::SecWebSocketAcceptMismatch);
        }
        Ok(())
    }
}
