//! Connection endpoint.
//!
//! [`Connection`] is the thin orchestration layer over an `AsyncRead +
//! AsyncWrite` transport: it runs the handshake once, then exchanges frames
//! through a `Framed` stream built on [`FrameCodec`]. All protocol logic lives
//! in the pure modules; this file only moves bytes and tracks the per-connection
//! state machine:
//!
//! ```text
//! Idle --connect()/accept()--> Framing --close frame / EOF / error--> Disconnected
//!        \--handshake failure-------------------------------------/
//! ```
//!
//! A failed handshake is not a recoverable condition. The client endpoint shuts
//! the transport down and parks itself in `Disconnected`, where every operation
//! fails with [`WebSocketError::ConnectionClosed`]; the peer observes the
//! teardown as EOF on its next read.

use bytes::BytesMut;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, FramedParts};
use url::Url;

use crate::codec::FrameCodec;
use crate::frame::{Frame, OpCode};
use crate::handshake::{ClientHandshake, ServerHandshake};
use crate::{Result, WebSocketError};

/// Cap on the size of a handshake head read off the transport.
const MAX_HANDSHAKE_HEAD: usize = 8 * 1024;

/// Which side of the connection this endpoint plays.
///
/// The role decides the masking rule: client-originated frames are masked,
/// server-originated frames are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Per-connection lifecycle. `Framing` is the terminal good state, reached only
/// through a validated handshake; `Disconnected` is the terminal bad one.
#[derive(Debug)]
enum ConnectionState<S> {
    /// Transport attached, handshake not yet run.
    Idle(S),
    /// Handshake validated; frame exchange in progress.
    Framing(Framed<S, FrameCodec>),
    /// Transport gone. Every operation fails with `ConnectionClosed`.
    Disconnected,
}

/// A WebSocket connection endpoint over an arbitrary byte stream.
///
/// Construct with [`Connection::client`] or [`Connection::server`], run the
/// handshake with [`Connection::connect`] or [`Connection::accept`], then
/// exchange payloads with [`Connection::send`] and [`Connection::recv`]. Each
/// connection owns its state independently; no process-wide state is touched,
/// so connections can live on separate tasks without synchronization.
#[derive(Debug)]
pub struct Connection<S> {
    role: Role,
    state: ConnectionState<S>,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already-connected transport as the client side.
    pub fn client(io: S) -> Self {
        Self {
            role: Role::Client,
            state: ConnectionState::Idle(io),
        }
    }

    /// Wraps an accepted transport as the server side.
    pub fn server(io: S) -> Self {
        Self {
            role: Role::Server,
            state: ConnectionState::Idle(io),
        }
    }

    /// Returns this endpoint's role.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns whether the connection is past its handshake and able to
    /// exchange frames.
    pub fn is_connected(&self) -> bool {
        matches!(self.state, ConnectionState::Framing(_))
    }

    /// Runs the client side of the handshake.
    ///
    /// Sends the opening request, reads the server's response head, and
    /// validates the accept value against the key that was sent. Any failure —
    /// unreadable response, wrong status, an accept value that is not the
    /// derivation of our key — shuts the transport down and leaves the
    /// connection in its disconnected state before the error is returned, so a
    /// misbehaving server can never be talked to past its handshake.
    pub async fn connect(&mut self, host: &str, resource: &str) -> Result<()> {
        debug_assert_eq!(self.role, Role::Client);
        let mut io = match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Idle(io) => io,
            other => {
                self.state = other;
                return Err(WebSocketError::ConnectionClosed);
            }
        };

        let request = ClientHandshake::new(host, resource);
        match client_handshake(&mut io, &request).await {
            Ok(leftover) => {
                #[cfg(feature = "logging")]
                log::debug!("client handshake validated for {host}{resource}");
                self.state = ConnectionState::Framing(framed(io, leftover));
                Ok(())
            }
            Err(err) => {
                #[cfg(feature = "logging")]
                log::debug!("client handshake failed, disconnecting: {err}");
                let _ = io.shutdown().await;
                Err(err)
            }
        }
    }

    /// Runs the server side of the handshake.
    ///
    /// Reads and validates the client's opening request, then answers with the
    /// accept value derived from the client's key. A malformed request shuts
    /// the transport down and disconnects.
    pub async fn accept(&mut self) -> Result<()> {
        debug_assert_eq!(self.role, Role::Server);
        let mut io = match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Idle(io) => io,
            other => {
                self.state = other;
                return Err(WebSocketError::ConnectionClosed);
            }
        };

        match server_handshake(&mut io).await {
            Ok(leftover) => {
                #[cfg(feature = "logging")]
                log::debug!("server handshake complete");
                self.state = ConnectionState::Framing(framed(io, leftover));
                Ok(())
            }
            Err(err) => {
                #[cfg(feature = "logging")]
                log::debug!("rejecting client handshake: {err}");
                let _ = io.shutdown().await;
                Err(err)
            }
        }
    }

    /// Sends one payload as a single final data frame, masked per role.
    ///
    /// Goes through the validated encoder path, so a frame that fails
    /// validation never reaches the transport.
    pub async fn send(&mut self, payload: impl Into<BytesMut>) -> Result<()> {
        let from_client = self.role == Role::Client;
        let ConnectionState::Framing(stream) = &mut self.state else {
            return Err(WebSocketError::ConnectionClosed);
        };

        let frame = Frame::outgoing(payload, from_client);
        if let Err(err) = stream.send(frame).await {
            self.teardown().await;
            return Err(err);
        }
        Ok(())
    }

    /// Receives the next data payload.
    ///
    /// Control frames are handled inline: pings are answered with pongs, pongs
    /// are dropped, and a close frame (like transport EOF or any codec error)
    /// tears the connection down and surfaces as
    /// [`WebSocketError::ConnectionClosed`].
    pub async fn recv(&mut self) -> Result<BytesMut> {
        loop {
            let from_client = self.role == Role::Client;
            let ConnectionState::Framing(stream) = &mut self.state else {
                return Err(WebSocketError::ConnectionClosed);
            };

            let frame = match stream.next().await {
                None => {
                    self.teardown().await;
                    return Err(WebSocketError::ConnectionClosed);
                }
                Some(Err(err)) => {
                    self.teardown().await;
                    return Err(err);
                }
                Some(Ok(frame)) => frame,
            };

            match frame.opcode {
                OpCode::Close => {
                    let _ = stream.send(Frame::close(from_client)).await;
                    self.teardown().await;
                    return Err(WebSocketError::ConnectionClosed);
                }
                OpCode::Ping => {
                    let pong = Frame::pong(frame.payload, from_client);
                    if let Err(err) = stream.send(pong).await {
                        self.teardown().await;
                        return Err(err);
                    }
                }
                OpCode::Pong => {}
                OpCode::Continuation | OpCode::Text | OpCode::Binary => {
                    return Ok(frame.payload);
                }
            }
        }
    }

    /// Sends a close frame and tears the connection down.
    ///
    /// Idempotent: closing an already-disconnected connection is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        let from_client = self.role == Role::Client;
        if let ConnectionState::Framing(stream) = &mut self.state {
            let _ = stream.send(Frame::close(from_client)).await;
        }
        self.teardown().await;
        Ok(())
    }

    /// Drops into the terminal disconnected state, shutting the transport down
    /// so the peer observes EOF.
    async fn teardown(&mut self) {
        match std::mem::replace(&mut self.state, ConnectionState::Disconnected) {
            ConnectionState::Idle(mut io) => {
                let _ = io.shutdown().await;
            }
            ConnectionState::Framing(stream) => {
                let mut io = stream.into_inner();
                let _ = io.shutdown().await;
            }
            ConnectionState::Disconnected => {}
        }
    }
}

/// Dials a `ws://` URL over TCP and runs the client handshake.
///
/// Only the plain "ws" scheme is supported; "wss" needs a TLS transport, which
/// the caller can layer themselves and hand to [`Connection::client`].
pub async fn connect_url(url: &Url) -> Result<Connection<TcpStream>> {
    if url.scheme() != "ws" {
        return Err(WebSocketError::InvalidHttpScheme);
    }
    let host = url
        .host_str()
        .ok_or(WebSocketError::UrlParseError(url::ParseError::EmptyHost))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let host_header = if url.port().is_some() {
        format!("{host}:{port}")
    } else {
        host.to_string()
    };
    let resource = &url[url::Position::BeforePath..];

    let stream = TcpStream::connect((host, port)).await?;
    let mut conn = Connection::client(stream);
    conn.connect(&host_header, resource).await?;
    Ok(conn)
}

/// Writes the opening request, reads the response head, and validates the
/// accept value. Returns any bytes read past the head, which belong to the
/// frame stream.
async fn client_handshake<S>(io: &mut S, request: &ClientHandshake) -> Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    io.write_all(&request.to_bytes()).await?;

    let (head, leftover) = read_head(io).await?;
    let response = ServerHandshake::parse(&head)?;
    response.validate(&request.key)?;
    Ok(leftover)
}

/// Reads and validates the client's request head, then answers it. Returns any
/// bytes read past the head.
async fn server_handshake<S>(io: &mut S) -> Result<BytesMut>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (head, leftover) = read_head(io).await?;
    let request = ClientHandshake::parse(&head)?;

    let response = ServerHandshake::for_key(&request.key);
    io.write_all(&response.to_bytes()).await?;
    Ok(leftover)
}

/// Reads from `io` until the blank line ending a handshake head.
///
/// Returns the head (terminator included) and whatever was read past it.
/// EOF before the terminator means the peer hung up mid-handshake.
async fn read_head<S>(io: &mut S) -> Result<(BytesMut, BytesMut)>
where
    S: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(1024);
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let mut head = buf;
            let leftover = head.split_off(end + 4);
            return Ok((head, leftover));
        }
        if buf.len() > MAX_HANDSHAKE_HEAD {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "handshake head too large",
            )
            .into());
        }
        if io.read_buf(&mut buf).await? == 0 {
            return Err(WebSocketError::ConnectionClosed);
        }
    }
}

/// Builds the frame stream, seeding its read buffer with bytes that arrived
/// behind the handshake head.
fn framed<S>(io: S, leftover: BytesMut) -> Framed<S, FrameCodec>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut parts = FramedParts::new::<Frame>(io, FrameCodec::default());
    parts.read_buf = leftover;
    Framed::from_parts(parts)
}
