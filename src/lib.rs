//! # wirews
//! Implementation of the WebSocket wire protocol core (RFC 6455): a binary frame
//! codec with masking and variable-length payload encoding, plus the HTTP upgrade
//! handshake that turns a plain byte stream into a WebSocket connection.
//!
//! The crate is deliberately small. Everything protocol-critical is pure,
//! synchronous code over in-memory buffers ([`frame`], [`handshake`], the masking
//! and length helpers); the only async surface is the thin [`Connection`] endpoint
//! that drives handshake and frame exchange over any `AsyncRead + AsyncWrite`
//! transport.
//!
//! # Features
//! - `logging`: Enables debug logging for handshake progress and connection
//!   teardown using the `log` crate.
//!
//! # Codec model
//! A [`frame::Frame`] carries the length it *declares* on the wire separately from
//! the payload it actually holds, and the codec is split into a permissive and a
//! validated path:
//!
//! - [`frame::Frame::to_bytes`] / [`frame::Frame::from_bytes`] serialize and parse
//!   unconditionally, so structurally decodable but inconsistent frames round-trip
//!   byte-exactly for inspection.
//! - [`frame::Frame::safe_to_bytes`] checks [`frame::Frame::is_valid`] first and is
//!   the entry point every real sender goes through.
//!
//! # Client example
//! ```no_run
//! async fn run() -> anyhow::Result<()> {
//!     let mut ws = wirews::connect_url(&"ws://127.0.0.1:9001/echo".parse()?).await?;
//!     ws.send(b"hello".as_ref()).await?;
//!     let echoed = ws.recv().await?;
//!     assert_eq!(&echoed[..], b"hello");
//!     ws.close().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Server example
//! ```no_run
//! use tokio::net::TcpListener;
//! use wirews::Connection;
//!
//! async fn run() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:9001").await?;
//!     loop {
//!         let (stream, _) = listener.accept().await?;
//!         tokio::spawn(async move {
//!             let mut ws = Connection::server(stream);
//!             if ws.accept().await.is_err() {
//!                 return;
//!             }
//!             while let Ok(payload) = ws.recv().await {
//!                 if ws.send(payload).await.is_err() {
//!                     break;
//!                 }
//!             }
//!         });
//!     }
//! }
//! ```

pub mod codec;
mod connection;
pub mod frame;
pub mod handshake;
pub mod length;
mod mask;

pub use connection::{connect_url, Connection, Role};
pub use frame::{Frame, OpCode};

use thiserror::Error;

/// A result type for WebSocket operations, using `WebSocketError` as the error type.
pub type Result<T> = std::result::Result<T, WebSocketError>;

/// Errors surfaced by the frame codec, the handshake layer, and the connection
/// endpoint.
///
/// The taxonomy is deliberate:
///
/// - [`WebSocketError::FrameValidation`] is raised only by the validated
///   serialization path ([`Frame::safe_to_bytes`]) and by the outgoing side of the
///   stream codec, never by parsing.
/// - Handshake variants are raised when a received request or response head is
///   missing required fields or has an unparseable shape.
/// - [`WebSocketError::ConnectionClosed`] is the disconnect indication: once a
///   connection has been torn down (malformed handshake, close frame, transport
///   EOF), every further operation on it fails with this variant.
#[derive(Error, Debug)]
pub enum WebSocketError {
    /// A frame failed validation on the safe serialization path: the length it
    /// declares in its header does not match the payload it actually holds.
    #[error("invalid frame: declared payload length {declared} != actual {actual}")]
    FrameValidation {
        /// Length encoded in the wire header.
        declared: u64,
        /// Byte length of the payload held in memory.
        actual: u64,
    },

    /// A control frame (close, ping, pong) was built or received without the FIN
    /// bit set. RFC 6455 forbids fragmenting control frames.
    #[error("control frame must not be fragmented")]
    ControlFrameFragmented,

    /// Receipt of a frame with an opcode outside the set defined by RFC 6455.
    #[error("invalid opcode (byte={0})")]
    InvalidOpCode(u8),

    /// Reserved bits in the frame header are set; without negotiated extensions
    /// they must be zero.
    #[error("reserved bits are not zero")]
    ReservedBitsNotZero,

    /// The buffer handed to `Frame::from_bytes` ends before the frame header
    /// does. Distinct from a declared/actual payload mismatch, which parsing
    /// tolerates.
    #[error("truncated frame header")]
    TruncatedFrameHeader,

    /// A received frame declares a payload larger than the configured maximum.
    #[error("frame too large")]
    FrameTooLarge,

    /// The request line of a client handshake is not a well-formed HTTP/1.1 GET.
    #[error("invalid handshake request line")]
    InvalidRequestLine,

    /// The status line of a server handshake response is unparseable.
    #[error("invalid handshake status line")]
    InvalidStatusLine,

    /// The server answered the upgrade request with a status other than
    /// 101 Switching Protocols.
    #[error("invalid status code: {0}")]
    InvalidStatusCode(u16),

    /// The "Upgrade" header is missing or does not contain "websocket".
    #[error("invalid upgrade header")]
    InvalidUpgradeHeader,

    /// The "Connection" header is missing or does not contain "upgrade".
    #[error("invalid connection header")]
    InvalidConnectionHeader,

    /// The "Sec-WebSocket-Version" header is not set to 13.
    #[error("Sec-WebSocket-Version must be 13")]
    InvalidSecWebsocketVersion,

    /// The required "Sec-WebSocket-Key" header is missing from the client
    /// request.
    #[error("Sec-WebSocket-Key header is missing")]
    MissingSecWebSocketKey,

    /// The server's Sec-WebSocket-Accept header is absent or is not the
    /// RFC 6455 derivation of the key the client sent. The client endpoint
    /// escalates this to a disconnect.
    #[error("Sec-WebSocket-Accept does not match the sent key")]
    SecWebSocketAcceptMismatch,

    /// Attempted to operate on a connection that is disconnected, or that is
    /// not yet past its handshake.
    #[error("connection is closed")]
    ConnectionClosed,

    /// Only the "ws" scheme is supported when dialing by URL.
    #[error("invalid http scheme")]
    InvalidHttpScheme,

    /// Wraps errors from URL parsing when dialing by URL.
    #[error(transparent)]
    UrlParseError(#[from] url::ParseError),

    /// Wraps transport I/O errors, such as connection resets.
    #[error(transparent)]
    IoError(#[from] std::io::Error),
}
