//! The underlying socket capability.
//!
//! A [`SocketFactory`] creates one [`Socket`] per connection attempt. The
//! socket reports its lifecycle through the [`SocketEvents`] sink it was
//! created with; it never calls back into the wrapper any other way.

use std::fmt;
use std::sync::Arc;

use tower::BoxError;

use crate::socket::SocketEvents;

/// A single message frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// UTF-8 text frame.
    Text(String),
    /// Binary frame.
    Binary(Vec<u8>),
}

impl Message {
    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        match self {
            Message::Text(text) => text.len(),
            Message::Binary(data) => data.len(),
        }
    }

    /// Returns true if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the text payload, if this is a text frame.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            Message::Binary(_) => None,
        }
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Message::Text(text)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Message::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for Message {
    fn from(data: Vec<u8>) -> Self {
        Message::Binary(data)
    }
}

/// Ready state of a socket, numbered as in the WebSocket API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// The handshake has not completed yet.
    Connecting = 0,
    /// Messages can be sent and received.
    Open = 1,
    /// A close has been requested.
    Closing = 2,
    /// The connection is closed or could not be opened.
    Closed = 3,
}

/// How binary frames are surfaced to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BinaryType {
    /// Opaque blob.
    #[default]
    Blob,
    /// Contiguous byte buffer.
    ArrayBuffer,
}

/// Close code used when a connection drops without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code for a normal, caller-initiated close.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Details of a closed connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    /// Close code sent by the peer, or `1006` if none was received.
    pub code: u16,
    /// Close reason sent by the peer.
    pub reason: String,
    /// Whether the closing handshake completed.
    pub was_clean: bool,
}

impl CloseEvent {
    /// A close with the given code and reason, as reported by a closing handshake.
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean: true,
        }
    }

    /// A connection that dropped (or never opened) without a close frame.
    pub fn abnormal() -> Self {
        Self {
            code: ABNORMAL_CLOSURE,
            reason: String::new(),
            was_clean: false,
        }
    }
}

/// One live underlying connection.
///
/// Implementations use interior mutability; the wrapper never holds its own
/// lock while calling into a socket, so a socket may report events
/// synchronously from inside any of these methods.
pub trait Socket: Send + Sync {
    /// Queues a message for sending.
    fn send(&self, message: Message) -> Result<(), BoxError>;

    /// Starts the closing handshake. Must eventually report `close`.
    fn close(&self, code: Option<u16>, reason: Option<&str>);

    /// Current ready state.
    fn ready_state(&self) -> ReadyState;

    /// Bytes queued but not yet written.
    fn buffered_amount(&self) -> usize;

    /// The URL this socket connected to.
    fn url(&self) -> String;

    /// The subprotocol selected by the server, or empty.
    fn protocol(&self) -> String;

    /// How binary frames are surfaced.
    fn binary_type(&self) -> BinaryType;

    /// Changes how binary frames are surfaced.
    fn set_binary_type(&self, binary_type: BinaryType);
}

/// Creates underlying sockets.
pub trait SocketFactory: Send + Sync {
    /// Starts connecting to `url`.
    ///
    /// The handshake happens in the background; the returned socket reports
    /// `open`, `message`, `error` and `close` through `events`. An `Err` means the
    /// attempt could not even be started (e.g. a malformed URL).
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        events: SocketEvents,
    ) -> Result<Arc<dyn Socket>, BoxError>;
}

impl<F> SocketFactory for F
where
    F: Fn(&str, &[String], SocketEvents) -> Result<Arc<dyn Socket>, BoxError> + Send + Sync,
{
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        events: SocketEvents,
    ) -> Result<Arc<dyn Socket>, BoxError> {
        (self)(url, protocols, events)
    }
}

/// Shared handle to a socket factory.
pub type SharedSocketFactory = Arc<dyn SocketFactory>;

pub(crate) struct FactoryDebug<'a>(pub(crate) &'a Option<SharedSocketFactory>);

impl fmt::Debug for FactoryDebug<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(_) => f.write_str("Some(<factory>)"),
            None => f.write_str("None"),
        }
    }
}
