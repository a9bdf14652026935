//! Events surfaced by a reconnecting socket.

use resilient_socket_core::events::Event;
use resilient_socket_core::ConnectionError;

use crate::transport::{CloseEvent, Message};

/// Kinds of events a listener can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    /// The underlying socket opened.
    Open,
    /// The underlying socket closed.
    Close,
    /// A message arrived.
    Message,
    /// A transport error, or a synthetic `ETIMEDOUT`/`EHOSTDOWN`.
    Error,
}

impl EventType {
    /// The WebSocket API name of the event.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Open => "open",
            EventType::Close => "close",
            EventType::Message => "message",
            EventType::Error => "error",
        }
    }
}

/// An event delivered to listeners.
#[derive(Debug, Clone)]
pub enum SocketEvent {
    /// The underlying socket opened.
    Open,
    /// The underlying socket closed.
    Close(CloseEvent),
    /// A message arrived on the live socket.
    Message(Message),
    /// Something went wrong; see [`ConnectionError::code`].
    Error(ConnectionError),
}

impl SocketEvent {
    /// Returns the close details for `close` events.
    pub fn as_close(&self) -> Option<&CloseEvent> {
        match self {
            SocketEvent::Close(close) => Some(close),
            _ => None,
        }
    }

    /// Returns the message for `message` events.
    pub fn as_message(&self) -> Option<&Message> {
        match self {
            SocketEvent::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Returns the error for `error` events.
    pub fn as_error(&self) -> Option<&ConnectionError> {
        match self {
            SocketEvent::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl Event for SocketEvent {
    type Kind = EventType;

    fn kind(&self) -> EventType {
        match self {
            SocketEvent::Open => EventType::Open,
            SocketEvent::Close(_) => EventType::Close,
            SocketEvent::Message(_) => EventType::Message,
            SocketEvent::Error(_) => EventType::Error,
        }
    }
}
