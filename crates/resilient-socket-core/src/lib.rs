//! Core infrastructure for resilient-socket.
//!
//! This crate provides the pieces the socket wrapper is built from:
//! - A listener registry keyed by event kind, with identity-based deduplication
//! - Panic-isolated event dispatch
//! - The connection error vocabulary (`ETIMEDOUT`, `EHOSTDOWN`)

pub mod error;
pub mod events;

pub use error::{ConnectionError, ErrorCode};
pub use events::{
    BoxedEventListener, Event, EventListener, FnListener, ListenerOptions, ListenerRegistry,
};
