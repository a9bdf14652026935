//! A socket that reconnects itself.
//!
//! [`ReconnectingSocket`] wraps a message-oriented duplex connection and
//! re-establishes it with exponential backoff whenever it drops. Callers keep
//! the surface of a plain socket: `open`, `close`, `message` and `error`
//! events, `send`, and read-through properties such as [`ReadyState`].
//!
//! # Features
//!
//! - **Exponential backoff**: the first delay is jittered in `[min, 2 * min)`,
//!   then multiplied by the grow factor up to a cap
//! - **Retry limit**: once exhausted, an `EHOSTDOWN` error is emitted and the
//!   socket stalls until [`ReconnectingSocket::reconnect`] is called
//! - **Connection timeout**: attempts that do not open in time are closed and
//!   reported as `ETIMEDOUT`
//! - **Persistent listeners**: listeners are registered once and follow every
//!   replacement socket
//! - **Tower integration**: `ReconnectingSocket` is a `Service<Message>`
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::time::Duration;
//! use resilient_socket::{EventType, ReconnectConfig, ReconnectingSocket};
//! # use std::sync::Arc;
//! # use resilient_socket::{Socket, SocketEvents};
//! # use tower::BoxError;
//! # fn my_transport(_: &str, _: &[String], _: SocketEvents) -> Result<Arc<dyn Socket>, BoxError> {
//! #     unimplemented!()
//! # }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), resilient_socket::Error> {
//! let config = ReconnectConfig::builder()
//!     .factory(my_transport)
//!     .min_reconnection_delay(Duration::from_millis(500))
//!     .max_retries(10)
//!     .name("prices")
//!     .build();
//!
//! let socket = ReconnectingSocket::new("wss://example.com/feed", ["v2.prices"], config)?;
//!
//! socket.on(EventType::Message, |event| {
//!     if let Some(text) = event.as_message().and_then(|m| m.as_text()) {
//!         println!("tick: {text}");
//!     }
//! });
//! socket.on(EventType::Error, |event| {
//!     eprintln!("connection problem: {:?}", event.as_error());
//! });
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//! - `metrics`: connection attempt, reconnect, error and state metrics via the `metrics` crate
//! - `serde`: [`ReconnectOptions`], a serializable form of the plain options
//! - `tungstenite`: a WebSocket transport over `tokio-tungstenite`, used as
//!   the default factory

mod config;
mod error;
mod event;
#[cfg(feature = "serde")]
mod options;
mod policy;
mod service;
mod socket;
mod state;
mod transport;
#[cfg(feature = "tungstenite")]
pub mod tungstenite;


pub use config::{
    ReconnectCallback, ReconnectConfig, ReconnectConfigBuilder, StateChangeCallback,
    DEFAULT_CONNECTION_TIMEOUT,
};
pub use error::Error;
pub use event::{EventType, SocketEvent};
#[cfg(feature = "serde")]
pub use options::ReconnectOptions;
pub use policy::{
    Backoff, ReconnectPolicy, DEFAULT_MAX_RECONNECTION_DELAY, DEFAULT_MIN_RECONNECTION_DELAY,
    DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
};
pub use socket::{ErrorHandler, ReconnectingSocket, SocketEvents};
pub use state::ConnectionState;
pub use transport::{
    BinaryType, CloseEvent, Message, ReadyState, SharedSocketFactory, Socket, SocketFactory,
    ABNORMAL_CLOSURE, NORMAL_CLOSURE,
};

pub use resilient_socket_core::events::listener;
pub use resilient_socket_core::{
    BoxedEventListener, ConnectionError, ErrorCode, EventListener, FnListener, ListenerOptions,
};
