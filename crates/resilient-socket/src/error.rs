use thiserror::Error;
use tower::BoxError;

/// Errors returned by [`ReconnectingSocket`](crate::ReconnectingSocket) methods.
///
/// Connection failures after construction are never returned here; they are
/// reported through `close` and `error` events.
#[derive(Debug, Error)]
pub enum Error {
    /// No socket factory was configured.
    #[error("no socket factory configured")]
    MissingFactory,

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Construction happened outside a tokio runtime.
    #[error("a tokio runtime is required to drive reconnection timers")]
    NoRuntime,

    /// The factory refused to start the first connection attempt.
    #[error("failed to start connection: {0}")]
    Connect(#[source] BoxError),

    /// There is no live socket to send through.
    #[error("socket is not connected")]
    NotConnected,

    /// `close()` was called on this socket.
    #[error("socket has been closed")]
    Terminated,

    /// The live socket rejected the message.
    #[error("send failed: {0}")]
    Send(#[source] BoxError),
}

impl Error {
    /// Returns true for errors raised at construction time.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::MissingFactory | Error::InvalidConfig(_) | Error::NoRuntime
        )
    }
}
