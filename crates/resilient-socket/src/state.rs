//! Connection lifecycle states.

use std::fmt;

/// Lifecycle state of a reconnecting socket.
///
/// ```text
/// Connecting -> Connected -> Reconnecting -> Connecting -> ...
/// ```
///
/// A close that exhausts the retry budget leads to `Stalled` instead of
/// `Reconnecting`. `close()` moves any state to `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// A socket has been created and is waiting for `open`.
    Connecting,

    /// The current socket is open.
    Connected,

    /// The socket closed; waiting out the backoff delay before the next attempt.
    Reconnecting,

    /// Retries are exhausted. Nothing further happens until `reconnect()` or `close()`.
    Stalled,

    /// `close()` was called. No further attempts will ever be made.
    Terminated,
}

impl ConnectionState {
    /// Returns true once no automatic transition can happen any more.
    pub fn is_final(&self) -> bool {
        matches!(self, ConnectionState::Stalled | ConnectionState::Terminated)
    }

    /// Returns true if the state is `Terminated`.
    pub fn is_terminated(&self) -> bool {
        matches!(self, ConnectionState::Terminated)
    }

    /// Short lowercase name, used for log fields and metric labels.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Stalled => "stalled",
            ConnectionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
