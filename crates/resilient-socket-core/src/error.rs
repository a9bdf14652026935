//! Connection-level error values delivered through `error` events.
//!
//! These are never returned from a function call. A reconnecting socket hands
//! them to its `error` listeners after the triggering event has been handled.

use std::fmt;

use thiserror::Error;

/// Errno-style code carried by synthetic connection errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The connection attempt did not open within the connection timeout.
    TimedOut,
    /// The retry budget is exhausted; no further attempts are scheduled.
    HostDown,
}

impl ErrorCode {
    /// Returns the conventional errno name (`ETIMEDOUT`, `EHOSTDOWN`).
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::TimedOut => "ETIMEDOUT",
            ErrorCode::HostDown => "EHOSTDOWN",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error observed on a connection.
///
/// Synthetic errors raised by the reconnect logic carry a [`ErrorCode`];
/// errors reported by the underlying transport have no code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", display(.code, .message))]
pub struct ConnectionError {
    code: Option<ErrorCode>,
    message: String,
}

fn display(code: &Option<ErrorCode>, message: &str) -> String {
    match code {
        Some(code) => format!("{code}: {message}"),
        None => message.to_string(),
    }
}

impl ConnectionError {
    /// Creates an error with the given code and message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Creates an error reported by the transport itself.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// The connection attempt timed out before opening.
    pub fn timed_out() -> Self {
        Self::new(ErrorCode::TimedOut, "connection timed out")
    }

    /// Too many consecutive failed connection attempts.
    pub fn host_down() -> Self {
        Self::new(ErrorCode::HostDown, "too many failed connection attempts")
    }

    /// Returns the error code, if this is a synthetic error.
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Returns the human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns true for connection timeouts.
    pub fn is_timeout(&self) -> bool {
        self.code == Some(ErrorCode::TimedOut)
    }

    /// Returns true when the retry budget was exhausted.
    pub fn is_host_down(&self) -> bool {
        self.code == Some(ErrorCode::HostDown)
    }
}
