//! Plain-data reconnection options.
//!
//! [`ReconnectOptions`] carries the serializable subset of
//! [`ReconnectConfig`](crate::ReconnectConfig): everything except the socket
//! factory and callbacks. Missing fields take their default, so a partial
//! document overrides only what it names:
//!
//! ```
//! use std::time::Duration;
//! use resilient_socket::ReconnectOptions;
//!
//! let options: ReconnectOptions =
//!     serde_json::from_str(r#"{ "maxRetries": 3, "connectionTimeout": 500 }"#).unwrap();
//! let config = options.into_builder().build();
//!
//! assert_eq!(config.max_retries(), Some(3));
//! assert_eq!(config.connection_timeout(), Duration::from_millis(500));
//! assert_eq!(config.policy().min_delay(), Duration::from_millis(1500));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::{ReconnectConfigBuilder, DEFAULT_CONNECTION_TIMEOUT};
use crate::policy::{
    DEFAULT_MAX_RECONNECTION_DELAY, DEFAULT_MIN_RECONNECTION_DELAY,
    DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
};

/// Serializable reconnection options. Durations are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReconnectOptions {
    /// Cap on the reconnection delay.
    pub max_reconnection_delay: u64,
    /// Lower bound of the first reconnection delay.
    pub min_reconnection_delay: u64,
    /// Multiplier applied on each consecutive failure.
    pub reconnection_delay_grow_factor: f64,
    /// Time allowed for a connection attempt to open.
    pub connection_timeout: u64,
    /// Consecutive failures allowed; absent means unlimited.
    pub max_retries: Option<u32>,
    /// Emit diagnostic log lines.
    pub debug: bool,
    /// Instance name for logs and metrics.
    pub name: Option<String>,
}

impl Default for ReconnectOptions {
    fn default() -> Self {
        Self {
            max_reconnection_delay: millis(DEFAULT_MAX_RECONNECTION_DELAY),
            min_reconnection_delay: millis(DEFAULT_MIN_RECONNECTION_DELAY),
            reconnection_delay_grow_factor: DEFAULT_RECONNECTION_DELAY_GROW_FACTOR,
            connection_timeout: millis(DEFAULT_CONNECTION_TIMEOUT),
            max_retries: None,
            debug: false,
            name: None,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl ReconnectOptions {
    /// Applies these options to a default builder.
    ///
    /// The socket factory and callbacks still need to be set on the returned
    /// builder.
    pub fn into_builder(self) -> ReconnectConfigBuilder {
        self.apply(ReconnectConfigBuilder::default())
    }

    /// Applies these options over an existing builder.
    pub fn apply(self, builder: ReconnectConfigBuilder) -> ReconnectConfigBuilder {
        let builder = builder
            .max_reconnection_delay(Duration::from_millis(self.max_reconnection_delay))
            .min_reconnection_delay(Duration::from_millis(self.min_reconnection_delay))
            .reconnection_delay_grow_factor(self.reconnection_delay_grow_factor)
            .connection_timeout(Duration::from_millis(self.connection_timeout))
            .debug(self.debug);
        let builder = match self.max_retries {
            Some(max_retries) => builder.max_retries(max_retries),
            None => builder.unlimited_retries(),
        };
        match self.name {
            Some(name) => builder.name(name),
            None => builder,
        }
    }
}
