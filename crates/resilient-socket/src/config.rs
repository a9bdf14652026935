use std::sync::Arc;
use std::time::Duration;

use crate::error::Error;
use crate::policy::ReconnectPolicy;
use crate::state::ConnectionState;
use crate::transport::{FactoryDebug, SharedSocketFactory, SocketFactory};

/// Default time to wait for `open` before forcing a connection attempt to fail.
pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_millis(4000);

/// Callback invoked when a reconnection attempt is scheduled.
pub type ReconnectCallback = Arc<dyn Fn(u32, Duration) + Send + Sync>;

/// Callback invoked on state transitions.
pub type StateChangeCallback = Arc<dyn Fn(ConnectionState, ConnectionState) + Send + Sync>;

/// Configuration for a reconnecting socket.
///
/// Built once per socket and never mutated afterwards.
pub struct ReconnectConfig {
    /// Creates the underlying sockets.
    pub(crate) factory: Option<SharedSocketFactory>,

    /// Backoff between attempts.
    pub(crate) policy: ReconnectPolicy,

    /// How long a connection attempt may take to open.
    pub(crate) connection_timeout: Duration,

    /// Maximum number of consecutive failed attempts.
    /// None means unlimited attempts.
    pub(crate) max_retries: Option<u32>,

    /// Emit diagnostic log lines.
    pub(crate) debug: bool,

    /// Name used in log fields and metric labels.
    pub(crate) name: String,

    /// Optional callback for scheduled reconnections.
    pub(crate) on_reconnect: Option<ReconnectCallback>,

    /// Optional callback for state transitions.
    pub(crate) on_state_change: Option<StateChangeCallback>,
}

impl Clone for ReconnectConfig {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            policy: self.policy,
            connection_timeout: self.connection_timeout,
            max_retries: self.max_retries,
            debug: self.debug,
            name: self.name.clone(),
            on_reconnect: self.on_reconnect.clone(),
            on_state_change: self.on_state_change.clone(),
        }
    }
}

impl std::fmt::Debug for ReconnectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfig")
            .field("factory", &FactoryDebug(&self.factory))
            .field("policy", &self.policy)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_retries", &self.max_retries)
            .field("debug", &self.debug)
            .field("name", &self.name)
            .field("on_reconnect", &self.on_reconnect.is_some())
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

impl ReconnectConfig {
    /// Creates a new builder for configuring reconnection behavior.
    pub fn builder() -> ReconnectConfigBuilder {
        ReconnectConfigBuilder::default()
    }

    /// Returns the backoff policy.
    pub fn policy(&self) -> &ReconnectPolicy {
        &self.policy
    }

    /// Returns the connection timeout.
    pub fn connection_timeout(&self) -> Duration {
        self.connection_timeout
    }

    /// Returns the maximum number of consecutive failed attempts.
    pub fn max_retries(&self) -> Option<u32> {
        self.max_retries
    }

    /// Returns whether diagnostic logging is enabled.
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the instance name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true if a socket factory is configured.
    pub fn has_factory(&self) -> bool {
        self.factory.is_some()
    }

    /// Checks the configuration and returns the socket factory.
    pub(crate) fn validate(&self) -> Result<SharedSocketFactory, Error> {
        let factory = self.factory.clone().ok_or(Error::MissingFactory)?;
        self.policy.validate().map_err(Error::InvalidConfig)?;
        if self.connection_timeout.is_zero() {
            return Err(Error::InvalidConfig(
                "connection timeout must be greater than zero".to_string(),
            ));
        }
        Ok(factory)
    }
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        ReconnectConfigBuilder::default().build()
    }
}

/// Builder for constructing a `ReconnectConfig`.
pub struct ReconnectConfigBuilder {
    factory: Option<SharedSocketFactory>,
    min_delay: Duration,
    max_delay: Duration,
    grow_factor: f64,
    connection_timeout: Duration,
    max_retries: Option<u32>,
    debug: bool,
    name: String,
    on_reconnect: Option<ReconnectCallback>,
    on_state_change: Option<StateChangeCallback>,
}

impl std::fmt::Debug for ReconnectConfigBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconnectConfigBuilder")
            .field("factory", &FactoryDebug(&self.factory))
            .field("min_delay", &self.min_delay)
            .field("max_delay", &self.max_delay)
            .field("grow_factor", &self.grow_factor)
            .field("connection_timeout", &self.connection_timeout)
            .field("max_retries", &self.max_retries)
            .field("debug", &self.debug)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl ReconnectConfigBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the factory used to create underlying sockets.
    ///
    /// Any `Fn(&str, &[String], SocketEvents) -> Result<Arc<dyn Socket>, BoxError>`
    /// closure is a factory.
    pub fn factory<F>(mut self, factory: F) -> Self
    where
        F: SocketFactory + 'static,
    {
        self.factory = Some(Arc::new(factory));
        self
    }

    /// Sets an already shared socket factory.
    pub fn shared_factory(mut self, factory: SharedSocketFactory) -> Self {
        self.factory = Some(factory);
        self
    }

    /// Sets the lower bound of the first reconnection delay.
    ///
    /// The first delay after a healthy connection is uniformly random in
    /// `[min, 2 * min)`. Default is 1500ms.
    pub fn min_reconnection_delay(mut self, delay: Duration) -> Self {
        self.min_delay = delay;
        self
    }

    /// Sets the cap on reconnection delays. Default is 10s.
    pub fn max_reconnection_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the multiplier applied to the delay on each consecutive failure.
    ///
    /// Default is 1.3.
    pub fn reconnection_delay_grow_factor(mut self, factor: f64) -> Self {
        self.grow_factor = factor;
        self
    }

    /// Sets all backoff parameters from a policy.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use resilient_socket::{ReconnectConfig, ReconnectPolicy};
    ///
    /// let config = ReconnectConfig::builder()
    ///     .policy(ReconnectPolicy::new(
    ///         Duration::from_millis(100),
    ///         Duration::from_secs(1),
    ///         2.0,
    ///     ))
    ///     .build();
    ///
    /// assert_eq!(config.policy().grow_factor(), 2.0);
    /// ```
    pub fn policy(mut self, policy: ReconnectPolicy) -> Self {
        self.min_delay = policy.min_delay();
        self.max_delay = policy.max_delay();
        self.grow_factor = policy.grow_factor();
        self
    }

    /// Sets how long to wait for `open` before forcing the attempt to fail with
    /// `ETIMEDOUT`. Default is 4s.
    pub fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the maximum number of consecutive failed attempts.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_socket::ReconnectConfig;
    ///
    /// let config = ReconnectConfig::builder()
    ///     .max_retries(5)
    ///     .build();
    ///
    /// assert_eq!(config.max_retries(), Some(5));
    /// ```
    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    /// Sets unlimited reconnection attempts. This is the default.
    pub fn unlimited_retries(mut self) -> Self {
        self.max_retries = None;
        self
    }

    /// Enables diagnostic log lines through `tracing`.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Sets the name used in log fields and metric labels.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets a callback to be invoked whenever a reconnection is scheduled.
    ///
    /// The callback receives the consecutive failure count and the delay
    /// before the next attempt.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_socket::ReconnectConfig;
    ///
    /// let config = ReconnectConfig::builder()
    ///     .on_reconnect(|attempt, delay| {
    ///         println!("Reconnection attempt {} in {:?}", attempt, delay);
    ///     })
    ///     .build();
    /// ```
    pub fn on_reconnect<F>(mut self, callback: F) -> Self
    where
        F: Fn(u32, Duration) + Send + Sync + 'static,
    {
        self.on_reconnect = Some(Arc::new(callback));
        self
    }

    /// Sets a callback to be invoked on state transitions.
    ///
    /// The callback receives the old and new connection states.
    ///
    /// # Examples
    ///
    /// ```
    /// use resilient_socket::{ConnectionState, ReconnectConfig};
    ///
    /// let config = ReconnectConfig::builder()
    ///     .on_state_change(|from: ConnectionState, to: ConnectionState| {
    ///         println!("State changed: {} -> {}", from, to);
    ///     })
    ///     .build();
    /// ```
    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(ConnectionState, ConnectionState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Arc::new(callback));
        self
    }

    /// Builds the `ReconnectConfig`.
    ///
    /// Values are checked when the socket is constructed, not here.
    pub fn build(self) -> ReconnectConfig {
        ReconnectConfig {
            factory: self.factory,
            policy: ReconnectPolicy::new(self.min_delay, self.max_delay, self.grow_factor),
            connection_timeout: self.connection_timeout,
            max_retries: self.max_retries,
            debug: self.debug,
            name: self.name,
            on_reconnect: self.on_reconnect,
            on_state_change: self.on_state_change,
        }
    }
}

impl Default for ReconnectConfigBuilder {
    fn default() -> Self {
        let policy = ReconnectPolicy::default();
        Self {
            factory: default_factory(),
            min_delay: policy.min_delay(),
            max_delay: policy.max_delay(),
            grow_factor: policy.grow_factor(),
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            max_retries: None,
            debug: false,
            name: String::from("<unnamed>"),
            on_reconnect: None,
            on_state_change: None,
        }
    }
}

#[cfg(feature = "tungstenite")]
fn default_factory() -> Option<SharedSocketFactory> {
    Some(Arc::new(crate::tungstenite::TungsteniteFactory::new()))
}

#[cfg(not(feature = "tungstenite"))]
fn default_factory() -> Option<SharedSocketFactory> {
    None
}
