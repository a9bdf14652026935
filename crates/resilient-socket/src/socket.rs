//! The reconnecting socket.
//!
//! All mutable state lives in one [`Inner`] behind a mutex. Handlers update it
//! while holding the lock, collect what has to happen next into an
//! [`Effects`] value, and release the lock before running listeners, config
//! callbacks or calling into the underlying socket. That keeps re-entrant calls
//! safe: a listener may call `close()`, and a socket may report `close`
//! synchronously from inside `Socket::close` or from its `Drop`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

#[cfg(feature = "metrics")]
use metrics::{counter, describe_counter, describe_gauge, gauge};
use resilient_socket_core::events::{emit, listener, BoxedEventListener, ListenerOptions, ListenerRegistry};
use resilient_socket_core::ConnectionError;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tower::BoxError;

use crate::config::ReconnectConfig;
use crate::error::Error;
use crate::event::{EventType, SocketEvent};
use crate::policy::Backoff;
use crate::state::ConnectionState;
use crate::transport::{
    BinaryType, CloseEvent, Message, ReadyState, SharedSocketFactory, Socket,
};

/// Direct error handler, called after the `error` listeners.
pub type ErrorHandler = Arc<dyn Fn(&ConnectionError) + Send + Sync>;

#[cfg(feature = "metrics")]
static METRICS_INIT: std::sync::Once = std::sync::Once::new();

#[cfg(feature = "metrics")]
fn describe_metrics() {
    METRICS_INIT.call_once(|| {
        describe_counter!(
            "socket_connect_attempts_total",
            "Total number of underlying socket connection attempts"
        );
        describe_counter!(
            "socket_reconnects_scheduled_total",
            "Total number of reconnections scheduled after a close"
        );
        describe_counter!(
            "socket_errors_total",
            "Total number of synthetic connection errors emitted"
        );
        describe_gauge!("socket_state", "Current lifecycle state of the socket");
    });
}

macro_rules! debug_log {
    ($shared:expr, $($arg:tt)+) => {
        if $shared.config.debug {
            tracing::debug!(socket = %$shared.config.name, $($arg)+);
        }
    };
}

/// A socket that reconnects with exponential backoff when its connection drops.
///
/// Cloning yields another handle to the same connection. Listeners registered
/// with [`add_event_listener`](Self::add_event_listener) stay attached across
/// reconnects; property accessors always read through to the socket of the
/// current attempt.
///
/// Must be created inside a tokio runtime; timers run on that runtime.
#[derive(Clone)]
pub struct ReconnectingSocket {
    shared: Arc<Shared>,
}

struct Shared {
    url: String,
    protocols: Vec<String>,
    config: ReconnectConfig,
    factory: SharedSocketFactory,
    runtime: Handle,
    inner: Mutex<Inner>,
}

struct Inner {
    socket: Option<Arc<dyn Socket>>,
    // Bumped for every attempt; events carrying an older value are ignored.
    generation: u64,
    // Set once the current generation has reported `close`.
    socket_closed: bool,
    connect_timeout: Option<JoinHandle<()>>,
    retry_timer: Option<JoinHandle<()>>,
    backoff: Backoff,
    retries: u32,
    should_retry: bool,
    state: ConnectionState,
    listeners: ListenerRegistry<SocketEvent>,
    on_error: Option<ErrorHandler>,
    binary_type: Option<BinaryType>,
}

#[derive(Default)]
struct Effects {
    transitions: Vec<(ConnectionState, ConnectionState)>,
    scheduled: Option<(u32, Duration)>,
    dispatch: Option<(Vec<BoxedEventListener<SocketEvent>>, SocketEvent)>,
    deferred_error: Option<ConnectionError>,
}

struct AttemptError {
    generation: u64,
    source: BoxError,
}

impl Inner {
    fn new(backoff: Backoff) -> Self {
        Self {
            socket: None,
            generation: 0,
            socket_closed: false,
            connect_timeout: None,
            retry_timer: None,
            backoff,
            retries: 0,
            should_retry: true,
            state: ConnectionState::Connecting,
            listeners: ListenerRegistry::new(),
            on_error: None,
            binary_type: None,
        }
    }

    fn transition(&mut self, to: ConnectionState, effects: &mut Effects) {
        if self.state == to {
            return;
        }
        effects.transitions.push((self.state, to));
        self.state = to;
    }

    fn is_stale(&self, generation: u64) -> bool {
        generation != self.generation || self.socket_closed
    }

    fn cancel_timers(&mut self) {
        if let Some(timer) = self.connect_timeout.take() {
            timer.abort();
        }
        if let Some(timer) = self.retry_timer.take() {
            timer.abort();
        }
    }
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates a new underlying socket and wires it to this instance.
    fn connect(self: &Arc<Self>) -> Result<(), AttemptError> {
        let mut effects = Effects::default();
        let (generation, retries) = {
            let mut inner = self.lock();
            if !inner.should_retry {
                return Ok(());
            }
            inner.generation += 1;
            inner.socket_closed = false;
            inner.retry_timer = None;
            if let Some(timer) = inner.connect_timeout.take() {
                timer.abort();
            }
            inner.transition(ConnectionState::Connecting, &mut effects);
            (inner.generation, inner.retries)
        };
        self.apply(effects);

        debug_log!(self, url = %self.url, attempt = retries.saturating_add(1), "connecting");
        #[cfg(feature = "metrics")]
        counter!("socket_connect_attempts_total", "socket" => self.config.name.clone())
            .increment(1);

        let events = SocketEvents {
            shared: Arc::downgrade(self),
            generation,
        };
        let socket = self
            .factory
            .connect(&self.url, &self.protocols, events)
            .map_err(|source| AttemptError { generation, source })?;

        let (binary_type, superseded) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                // A listener started a newer attempt while this one was being created.
                return Ok(());
            }
            // Released after the guard: its Drop may report `close` re-entrantly.
            let superseded = inner.socket.replace(Arc::clone(&socket));
            if !inner.should_retry {
                let closed = inner.socket_closed;
                drop(inner);
                drop(superseded);
                if !closed {
                    socket.close(None, None);
                }
                return Ok(());
            }
            if inner.state == ConnectionState::Connecting && !inner.socket_closed {
                let weak = Arc::downgrade(self);
                let timeout = self.config.connection_timeout;
                inner.connect_timeout = Some(self.runtime.spawn(async move {
                    tokio::time::sleep(timeout).await;
                    if let Some(shared) = weak.upgrade() {
                        shared.handle_timeout(generation);
                    }
                }));
            }
            (inner.binary_type, superseded)
        };
        drop(superseded);

        if let Some(binary_type) = binary_type {
            socket.set_binary_type(binary_type);
        }
        debug_log!(self, generation, "passthrough bound to new socket");
        Ok(())
    }

    /// Runs a connection attempt; a factory failure counts as an abnormal close.
    fn attempt(self: &Arc<Self>) {
        if let Err(failure) = self.connect() {
            debug_log!(self, error = %failure.source, "socket factory failed");
            self.handle_close(failure.generation, CloseEvent::abnormal());
        }
    }

    fn handle_timeout(self: &Arc<Self>, generation: u64) {
        let socket = {
            let mut inner = self.lock();
            if inner.is_stale(generation) || inner.state != ConnectionState::Connecting {
                return;
            }
            inner.connect_timeout = None;
            inner.socket.clone()
        };

        debug_log!(
            self,
            timeout = ?self.config.connection_timeout,
            "connection timed out"
        );
        if let Some(socket) = socket {
            socket.close(None, None);
        }
        self.emit_error(ConnectionError::timed_out());
    }

    fn handle_open(self: &Arc<Self>, generation: u64) {
        let mut effects = Effects::default();
        {
            let mut inner = self.lock();
            if inner.is_stale(generation) {
                return;
            }
            if let Some(timer) = inner.connect_timeout.take() {
                timer.abort();
            }
            inner.backoff.reset();
            inner.retries = 0;
            if inner.state == ConnectionState::Connecting {
                inner.transition(ConnectionState::Connected, &mut effects);
            }
            effects.dispatch = Some((
                inner.listeners.prepare_dispatch(EventType::Open),
                SocketEvent::Open,
            ));
        }

        debug_log!(self, "socket open");
        self.apply(effects);
    }

    fn handle_message(self: &Arc<Self>, generation: u64, message: Message) {
        let listeners = {
            let mut inner = self.lock();
            if inner.is_stale(generation) {
                return;
            }
            inner.listeners.prepare_dispatch(EventType::Message)
        };
        emit(&listeners, &SocketEvent::Message(message));
    }

    fn handle_transport_error(self: &Arc<Self>, generation: u64, error: ConnectionError) {
        if self.lock().is_stale(generation) {
            return;
        }
        debug_log!(self, error = %error, "transport error");
        self.dispatch_error(error);
    }

    fn handle_close(self: &Arc<Self>, generation: u64, event: CloseEvent) {
        let mut effects = Effects::default();
        {
            let mut inner = self.lock();
            if inner.is_stale(generation) {
                return;
            }
            inner.socket_closed = true;
            if let Some(timer) = inner.connect_timeout.take() {
                timer.abort();
            }
            inner.retries = inner.retries.saturating_add(1);
            let retries = inner.retries;

            debug_log!(self, code = event.code, retries, "socket closed");

            if inner.should_retry {
                let exhausted = self
                    .config
                    .max_retries
                    .is_some_and(|max_retries| retries > max_retries);
                if exhausted {
                    inner.transition(ConnectionState::Stalled, &mut effects);
                    effects.deferred_error = Some(ConnectionError::host_down());
                } else {
                    let delay = inner.backoff.next_delay();
                    inner.transition(ConnectionState::Reconnecting, &mut effects);
                    let weak = Arc::downgrade(self);
                    inner.retry_timer = Some(self.runtime.spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(shared) = weak.upgrade() {
                            shared.retry(generation);
                        }
                    }));
                    effects.scheduled = Some((retries, delay));
                }
            }

            effects.dispatch = Some((
                inner.listeners.prepare_dispatch(EventType::Close),
                SocketEvent::Close(event),
            ));
        }

        self.apply(effects);
    }

    fn retry(self: &Arc<Self>, generation: u64) {
        {
            let mut inner = self.lock();
            if !inner.should_retry
                || inner.generation != generation
                || inner.state != ConnectionState::Reconnecting
            {
                return;
            }
            inner.retry_timer = None;
        }
        self.attempt();
    }

    /// Schedules `error` for delivery after the current event has been handled.
    fn emit_error(self: &Arc<Self>, error: ConnectionError) {
        #[cfg(feature = "metrics")]
        counter!(
            "socket_errors_total",
            "socket" => self.config.name.clone(),
            "code" => error.code().map_or("transport", |code| code.as_str())
        )
        .increment(1);

        let weak = Arc::downgrade(self);
        self.runtime.spawn(async move {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch_error(error);
            }
        });
    }

    fn dispatch_error(&self, error: ConnectionError) {
        let (listeners, handler) = {
            let mut inner = self.lock();
            (
                inner.listeners.prepare_dispatch(EventType::Error),
                inner.on_error.clone(),
            )
        };
        emit(&listeners, &SocketEvent::Error(error.clone()));
        if let Some(handler) = handler {
            let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler(&error)));
        }
    }

    fn apply(self: &Arc<Self>, effects: Effects) {
        for (from, to) in effects.transitions {
            debug_log!(self, from = %from, to = %to, "state transition");
            #[cfg(feature = "metrics")]
            {
                gauge!("socket_state", "socket" => self.config.name.clone(), "state" => from.as_str())
                    .set(0.0);
                gauge!("socket_state", "socket" => self.config.name.clone(), "state" => to.as_str())
                    .set(1.0);
            }
            if let Some(callback) = &self.config.on_state_change {
                callback(from, to);
            }
        }

        if let Some((attempt, delay)) = effects.scheduled {
            debug_log!(self, retries = attempt, delay = ?delay, "reconnect scheduled");
            #[cfg(feature = "metrics")]
            counter!("socket_reconnects_scheduled_total", "socket" => self.config.name.clone())
                .increment(1);
            if let Some(callback) = &self.config.on_reconnect {
                callback(attempt, delay);
            }
        }

        if let Some((listeners, event)) = effects.dispatch {
            emit(&listeners, &event);
        }

        if let Some(error) = effects.deferred_error {
            self.emit_error(error);
        }
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.inner
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel_timers();
    }
}

impl ReconnectingSocket {
    /// Creates a socket and starts the first connection attempt.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if no factory is configured, a value is
    /// out of range, or no tokio runtime is running. Returns
    /// [`Error::Connect`] if the factory refuses the first attempt.
    pub fn new<I, P>(url: impl Into<String>, protocols: I, config: ReconnectConfig) -> Result<Self, Error>
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        let factory = config.validate()?;
        #[cfg(feature = "metrics")]
        describe_metrics();
        let runtime = Handle::try_current().map_err(|_| Error::NoRuntime)?;
        let url = url.into();
        let protocols: Vec<String> = protocols.into_iter().map(Into::into).collect();

        if config.debug {
            tracing::debug!(
                socket = %config.name,
                url = %url,
                protocols = ?protocols,
                config = ?config,
                "init"
            );
        }

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::new(Backoff::new(config.policy))),
            url,
            protocols,
            config,
            factory,
            runtime,
        });
        shared
            .connect()
            .map_err(|failure| Error::Connect(failure.source))?;

        Ok(Self { shared })
    }

    /// Creates a socket without subprotocols.
    pub fn connect(url: impl Into<String>, config: ReconnectConfig) -> Result<Self, Error> {
        Self::new(url, std::iter::empty::<String>(), config)
    }

    /// Registers `listener` for `event_type`.
    ///
    /// The listener receives events from the live socket immediately and from
    /// every socket created by later reconnects. Registering the same `Arc`
    /// again for the same event type is a no-op.
    pub fn add_event_listener(
        &self,
        event_type: EventType,
        listener: BoxedEventListener<SocketEvent>,
        options: ListenerOptions,
    ) {
        self.shared
            .lock()
            .listeners
            .add(event_type, listener, options);
    }

    /// Registers a closure for `event_type` and returns its handle.
    ///
    /// Pass the handle to [`remove_event_listener`](Self::remove_event_listener)
    /// to unregister it.
    pub fn on<F>(&self, event_type: EventType, f: F) -> BoxedEventListener<SocketEvent>
    where
        F: Fn(&SocketEvent) + Send + Sync + 'static,
    {
        let handle = listener(f);
        self.add_event_listener(event_type, Arc::clone(&handle), ListenerOptions::default());
        handle
    }

    /// Unregisters `listener` from `event_type`, for this and all later sockets.
    ///
    /// `options` mirrors [`add_event_listener`](Self::add_event_listener);
    /// registrations are matched on event type and listener identity only, so
    /// every registration of `listener` for `event_type` is removed.
    pub fn remove_event_listener(
        &self,
        event_type: EventType,
        listener: &BoxedEventListener<SocketEvent>,
        _options: ListenerOptions,
    ) {
        self.shared.lock().listeners.remove(event_type, listener);
    }

    /// Sets the direct error handler, called after the `error` listeners.
    pub fn set_on_error<F>(&self, handler: F)
    where
        F: Fn(&ConnectionError) + Send + Sync + 'static,
    {
        self.shared.lock().on_error = Some(Arc::new(handler));
    }

    /// Removes the direct error handler.
    pub fn clear_on_error(&self) {
        self.shared.lock().on_error = None;
    }

    /// Closes the connection for good.
    ///
    /// No reconnection will be scheduled or run after this, even if the
    /// socket being shut down reports `close` later.
    pub fn close(&self) {
        self.close_inner(None, None);
    }

    /// Closes the connection for good, sending `code` and `reason` to the peer.
    pub fn close_with(&self, code: u16, reason: &str) {
        self.close_inner(Some(code), Some(reason));
    }

    fn close_inner(&self, code: Option<u16>, reason: Option<&str>) {
        let shared = &self.shared;
        let mut effects = Effects::default();
        let socket = {
            let mut inner = shared.lock();
            if inner.state.is_terminated() {
                return;
            }
            inner.should_retry = false;
            inner.cancel_timers();
            inner.transition(ConnectionState::Terminated, &mut effects);
            if inner.socket_closed {
                None
            } else {
                inner.socket.clone()
            }
        };

        debug_log!(shared, code = ?code, "close requested");
        shared.apply(effects);
        if let Some(socket) = socket {
            socket.close(code, reason);
        }
    }

    /// Restarts a stalled or waiting socket with a fresh retry budget.
    ///
    /// Skips any remaining backoff delay and connects immediately. Does
    /// nothing while a socket is connecting or open.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Terminated`] after [`close`](Self::close).
    pub fn reconnect(&self) -> Result<(), Error> {
        {
            let mut inner = self.shared.lock();
            match inner.state {
                ConnectionState::Terminated => return Err(Error::Terminated),
                ConnectionState::Connecting | ConnectionState::Connected => return Ok(()),
                ConnectionState::Reconnecting | ConnectionState::Stalled => {}
            }
            if let Some(timer) = inner.retry_timer.take() {
                timer.abort();
            }
            inner.retries = 0;
            inner.backoff.reset();
        }
        debug_log!(self.shared, "manual reconnect");
        self.shared.attempt();
        Ok(())
    }

    /// Sends a message through the live socket.
    pub fn send(&self, message: impl Into<Message>) -> Result<(), Error> {
        let socket = {
            let inner = self.shared.lock();
            if inner.state.is_terminated() {
                return Err(Error::Terminated);
            }
            inner.socket.clone().ok_or(Error::NotConnected)?
        };
        if socket.ready_state() != ReadyState::Open {
            return Err(Error::NotConnected);
        }
        socket.send(message.into()).map_err(Error::Send)
    }

    fn current_socket(&self) -> Option<Arc<dyn Socket>> {
        self.shared.lock().socket.clone()
    }

    /// Ready state of the live socket.
    pub fn ready_state(&self) -> ReadyState {
        match self.current_socket() {
            Some(socket) => socket.ready_state(),
            None if self.state().is_terminated() => ReadyState::Closed,
            None => ReadyState::Connecting,
        }
    }

    /// Bytes queued on the live socket but not yet written.
    pub fn buffered_amount(&self) -> usize {
        self.current_socket()
            .map_or(0, |socket| socket.buffered_amount())
    }

    /// URL of the live socket, or the configured URL if there is none.
    pub fn url(&self) -> String {
        match self.current_socket() {
            Some(socket) => socket.url(),
            None => self.shared.url.clone(),
        }
    }

    /// Subprotocol selected by the server for the live socket.
    pub fn protocol(&self) -> String {
        self.current_socket()
            .map(|socket| socket.protocol())
            .unwrap_or_default()
    }

    /// Binary type of the live socket.
    pub fn binary_type(&self) -> BinaryType {
        let (socket, stored) = {
            let inner = self.shared.lock();
            (inner.socket.clone(), inner.binary_type)
        };
        match socket {
            Some(socket) => socket.binary_type(),
            None => stored.unwrap_or_default(),
        }
    }

    /// Sets the binary type on the live socket and on every later socket.
    pub fn set_binary_type(&self, binary_type: BinaryType) {
        let socket = {
            let mut inner = self.shared.lock();
            inner.binary_type = Some(binary_type);
            inner.socket.clone()
        };
        if let Some(socket) = socket {
            socket.set_binary_type(binary_type);
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.shared.lock().state
    }

    /// Consecutive failed attempts since the last successful open.
    pub fn retry_count(&self) -> u32 {
        self.shared.lock().retries
    }

    /// The most recently computed backoff delay, if any.
    pub fn reconnect_delay(&self) -> Option<Duration> {
        self.shared.lock().backoff.current()
    }

    /// Number of listeners registered for `event_type`.
    pub fn listener_count(&self, event_type: EventType) -> usize {
        self.shared.lock().listeners.len_for(event_type)
    }

    /// The configuration this socket was built with.
    pub fn config(&self) -> &ReconnectConfig {
        &self.shared.config
    }
}

impl fmt::Debug for ReconnectingSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.shared.lock();
        f.debug_struct("ReconnectingSocket")
            .field("url", &self.shared.url)
            .field("state", &inner.state)
            .field("retries", &inner.retries)
            .field("listeners", &inner.listeners)
            .finish()
    }
}

/// Event sink handed to an underlying socket when it is created.
///
/// Each sink is bound to one connection attempt. Once the attempt has been
/// superseded or has reported `close`, further calls are ignored.
#[derive(Clone)]
pub struct SocketEvents {
    shared: Weak<Shared>,
    generation: u64,
}

impl SocketEvents {
    fn with<F>(&self, f: F)
    where
        F: FnOnce(&Arc<Shared>, u64),
    {
        if let Some(shared) = self.shared.upgrade() {
            f(&shared, self.generation);
        }
    }

    /// Reports that the handshake completed.
    pub fn open(&self) {
        self.with(|shared, generation| shared.handle_open(generation));
    }

    /// Reports an incoming message.
    pub fn message(&self, message: impl Into<Message>) {
        let message = message.into();
        self.with(|shared, generation| shared.handle_message(generation, message));
    }

    /// Reports a transport-level error.
    pub fn error(&self, message: impl Into<String>) {
        let error = ConnectionError::transport(message);
        self.with(|shared, generation| shared.handle_transport_error(generation, error));
    }

    /// Reports that the connection closed or could not be established.
    pub fn close(&self, event: CloseEvent) {
        self.with(|shared, generation| shared.handle_close(generation, event));
    }

    /// Returns true while this sink belongs to the current, unclosed attempt.
    pub fn is_current(&self) -> bool {
        self.shared
            .upgrade()
            .is_some_and(|shared| !shared.lock().is_stale(self.generation))
    }

    /// The attempt number this sink is bound to.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl fmt::Debug for SocketEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketEvents")
            .field("generation", &self.generation)
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}
