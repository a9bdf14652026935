//! WebSocket transport over `tokio-tungstenite`.
//!
//! Each [`TungsteniteSocket`] owns a background task that performs the
//! handshake and then pumps frames in both directions. Sends and closes reach
//! the task over an unbounded command channel.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::SEC_WEBSOCKET_PROTOCOL;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tower::BoxError;

use crate::socket::SocketEvents;
use crate::transport::{BinaryType, CloseEvent, Message, ReadyState, Socket, SocketFactory};

/// Close code reported when the peer sent a close frame without a status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// How long a socket waits for the peer to answer its close frame.
pub const DEFAULT_CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

/// Creates [`TungsteniteSocket`]s on the current tokio runtime.
#[derive(Debug, Clone)]
pub struct TungsteniteFactory {
    close_timeout: Duration,
}

impl TungsteniteFactory {
    /// Creates a factory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how long to wait for the peer's close frame after sending ours.
    ///
    /// When it runs out the connection is dropped and `close` is reported
    /// with code 1006.
    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }
}

impl Default for TungsteniteFactory {
    fn default() -> Self {
        Self {
            close_timeout: DEFAULT_CLOSE_TIMEOUT,
        }
    }
}

impl SocketFactory for TungsteniteFactory {
    fn connect(
        &self,
        url: &str,
        protocols: &[String],
        events: SocketEvents,
    ) -> Result<Arc<dyn Socket>, BoxError> {
        let mut request = url.into_client_request()?;
        if !protocols.is_empty() {
            request
                .headers_mut()
                .insert(SEC_WEBSOCKET_PROTOCOL, HeaderValue::from_str(&protocols.join(", "))?);
        }
        let runtime = Handle::try_current()?;

        let (commands, receiver) = mpsc::unbounded_channel();
        let state = Arc::new(SharedState {
            url: url.to_string(),
            ready_state: AtomicU8::new(ReadyState::Connecting as u8),
            buffered: AtomicUsize::new(0),
            protocol: Mutex::new(String::new()),
            binary_type: Mutex::new(BinaryType::default()),
            close_reported: AtomicBool::new(false),
        });

        runtime.spawn(run(
            request,
            Arc::clone(&state),
            receiver,
            events.clone(),
            self.close_timeout,
        ));

        Ok(Arc::new(TungsteniteSocket {
            state,
            commands,
            events,
        }))
    }
}

enum Command {
    Send(Message),
    Close(Option<u16>, Option<String>),
}

struct SharedState {
    url: String,
    ready_state: AtomicU8,
    buffered: AtomicUsize,
    protocol: Mutex<String>,
    binary_type: Mutex<BinaryType>,
    close_reported: AtomicBool,
}

impl SharedState {
    fn ready_state(&self) -> ReadyState {
        match self.ready_state.load(Ordering::Acquire) {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state as u8, Ordering::Release);
    }

    /// Moves `from` to `to` atomically; false if the state was not `from`.
    fn transition(&self, from: ReadyState, to: ReadyState) -> bool {
        self.ready_state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Reports `close` once per socket, whichever side gets there first.
    fn report_close(&self, events: &SocketEvents, event: CloseEvent) {
        self.set_ready_state(ReadyState::Closed);
        if !self.close_reported.swap(true, Ordering::AcqRel) {
            events.close(event);
        }
    }
}

/// A WebSocket connection driven by a background task.
pub struct TungsteniteSocket {
    state: Arc<SharedState>,
    commands: mpsc::UnboundedSender<Command>,
    events: SocketEvents,
}

impl std::fmt::Debug for TungsteniteSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TungsteniteSocket")
            .field("url", &self.state.url)
            .field("ready_state", &self.state.ready_state())
            .finish()
    }
}

impl Socket for TungsteniteSocket {
    fn send(&self, message: Message) -> Result<(), BoxError> {
        if self.state.ready_state() != ReadyState::Open {
            return Err("websocket is not open".into());
        }
        let len = message.len();
        self.state.buffered.fetch_add(len, Ordering::AcqRel);
        self.commands.send(Command::Send(message)).map_err(|_| {
            self.state.buffered.fetch_sub(len, Ordering::AcqRel);
            BoxError::from("websocket task has stopped")
        })
    }

    fn close(&self, code: Option<u16>, reason: Option<&str>) {
        let _ = self
            .commands
            .send(Command::Close(code, reason.map(str::to_owned)));
        // Racing the handshake task: only one side wins the Connecting state.
        if self.state.transition(ReadyState::Connecting, ReadyState::Closed) {
            // The handshake is abandoned; nothing more will arrive from the peer.
            self.state.report_close(&self.events, CloseEvent::abnormal());
        } else {
            self.state.transition(ReadyState::Open, ReadyState::Closing);
        }
    }

    fn ready_state(&self) -> ReadyState {
        self.state.ready_state()
    }

    fn buffered_amount(&self) -> usize {
        self.state.buffered.load(Ordering::Acquire)
    }

    fn url(&self) -> String {
        self.state.url.clone()
    }

    fn protocol(&self) -> String {
        self.state
            .protocol
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn binary_type(&self) -> BinaryType {
        *self
            .state
            .binary_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set_binary_type(&self, binary_type: BinaryType) {
        *self
            .state
            .binary_type
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = binary_type;
    }
}

fn to_frame(message: Message) -> WsMessage {
    match message {
        Message::Text(text) => WsMessage::Text(text.into()),
        Message::Binary(data) => WsMessage::Binary(data.into()),
    }
}

async fn run(
    request: Request,
    state: Arc<SharedState>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    events: SocketEvents,
    close_timeout: Duration,
) {
    let (stream, response) = tokio::select! {
        result = tokio_tungstenite::connect_async(request) => match result {
            Ok(connected) => connected,
            Err(err) => {
                events.error(err.to_string());
                state.report_close(&events, CloseEvent::abnormal());
                return;
            }
        },
        _ = commands.recv() => {
            state.report_close(&events, CloseEvent::abnormal());
            return;
        }
    };

    let mut stream = stream;
    if !state.transition(ReadyState::Connecting, ReadyState::Open) {
        // Closed while the handshake was finishing.
        let _ = stream.close(None).await;
        return;
    }

    if let Some(protocol) = response
        .headers()
        .get(SEC_WEBSOCKET_PROTOCOL)
        .and_then(|value| value.to_str().ok())
    {
        *state.protocol.lock().unwrap_or_else(PoisonError::into_inner) = protocol.to_owned();
    }
    events.open();

    let (mut write, mut read) = stream.split();
    // Set once our close frame is out; the peer has until then to answer.
    let mut close_deadline: Option<Instant> = None;
    let close_event = loop {
        tokio::select! {
            _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)),
                if close_deadline.is_some() =>
            {
                break CloseEvent::abnormal();
            }
            command = commands.recv(), if close_deadline.is_none() => match command {
                Some(Command::Send(message)) => {
                    let len = message.len();
                    let result = write.send(to_frame(message)).await;
                    state.buffered.fetch_sub(len, Ordering::AcqRel);
                    if let Err(err) = result {
                        events.error(err.to_string());
                        break CloseEvent::abnormal();
                    }
                }
                Some(Command::Close(code, reason)) => {
                    close_deadline = Some(Instant::now() + close_timeout);
                    state.set_ready_state(ReadyState::Closing);
                    let frame = code.map(|code| CloseFrame {
                        code: CloseCode::from(code),
                        reason: reason.unwrap_or_default().into(),
                    });
                    if write.send(WsMessage::Close(frame)).await.is_err() {
                        break CloseEvent::abnormal();
                    }
                }
                None => {
                    let _ = write.close().await;
                    break CloseEvent::abnormal();
                }
            },
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => events.message(Message::Text(text.as_str().to_owned())),
                Some(Ok(WsMessage::Binary(data))) => events.message(Message::Binary(data.to_vec())),
                Some(Ok(WsMessage::Close(frame))) => {
                    break match frame {
                        Some(frame) => CloseEvent::new(u16::from(frame.code), frame.reason.as_str()),
                        None => CloseEvent::new(NO_STATUS_RECEIVED, ""),
                    };
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    events.error(err.to_string());
                    break CloseEvent::abnormal();
                }
                None => break CloseEvent::abnormal(),
            }
        }
    };

    state.report_close(&events, close_event);
}
