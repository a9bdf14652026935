use std::time::Duration;

use resilient_socket::{ConnectionState, Error, ReadyState, ReconnectingSocket};

use super::support::*;

#[tokio::test(start_paused = true)]
async fn close_is_terminal() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);
    transport.latest().open();

    socket.close();
    advance(30_000).await;
    settle().await;

    assert_eq!(transport.count(), 1);
    assert_eq!(socket.state(), ConnectionState::Terminated);
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    assert_eq!(log.entries(), vec!["open", "close:1006"]);
    assert!(matches!(socket.send("nope"), Err(Error::Terminated)));
}

#[tokio::test(start_paused = true)]
async fn close_with_forwards_code_and_reason() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);
    transport.latest().open();

    socket.close_with(1000, "shutting down");

    assert_eq!(
        transport.latest().close_requests(),
        vec![(Some(1000), Some("shutting down".to_string()))]
    );
    assert_eq!(log.entries(), vec!["open", "close:1000"]);
}

#[tokio::test(start_paused = true)]
async fn close_cancels_pending_retry() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    transport.latest().fail();
    assert_eq!(socket.state(), ConnectionState::Reconnecting);
    socket.close();
    advance(5_000).await;

    assert_eq!(transport.count(), 1);
    // The dead socket is not asked to close a second time.
    assert!(transport.latest().close_requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn close_while_connecting_cancels_timeout() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect(
        "ws://test",
        fast_config(&transport)
            .connection_timeout(Duration::from_millis(50))
            .build(),
    )
    .unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    socket.close();
    advance(1_000).await;
    settle().await;

    assert_eq!(log.entries(), vec!["close:1006"]);
    assert_eq!(transport.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn no_host_down_after_close() {
    let transport = ScriptedTransport::new();
    let socket =
        ReconnectingSocket::connect("ws://test", fast_config(&transport).max_retries(0).build())
            .unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    socket.close();
    settle().await;

    assert_eq!(log.count("error:EHOSTDOWN"), 0);
    assert_eq!(socket.state(), ConnectionState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn late_close_from_peer_schedules_nothing() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let live = transport.latest();
    live.open();

    // The wrapper is closed, but the peer's close frame only arrives afterwards.
    socket.close();
    live.events().close(resilient_socket::CloseEvent::new(1001, "going away"));
    advance(5_000).await;

    assert_eq!(transport.count(), 1);
    assert_eq!(socket.state(), ConnectionState::Terminated);
}

#[tokio::test(start_paused = true)]
async fn close_twice_is_harmless() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    transport.latest().open();

    socket.close();
    socket.close();

    assert_eq!(transport.latest().close_requests().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn dropping_last_handle_stops_retries() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    transport.latest().fail();
    drop(socket);
    advance(5_000).await;

    assert_eq!(transport.count(), 1);
}
