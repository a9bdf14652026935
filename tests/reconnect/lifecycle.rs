use std::sync::{Arc, Mutex};

use resilient_socket::{
    BinaryType, ConnectionState, Error, Message, ReadyState, ReconnectingSocket, Socket,
};

use super::support::*;

#[tokio::test(start_paused = true)]
async fn connects_on_construction() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::new(
        "ws://feed.local/stream",
        ["v1.json", "v0.json"],
        fast_config(&transport).build(),
    )
    .unwrap();

    assert_eq!(transport.count(), 1);
    assert_eq!(
        transport.latest().protocols(),
        vec!["v1.json".to_string(), "v0.json".to_string()]
    );
    assert_eq!(socket.state(), ConnectionState::Connecting);
    assert_eq!(socket.ready_state(), ReadyState::Connecting);
    assert_eq!(socket.url(), "ws://feed.local/stream");
}

#[tokio::test(start_paused = true)]
async fn open_moves_to_connected() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    transport.latest().open();

    assert_eq!(socket.state(), ConnectionState::Connected);
    assert_eq!(socket.ready_state(), ReadyState::Open);
    assert_eq!(log.entries(), vec!["open"]);
}

#[tokio::test(start_paused = true)]
async fn open_resets_retries_and_delay() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    transport.latest().fail();
    assert_eq!(socket.retry_count(), 1);
    advance(201).await;
    transport.latest().fail();
    assert_eq!(socket.retry_count(), 2);
    assert!(socket.reconnect_delay().is_some());

    advance(401).await;
    assert_eq!(transport.count(), 3);
    transport.latest().open();

    assert_eq!(socket.retry_count(), 0);
    assert_eq!(socket.reconnect_delay(), None);
}

#[tokio::test(start_paused = true)]
async fn passthrough_follows_live_socket() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    transport.latest().open_with_protocol("chat");
    transport.latest().set_buffered(42);
    assert_eq!(socket.protocol(), "chat");
    assert_eq!(socket.buffered_amount(), 42);

    transport.latest().fail();
    assert_eq!(socket.ready_state(), ReadyState::Closed);
    advance(201).await;
    assert_eq!(transport.count(), 2);

    // Reads now go to the replacement socket.
    assert_eq!(socket.protocol(), "");
    assert_eq!(socket.buffered_amount(), 0);
    assert_eq!(socket.ready_state(), ReadyState::Connecting);
}

#[tokio::test(start_paused = true)]
async fn binary_type_survives_reconnect() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    socket.set_binary_type(BinaryType::ArrayBuffer);
    assert_eq!(transport.socket(0).binary_type(), BinaryType::ArrayBuffer);

    transport.latest().fail();
    advance(201).await;
    assert_eq!(transport.count(), 2);
    assert_eq!(transport.socket(1).binary_type(), BinaryType::ArrayBuffer);
}

#[tokio::test(start_paused = true)]
async fn send_goes_to_live_socket() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    assert!(matches!(socket.send("too early"), Err(Error::NotConnected)));

    transport.latest().open();
    socket.send("one").unwrap();
    socket.send(vec![7u8]).unwrap();
    assert_eq!(
        transport.latest().sent(),
        vec![Message::from("one"), Message::Binary(vec![7])]
    );

    transport.latest().fail();
    assert!(matches!(socket.send("lost"), Err(Error::NotConnected)));
}

#[tokio::test(start_paused = true)]
async fn transport_errors_are_forwarded_immediately() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    transport.latest().open();
    transport.latest().transport_error("tls alert");

    assert_eq!(log.entries(), vec!["open", "error:tls alert"]);
}

#[tokio::test(start_paused = true)]
async fn state_changes_are_reported() {
    let transport = ScriptedTransport::new();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&transitions);
    let socket = ReconnectingSocket::connect(
        "ws://test",
        fast_config(&transport)
            .on_state_change(move |from, to| seen.lock().unwrap().push((from, to)))
            .build(),
    )
    .unwrap();

    transport.latest().open();
    transport.latest().fail();
    advance(201).await;

    use ConnectionState::*;
    assert_eq!(
        *transitions.lock().unwrap(),
        vec![
            (Connecting, Connected),
            (Connected, Reconnecting),
            (Reconnecting, Connecting),
        ]
    );
    assert_eq!(socket.state(), Connecting);
}

#[tokio::test(start_paused = true)]
async fn factory_failure_on_retry_counts_as_failed_attempt() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    transport.refuse_connections(true);
    transport.latest().fail();
    advance(201).await;

    // The refused attempt closed abnormally and another retry is pending.
    assert_eq!(socket.retry_count(), 2);
    assert_eq!(socket.state(), ConnectionState::Reconnecting);
    assert_eq!(log.entries(), vec!["close:1006", "close:1006"]);

    transport.refuse_connections(false);
    advance(401).await;
    assert_eq!(transport.count(), 2);
    transport.latest().open();
    assert_eq!(socket.state(), ConnectionState::Connected);
}

#[tokio::test(start_paused = true)]
async fn superseded_socket_is_ignored() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    let first = transport.latest();
    first.fail();
    advance(201).await;
    assert_eq!(transport.count(), 2);
    log.clear();

    first.open();
    first.receive("stale");
    first.close_remote(1000, "late");
    first.events().close(resilient_socket::CloseEvent::abnormal());

    assert!(log.entries().is_empty());
    assert_eq!(socket.state(), ConnectionState::Connecting);
    assert_eq!(socket.retry_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_close_counts_once() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    log.attach(&socket);

    let live = transport.latest();
    live.fail();
    live.events().close(resilient_socket::CloseEvent::abnormal());

    assert_eq!(socket.retry_count(), 1);
    assert_eq!(log.count("close:1006"), 1);
}
