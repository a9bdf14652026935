use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use resilient_socket::{
    EventType, ListenerOptions, ReconnectingSocket, SocketEvent, listener,
};

use super::support::*;

/// Drops the live socket and waits for the replacement.
async fn cycle(transport: &ScriptedTransport) {
    let before = transport.count();
    transport.latest().fail();
    advance(1001).await;
    assert_eq!(transport.count(), before + 1);
}

#[tokio::test(start_paused = true)]
async fn duplicate_registration_survives_reconnects_once() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let on_message = listener(move |_: &SocketEvent| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    socket.add_event_listener(EventType::Message, Arc::clone(&on_message), Default::default());
    socket.add_event_listener(EventType::Message, Arc::clone(&on_message), Default::default());
    assert_eq!(socket.listener_count(EventType::Message), 1);

    cycle(&transport).await;
    cycle(&transport).await;
    transport.latest().open();
    transport.latest().receive("tick");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn removal_is_permanent() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let on_message = socket.on(EventType::Message, move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    transport.latest().open();
    transport.latest().receive("before");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    socket.remove_event_listener(EventType::Message, &on_message, ListenerOptions::default());
    transport.latest().receive("after removal");
    cycle(&transport).await;
    transport.latest().open();
    transport.latest().receive("after reconnect");

    assert_eq!(hits.load(Ordering::SeqCst), 1);
    assert_eq!(socket.listener_count(EventType::Message), 0);
}

#[tokio::test(start_paused = true)]
async fn same_listener_on_several_kinds() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    let shared = log.listener();
    socket.add_event_listener(EventType::Open, Arc::clone(&shared), Default::default());
    socket.add_event_listener(EventType::Close, Arc::clone(&shared), Default::default());

    socket.remove_event_listener(EventType::Open, &shared, Default::default());
    transport.latest().open();
    transport.latest().fail();

    assert_eq!(log.entries(), vec!["close:1006"]);
}

#[tokio::test(start_paused = true)]
async fn removal_matches_identity_not_options() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    let once = log.listener();
    socket.add_event_listener(EventType::Open, Arc::clone(&once), ListenerOptions::once());
    assert_eq!(socket.listener_count(EventType::Open), 1);

    socket.remove_event_listener(EventType::Open, &once, ListenerOptions::default());
    assert_eq!(socket.listener_count(EventType::Open), 0);

    transport.latest().open();
    assert!(log.entries().is_empty());
}

#[tokio::test(start_paused = true)]
async fn listeners_run_in_registration_order() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let order = Arc::new(Mutex::new(Vec::new()));

    for id in 0..3 {
        let order = Arc::clone(&order);
        socket.on(EventType::Open, move |_| order.lock().unwrap().push(id));
    }
    transport.latest().open();

    assert_eq!(*order.lock().unwrap(), vec![0, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn once_listener_fires_a_single_time() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();
    socket.add_event_listener(EventType::Open, log.listener(), ListenerOptions::once());

    transport.latest().open();
    cycle(&transport).await;
    transport.latest().open();

    assert_eq!(log.entries(), vec!["open"]);
    assert_eq!(socket.listener_count(EventType::Open), 0);
}

#[tokio::test(start_paused = true)]
async fn panicking_listener_does_not_stop_others() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    let log = EventLog::new();

    socket.on(EventType::Message, |_| panic!("listener bug"));
    socket.add_event_listener(EventType::Message, log.listener(), Default::default());

    transport.latest().open();
    transport.latest().receive("still delivered");

    assert_eq!(log.entries(), vec!["message:still delivered"]);
}

#[tokio::test(start_paused = true)]
async fn listener_may_close_from_callback() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();

    let handle = socket.clone();
    socket.on(EventType::Close, move |_| handle.close());

    transport.latest().open();
    transport.latest().fail();
    advance(2000).await;

    assert_eq!(socket.state(), resilient_socket::ConnectionState::Terminated);
    assert_eq!(transport.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn listener_added_mid_connection_sees_later_events() {
    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect("ws://test", fast_config(&transport).build()).unwrap();
    transport.latest().open();

    let log = EventLog::new();
    log.attach(&socket);
    transport.latest().receive("hello");
    transport.latest().fail();

    assert_eq!(log.entries(), vec!["message:hello", "close:1006"]);
}
