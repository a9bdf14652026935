//! Reconnecting socket metrics regression tests

use super::helpers::*;
use super::support::{ScriptedTransport, fast_config, settle};
use resilient_socket::ReconnectingSocket;
use serial_test::serial;
use std::time::Duration;

#[tokio::test(start_paused = true)]
#[serial]
async fn socket_metrics_exist() {
    init_recorder();

    let transport = ScriptedTransport::new();
    let socket = ReconnectingSocket::connect(
        "ws://test",
        fast_config(&transport).name("metrics_socket").build(),
    )
    .unwrap();

    transport.latest().open();
    transport.latest().fail();
    tokio::time::sleep(Duration::from_millis(1001)).await;

    assert_counter_exists("socket_connect_attempts_total");
    assert_metric_has_label("socket_connect_attempts_total", "socket", "metrics_socket");
    assert_eq!(
        counter_value("socket_connect_attempts_total", "socket", "metrics_socket"),
        2
    );

    assert_counter_exists("socket_reconnects_scheduled_total");
    assert_metric_has_label("socket_reconnects_scheduled_total", "socket", "metrics_socket");

    assert_gauge_exists("socket_state");
    assert_metric_has_label("socket_state", "state", "connected");
    assert_metric_has_label("socket_state", "state", "reconnecting");

    socket.close();
}

#[tokio::test(start_paused = true)]
#[serial]
async fn socket_error_metrics() {
    init_recorder();

    let transport = ScriptedTransport::new();
    let _socket = ReconnectingSocket::connect(
        "ws://test",
        fast_config(&transport)
            .name("failing_socket")
            .connection_timeout(Duration::from_millis(50))
            .max_retries(0)
            .build(),
    )
    .unwrap();

    tokio::time::sleep(Duration::from_millis(51)).await;
    settle().await;

    assert_counter_exists("socket_errors_total");
    assert_metric_has_label("socket_errors_total", "socket", "failing_socket");
    assert_metric_has_label("socket_errors_total", "code", "ETIMEDOUT");
    assert_metric_has_label("socket_errors_total", "code", "EHOSTDOWN");
}
