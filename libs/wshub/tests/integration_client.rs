//! Integration tests for the client connector
//!
//! Reconnect timing, interrupt handling and end-to-end delivery through a
//! real hub.

#[macro_use]
mod common;

use common::{large_broadcast, wait_until, CapturedLog, HubServer, MockHubServer};
use crossbeam_channel::Receiver;
use serde_json::json;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use wshub::{ClientEvent, CloseReason, ConnectionState, Hub, LogLevel, Message, WsClient};

const EVENT_TIMEOUT: Duration = Duration::from_secs(3);

/// Poll the event channel until `matches` accepts an event
///
/// Returns the instant the event was observed.
async fn wait_for_event<F>(events: &Receiver<ClientEvent>, matches: F) -> Instant
where
    F: Fn(&ClientEvent) -> bool,
{
    let deadline = Instant::now() + EVENT_TIMEOUT;
    loop {
        while let Ok(event) = events.try_recv() {
            verbose_println!("  event: {:?}", event);
            if matches(&event) {
                return Instant::now();
            }
        }
        assert!(Instant::now() < deadline, "event not observed in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_reconnects_after_period_and_resumes_delivery() {
    let server = MockHubServer::start().await;
    let (tx, mut received) = mpsc::unbounded_channel();
    let period = Duration::from_millis(300);

    let client = WsClient::builder()
        .address(server.addr.to_string())
        .path("/connect/c1")
        .reconnect_period(period)
        .message_handler(move |message: Message| {
            let _ = tx.send(message);
        })
        .build()
        .unwrap();
    let events = client.events();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    verbose_println!("Kicking client...");
    server.kick_all();
    let disconnected_at =
        wait_for_event(&events, |e| matches!(e, ClientEvent::Disconnected(_))).await;
    let connected_at = wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    let gap = connected_at - disconnected_at;
    verbose_println!("Reconnected after {:?}", gap);
    assert!(gap >= period - Duration::from_millis(20), "reconnected too early: {:?}", gap);
    assert!(gap < period * 4, "reconnected too late: {:?}", gap);
    assert_eq!(server.connections(), 2);
    assert_eq!(client.metrics().reconnect_count, 1);

    let envelope = serde_json::to_string(&Message::broadcast("hub", "welcome back")).unwrap();
    server.send_text(envelope);
    let message = tokio::time::timeout(EVENT_TIMEOUT, received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.body, json!("welcome back"));

    client.shutdown().await;
    assert_eq!(client.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_interrupt_sends_one_close_frame_and_stops() {
    let server = MockHubServer::start().await;
    let client = WsClient::builder()
        .address(server.addr.to_string())
        .reconnect_period(Duration::from_millis(100))
        .close_grace(Duration::from_millis(100))
        .build()
        .unwrap();
    let events = client.events();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    client.interrupt().trigger();
    tokio::time::timeout(EVENT_TIMEOUT, client.wait())
        .await
        .unwrap();
    assert_eq!(client.state(), ConnectionState::Stopped);

    wait_until(EVENT_TIMEOUT, || server.close_frames() == 1).await;
    // Normal closure
    assert_eq!(server.close_codes(), vec![Some(1000)]);

    // Several reconnect periods later nothing has dialled again
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(server.connections(), 1);
    assert_eq!(server.close_frames(), 1);

    let remaining: Vec<_> = events.try_iter().collect();
    assert!(remaining.contains(&ClientEvent::Stopped));
    assert!(!remaining
        .iter()
        .any(|e| matches!(e, ClientEvent::Reconnecting(_))));
}

#[tokio::test]
async fn test_interrupt_while_waiting_to_reconnect() {
    let server = MockHubServer::start().await;
    let log = CapturedLog::default();
    let client = WsClient::builder()
        .address(server.addr.to_string())
        .reconnect_period(Duration::from_secs(30))
        .log_handler(log.clone())
        .build()
        .unwrap();
    let events = client.events();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;
    server.kick_all();
    wait_for_event(&events, |e| matches!(e, ClientEvent::Disconnected(_))).await;

    client.interrupt().trigger();
    tokio::time::timeout(Duration::from_secs(1), client.wait())
        .await
        .unwrap();
    assert!(log.contains("Interrupted while disconnected"));

    assert_eq!(client.state(), ConnectionState::Stopped);
    assert_eq!(server.connections(), 1);
    // No transport was open, so there was nothing to send a close frame on
    assert_eq!(server.close_frames(), 0);
}

#[tokio::test]
async fn test_sender_writes_to_server() {
    let server = MockHubServer::start().await;
    let client = WsClient::builder()
        .address(server.addr.to_string())
        .close_grace(Duration::from_millis(50))
        .build()
        .unwrap();
    let events = client.events();
    let sender = client.sender();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    sender
        .send(Message::broadcast("c1", "hello").with_action("77"))
        .unwrap();
    wait_until(EVENT_TIMEOUT, || !server.received().is_empty()).await;

    let sent: Message = serde_json::from_str(&server.received()[0]).unwrap();
    assert_eq!(sent.sender_id, "c1");
    assert_eq!(sent.action, "77");
    assert_eq!(client.metrics().messages_sent, 1);

    client.shutdown().await;
}

#[tokio::test]
async fn test_clients_exchange_through_hub() {
    let server = HubServer::start(Hub::builder()).await;
    let (tx, mut received) = mpsc::unbounded_channel();

    let alice = WsClient::builder()
        .address(server.addr.to_string())
        .path("/connect/alice")
        .close_grace(Duration::from_millis(50))
        .build()
        .unwrap();
    let bob = WsClient::builder()
        .address(server.addr.to_string())
        .path("/connect/bob")
        .close_grace(Duration::from_millis(50))
        .message_handler(move |message: Message| {
            let _ = tx.send(message);
        })
        .build()
        .unwrap();

    alice.start().await.unwrap();
    bob.start().await.unwrap();
    server.wait_for_sessions(2).await;

    server
        .hub
        .push_message(Message::targeted("alice", ["bob"], "hi bob"))
        .unwrap();

    let message = tokio::time::timeout(EVENT_TIMEOUT, received.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(message.sender_id, "alice");
    assert_eq!(message.body, json!("hi bob"));

    alice.shutdown().await;
    bob.shutdown().await;
    server.wait_for_sessions(0).await;
}

#[tokio::test]
async fn test_interrupt_wins_over_stalled_write() {
    let server = MockHubServer::start_stalled().await;
    let client = WsClient::builder()
        .address(server.addr.to_string())
        .reconnect_period(Duration::from_millis(100))
        .close_grace(Duration::from_millis(200))
        .build()
        .unwrap();
    let events = client.events();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    // The server never reads, so the socket buffers fill and a write blocks
    for seq in 0..64 {
        client.send(large_broadcast(seq)).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(300)).await;
    verbose_println!("Sent before interrupt: {}", client.metrics().messages_sent);
    assert!(client.metrics().messages_sent < 64);

    client.interrupt().trigger();
    tokio::time::timeout(EVENT_TIMEOUT, client.wait())
        .await
        .expect("client did not stop while a write was stalled");
    assert_eq!(client.state(), ConnectionState::Stopped);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.connections(), 1);
}

#[tokio::test]
async fn test_write_deadline_drops_connection() {
    let server = MockHubServer::start_stalled().await;
    let log = CapturedLog::default();
    let client = WsClient::builder()
        .address(server.addr.to_string())
        .reconnect_period(Duration::from_secs(30))
        .write_deadline(Duration::from_millis(200))
        .log_handler(log.clone())
        .build()
        .unwrap();
    let events = client.events();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    for seq in 0..64 {
        client.send(large_broadcast(seq)).unwrap();
    }
    wait_for_event(&events, |e| {
        *e == ClientEvent::Disconnected(CloseReason::Unknown)
    })
    .await;
    assert!(log
        .lines()
        .iter()
        .any(|(level, line)| *level == LogLevel::Warn && line.contains("Write deadline")));

    client.shutdown().await;
    assert_eq!(client.state(), ConnectionState::Stopped);
}

#[tokio::test]
async fn test_retries_failed_dials_until_server_returns() {
    let server = MockHubServer::start().await;
    let addr = server.addr;
    let log = CapturedLog::default();
    let client = WsClient::builder()
        .address(addr.to_string())
        .reconnect_period(Duration::from_millis(100))
        .close_grace(Duration::from_millis(50))
        .log_handler(log.clone())
        .build()
        .unwrap();
    let events = client.events();

    client.start().await.unwrap();
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;

    verbose_println!("Taking the server down...");
    drop(server);
    wait_for_event(&events, |e| matches!(e, ClientEvent::Disconnected(_))).await;
    wait_for_event(&events, |e| matches!(e, ClientEvent::Error(_))).await;
    wait_for_event(&events, |e| matches!(e, ClientEvent::Error(_))).await;

    verbose_println!("Bringing the server back on {}", addr);
    let server = MockHubServer::start_on(addr, false).await;
    wait_for_event(&events, |e| *e == ClientEvent::Connected).await;
    assert_eq!(server.connections(), 1);

    // Only the successful dial counts as a reconnect
    assert_eq!(client.metrics().reconnect_count, 1);
    assert!(log.contains("Reconnecting in"));
    assert!(log.contains("Reconnect attempt"));

    client.shutdown().await;
}
