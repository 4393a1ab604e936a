//! Common test utilities for wshub integration tests
//!
//! - [`HubServer`]: a real hub behind a `TcpListener` on `127.0.0.1:0`
//! - [`TestPeer`]: a plain tokio-tungstenite peer connecting to a hub
//! - [`MockHubServer`]: a scripted server for client connector tests

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Notify};
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{accept_async, connect_async, MaybeTlsStream, WebSocketStream};
use wshub::{Hub, HubBuilder, LogHandler, LogLevel, Message, PathIdentity};

/// Macro for verbose test output (controlled by TEST_VERBOSE env var)
#[macro_export]
macro_rules! verbose_println {
    ($($arg:tt)*) => {
        if std::env::var("TEST_VERBOSE").is_ok() {
            println!($($arg)*);
        }
    };
}

/// A hub accepting `/connect/{identity}` on an ephemeral port
pub struct HubServer {
    pub addr: SocketAddr,
    pub hub: Hub,
    shutdown: Arc<Notify>,
}

impl HubServer {
    pub async fn start(builder: HubBuilder) -> Self {
        let hub = builder.build().unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Arc::new(Notify::new());

        let accept_hub = hub.clone();
        let accept_shutdown = Arc::clone(&shutdown);
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let hub = accept_hub.clone();
                        tokio::spawn(async move {
                            if let Err(e) = hub.register_with(stream, &PathIdentity::default()).await {
                                verbose_println!("Registration rejected: {}", e);
                            }
                        });
                    }
                    _ = accept_shutdown.notified() => break,
                }
            }
        });

        Self {
            addr,
            hub,
            shutdown,
        }
    }

    pub fn url_for(&self, identity: &str) -> String {
        format!("ws://{}/connect/{}", self.addr, identity)
    }

    /// Connect a peer and wait until the hub has registered it
    pub async fn connect(&self, identity: &str) -> TestPeer {
        let expected = self.hub.metrics().registrations + 1;
        let peer = TestPeer::connect(&self.url_for(identity)).await;
        wait_until(Duration::from_secs(2), || {
            self.hub.metrics().registrations >= expected
        })
        .await;
        peer
    }

    /// Wait until the registry holds exactly `count` sessions
    pub async fn wait_for_sessions(&self, count: usize) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let sessions = self.hub.sessions().await.unwrap();
            if sessions.len() == count {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "expected {} sessions, registry has {:?}",
                count,
                sessions
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl Drop for HubServer {
    fn drop(&mut self) {
        self.shutdown.notify_waiters();
    }
}

/// A raw websocket peer
pub struct TestPeer {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestPeer {
    pub async fn connect(url: &str) -> Self {
        let (ws, _) = connect_async(url).await.unwrap();
        Self { ws }
    }

    /// Next envelope within `timeout`, skipping control frames
    pub async fn recv_message(&mut self, timeout: Duration) -> Option<Message> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let frame = tokio::time::timeout_at(deadline, self.ws.next()).await.ok()??;
            match frame {
                Ok(WsFrame::Text(text)) => return Some(serde_json::from_str(&text).unwrap()),
                Ok(WsFrame::Close(_)) | Err(_) => return None,
                Ok(_) => continue,
            }
        }
    }

    /// Assert nothing arrives within `window`
    pub async fn expect_silence(&mut self, window: Duration) {
        if let Some(message) = self.recv_message(window).await {
            panic!("expected no message, got {:?}", message);
        }
    }

    pub async fn send(&mut self, message: &Message) {
        let text = serde_json::to_string(message).unwrap();
        self.ws.send(WsFrame::Text(text)).await.unwrap();
    }

    pub async fn send_raw(&mut self, text: &str) {
        self.ws.send(WsFrame::Text(text.to_string())).await.unwrap();
    }

    /// True once the hub has closed the connection
    pub async fn is_closed_within(&mut self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            match tokio::time::timeout_at(deadline, self.ws.next()).await {
                Err(_) => return false,
                Ok(None) | Ok(Some(Err(_))) | Ok(Some(Ok(WsFrame::Close(_)))) => return true,
                Ok(Some(Ok(_))) => continue,
            }
        }
    }

    /// Keep reading in the background so pings are answered
    pub fn spawn_reader(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { while let Some(Ok(_)) = self.ws.next().await {} })
    }

    pub fn into_inner(self) -> WebSocketStream<MaybeTlsStream<TcpStream>> {
        self.ws
    }
}

/// Poll `condition` every 10ms until it holds, panicking after `timeout`
pub async fn wait_until<F: Fn() -> bool>(timeout: Duration, condition: F) {
    let deadline = tokio::time::Instant::now() + timeout;
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met within {:?}",
            timeout
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Debug, Clone)]
enum ServerCommand {
    Send(String),
    /// Drop every connection without a close handshake
    Kick,
}

/// Scripted server for client connector tests
///
/// Counts accepted connections, records the code of every close frame and
/// the text frames received from clients. A stalled server upgrades each
/// connection and then never reads from it.
pub struct MockHubServer {
    pub addr: SocketAddr,
    connections: Arc<AtomicUsize>,
    close_codes: Arc<Mutex<Vec<Option<u16>>>>,
    received: Arc<Mutex<Vec<String>>>,
    commands: broadcast::Sender<ServerCommand>,
    shutdown: Arc<Notify>,
}

impl MockHubServer {
    /// Create and start a new mock server
    pub async fn start() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap(), false).await
    }

    /// Server that stops reading right after the upgrade
    pub async fn start_stalled() -> Self {
        Self::start_on("127.0.0.1:0".parse().unwrap(), true).await
    }

    /// Start on a fixed address, e.g. to bring a server back on its old port
    pub async fn start_on(addr: SocketAddr, stalled: bool) -> Self {
        let listener = TcpListener::bind(addr).await.unwrap();
        let addr = listener.local_addr().unwrap();
        Self::serve(listener, addr, stalled)
    }

    fn serve(listener: TcpListener, addr: SocketAddr, stalled: bool) -> Self {
        let connections = Arc::new(AtomicUsize::new(0));
        let close_codes = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(Vec::new()));
        let (commands, _) = broadcast::channel(64);
        let shutdown = Arc::new(Notify::new());

        let server = Self {
            addr,
            connections: Arc::clone(&connections),
            close_codes: Arc::clone(&close_codes),
            received: Arc::clone(&received),
            commands: commands.clone(),
            shutdown: Arc::clone(&shutdown),
        };

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.notified() => break,
                    result = listener.accept() => {
                        let Ok((stream, _)) = result else { break };
                        let subscription = commands.subscribe();
                        connections.fetch_add(1, Ordering::SeqCst);
                        if stalled {
                            tokio::spawn(Self::hold_connection(stream, subscription));
                        } else {
                            tokio::spawn(Self::handle_connection(
                                stream,
                                Arc::clone(&close_codes),
                                Arc::clone(&received),
                                subscription,
                            ));
                        }
                    }
                }
            }
        });

        server
    }

    async fn handle_connection(
        stream: TcpStream,
        close_codes: Arc<Mutex<Vec<Option<u16>>>>,
        received: Arc<Mutex<Vec<String>>>,
        mut commands: broadcast::Receiver<ServerCommand>,
    ) {
        let ws = match accept_async(stream).await {
            Ok(ws) => ws,
            Err(e) => {
                eprintln!("WebSocket handshake failed: {}", e);
                return;
            }
        };
        let (mut write, mut read) = ws.split();

        loop {
            tokio::select! {
                frame = read.next() => match frame {
                    Some(Ok(WsFrame::Close(frame))) => {
                        close_codes.lock().push(frame.map(|f| u16::from(f.code)));
                    }
                    Some(Ok(WsFrame::Text(text))) => received.lock().push(text),
                    Some(Ok(_)) => {}
                    Some(Err(_)) | None => break,
                },
                command = commands.recv() => match command {
                    Ok(ServerCommand::Send(text)) => {
                        if write.send(WsFrame::Text(text)).await.is_err() {
                            break;
                        }
                    }
                    Ok(ServerCommand::Kick) | Err(_) => break,
                },
            }
        }
    }

    /// Keep the upgraded connection open without ever reading from it
    async fn hold_connection(stream: TcpStream, mut commands: broadcast::Receiver<ServerCommand>) {
        let Ok(_ws) = accept_async(stream).await else {
            return;
        };
        loop {
            match commands.recv().await {
                Ok(ServerCommand::Send(_)) => continue,
                Ok(ServerCommand::Kick) | Err(_) => break,
            }
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn close_frames(&self) -> usize {
        self.close_codes.lock().len()
    }

    /// Close codes in arrival order; `None` for a close frame without payload
    pub fn close_codes(&self) -> Vec<Option<u16>> {
        self.close_codes.lock().clone()
    }

    /// Text frames received from clients so far
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Send a text frame to every connected client
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.commands.send(ServerCommand::Send(text.into()));
    }

    /// Drop every open connection abruptly
    pub fn kick_all(&self) {
        let _ = self.commands.send(ServerCommand::Kick);
    }
}

impl Drop for MockHubServer {
    fn drop(&mut self) {
        self.kick_all();
        // Stored as a permit if the accept loop is not parked right now
        self.shutdown.notify_one();
    }
}

/// Log handler that keeps every line for later assertions
#[derive(Clone, Default)]
pub struct CapturedLog {
    lines: Arc<Mutex<Vec<(LogLevel, String)>>>,
}

impl CapturedLog {
    pub fn contains(&self, needle: &str) -> bool {
        self.lines.lock().iter().any(|(_, line)| line.contains(needle))
    }

    pub fn lines(&self) -> Vec<(LogLevel, String)> {
        self.lines.lock().clone()
    }
}

impl LogHandler for CapturedLog {
    fn log(&self, level: LogLevel, message: &str) {
        verbose_println!("  log [{}] {}", level, message);
        self.lines.lock().push((level, message.to_string()));
    }
}

/// A broadcast from `hub` with a 1 MiB body, enough to fill socket buffers
/// quickly when the peer is not reading
pub fn large_broadcast(seq: usize) -> Message {
    Message::broadcast("hub", "x".repeat(1 << 20)).with_title(seq.to_string())
}
