use crate::core::classifier::{classify, CloseReason};
use crate::core::config::ClientConfig;
use crate::core::connection_state::{AtomicConnectionState, ConnectionState};
use crate::core::interrupt::Interrupt;
use crate::core::metrics::AtomicMetrics;
use crate::traits::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

type ClientStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type ClientSink = SplitSink<ClientStream, WsFrame>;

/// Lifecycle events published by the client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// Connected to the hub
    Connected,
    /// Connection lost for the given reason
    Disconnected(CloseReason),
    /// Dialling again (attempt number, starting at 1)
    Reconnecting(usize),
    /// Error occurred
    Error(String),
    /// Terminal; no further reconnects
    Stopped,
}

/// Client metrics snapshot
#[derive(Debug, Clone)]
pub struct Metrics {
    pub messages_sent: u64,
    pub messages_received: u64,
    pub reconnect_count: u64,
    pub connection_state: ConnectionState,
}

/// How one connection ended
///
/// The per-connection task returns exactly one of these, so a disconnect and
/// an interrupt can never both be reported for the same connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionOutcome {
    Disconnected(CloseReason),
    Interrupted,
}

/// Cloneable handle that queues messages for the connection writer
///
/// Messages queued while disconnected are sent after the next reconnect.
#[derive(Clone)]
pub struct ClientSender {
    tx: mpsc::UnboundedSender<Message>,
}

impl ClientSender {
    pub fn send(&self, message: Message) -> Result<()> {
        self.tx
            .send(message)
            .map_err(|e| WsHubError::ChannelSend(e.to_string()))
    }
}

/// Settings assembled by the builder
pub(crate) struct ClientSettings {
    pub config: ClientConfig,
    pub handler: Option<Arc<dyn ClientMessageHandler>>,
    pub log: Arc<dyn LogHandler>,
    pub codec: Arc<dyn MessageCodec>,
    pub reconnect_strategy: Box<dyn ReconnectionStrategy>,
    pub interrupt: Interrupt,
}

struct Shared {
    settings: ClientSettings,
    url: String,
    state: AtomicConnectionState,
    metrics: AtomicMetrics,
    event_tx: Sender<ClientEvent>,
}

impl Shared {
    fn log(&self, level: LogLevel, message: &str) {
        self.settings.log.log(level, message);
    }

    fn emit(&self, event: ClientEvent) {
        // Nobody listening is fine
        let _ = self.event_tx.send(event);
    }

    fn stop(&self) {
        self.state.set(ConnectionState::Stopped);
        self.emit(ClientEvent::Stopped);
        self.log(LogLevel::Info, "[wshub] Client stopped");
    }

    /// Interrupt with no open transport: nothing to close, stop right away
    fn stop_interrupted(&self) {
        self.state.set(ConnectionState::Interrupted);
        self.log(
            LogLevel::Info,
            "[wshub] Interrupted while disconnected, stopping",
        );
        self.stop();
    }
}

/// Client connector: one outbound session to a hub, reconnected on loss
///
/// ```text
/// DISCONNECTED ─▶ CONNECTING ─▶ CONNECTED ─(read failure)─▶ DISCONNECTED
///        │              │             │                          │
///        └──────────────┴── interrupt ┴──▶ INTERRUPTED ─▶ STOPPED ◀┘ (interrupt)
/// ```
///
/// Use [`WsClient::builder`] to create one.
pub struct WsClient {
    shared: Arc<Shared>,
    outbound_tx: mpsc::UnboundedSender<Message>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    event_rx: Receiver<ClientEvent>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl WsClient {
    pub(crate) fn from_settings(settings: ClientSettings) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = unbounded();

        Self {
            shared: Arc::new(Shared {
                url: settings.config.url(),
                settings,
                state: AtomicConnectionState::new(ConnectionState::Disconnected),
                metrics: AtomicMetrics::new(),
                event_tx,
            }),
            outbound_tx,
            outbound_rx: Mutex::new(Some(outbound_rx)),
            event_rx,
            supervisor: Mutex::new(None),
        }
    }

    /// Dial the hub and start the supervisor
    ///
    /// A failed first dial is returned and nothing is spawned, so `start` may
    /// be called again. Later failures are retried by the supervisor. If the
    /// interrupt fires during the first dial the client stops and `Ok` is
    /// returned.
    pub async fn start(&self) -> Result<()> {
        let outbound_rx = self
            .outbound_rx
            .lock()
            .take()
            .ok_or_else(|| WsHubError::Other("client already started".to_string()))?;

        let shared = &self.shared;
        if shared.settings.interrupt.is_triggered() {
            shared.stop_interrupted();
            return Ok(());
        }

        shared.state.set(ConnectionState::Connecting);
        let ws = tokio::select! {
            biased;
            _ = shared.settings.interrupt.triggered() => {
                shared.stop_interrupted();
                return Ok(());
            }
            dialled = dial(&shared.url) => dialled,
        };

        match ws {
            Ok(ws) => {
                let shared = Arc::clone(&self.shared);
                let handle = tokio::spawn(supervise(shared, ws, outbound_rx));
                *self.supervisor.lock() = Some(handle);
                Ok(())
            }
            Err(e) => {
                shared.state.set(ConnectionState::Disconnected);
                shared.log(
                    LogLevel::Error,
                    &format!("[wshub] Failed to connect to {}: {}", shared.url, e),
                );
                *self.outbound_rx.lock() = Some(outbound_rx);
                Err(e)
            }
        }
    }

    /// Wait until the client reaches STOPPED
    pub async fn wait(&self) {
        let supervisor = self.supervisor.lock().take();
        if let Some(supervisor) = supervisor {
            let _ = supervisor.await;
        }
    }

    /// Fire the interrupt and wait for the client to stop
    pub async fn shutdown(&self) {
        self.shared.settings.interrupt.trigger();
        self.wait().await;
    }

    /// Queue a message for the hub
    pub fn send(&self, message: Message) -> Result<()> {
        self.sender().send(message)
    }

    pub fn sender(&self) -> ClientSender {
        ClientSender {
            tx: self.outbound_tx.clone(),
        }
    }

    /// Lifecycle events; each event is delivered to one receiver clone
    pub fn events(&self) -> Receiver<ClientEvent> {
        self.event_rx.clone()
    }

    /// Try to receive an event (non-blocking)
    pub fn try_recv_event(&self) -> Option<ClientEvent> {
        self.event_rx.try_recv().ok()
    }

    pub fn interrupt(&self) -> &Interrupt {
        &self.shared.settings.interrupt
    }

    #[inline]
    pub fn state(&self) -> ConnectionState {
        self.shared.state.get()
    }

    #[inline]
    pub fn is_connected(&self) -> bool {
        self.shared.state.is_connected()
    }

    pub fn url(&self) -> &str {
        &self.shared.url
    }

    pub fn metrics(&self) -> Metrics {
        let metrics = &self.shared.metrics;
        Metrics {
            messages_sent: metrics.messages_sent(),
            messages_received: metrics.messages_received(),
            reconnect_count: metrics.reconnect_count(),
            connection_state: self.shared.state.get(),
        }
    }
}

async fn dial(url: &str) -> Result<ClientStream> {
    connect_async(url)
        .await
        .map(|(ws, _response)| ws)
        .map_err(|e| WsHubError::Connect(e.to_string()))
}

/// Supervisor: runs connections and reconnects until interrupted
async fn supervise(
    shared: Arc<Shared>,
    first: ClientStream,
    mut outbound_rx: mpsc::UnboundedReceiver<Message>,
) {
    let interrupt = &shared.settings.interrupt;
    let strategy = &shared.settings.reconnect_strategy;
    let mut ws = first;

    'connections: loop {
        match run_connection(&shared, ws, &mut outbound_rx).await {
            ConnectionOutcome::Interrupted => {
                shared.stop();
                return;
            }
            ConnectionOutcome::Disconnected(reason) => {
                shared.state.set(ConnectionState::Disconnected);
                shared.emit(ClientEvent::Disconnected(reason));
                let level = if reason == CloseReason::Unknown {
                    LogLevel::Warn
                } else {
                    LogLevel::Info
                };
                shared.log(level, &format!("[wshub] Disconnected from hub: {}", reason));
            }
        }

        let mut attempt = 0;
        ws = loop {
            let Some(delay) = strategy.next_delay(attempt) else {
                shared.log(
                    LogLevel::Warn,
                    &format!(
                        "[wshub] Reconnection strategy exhausted after {} attempt(s)",
                        attempt
                    ),
                );
                break 'connections;
            };
            attempt += 1;

            shared.log(
                LogLevel::Info,
                &format!("[wshub] Reconnecting in {:?} (attempt {})", delay, attempt),
            );
            tokio::select! {
                biased;
                _ = interrupt.triggered() => {
                    shared.stop_interrupted();
                    return;
                }
                _ = tokio::time::sleep(delay) => {}
            }

            shared.state.set(ConnectionState::Connecting);
            shared.emit(ClientEvent::Reconnecting(attempt));

            let dialled = tokio::select! {
                biased;
                _ = interrupt.triggered() => {
                    shared.stop_interrupted();
                    return;
                }
                dialled = dial(&shared.url) => dialled,
            };

            match dialled {
                Ok(ws) => {
                    shared.metrics.increment_reconnects();
                    break ws;
                }
                Err(e) => {
                    let error = WsHubError::Reconnect {
                        attempt,
                        reason: e.to_string(),
                    };
                    shared.state.set(ConnectionState::Disconnected);
                    shared.log(LogLevel::Error, &format!("[wshub] {}", error));
                    shared.emit(ClientEvent::Error(error.to_string()));
                }
            }
        };
    }

    shared.stop();
}

/// Drive one open connection until it fails or the interrupt fires
async fn run_connection(
    shared: &Shared,
    ws: ClientStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<Message>,
) -> ConnectionOutcome {
    let settings = &shared.settings;
    shared.state.set(ConnectionState::Connected);
    shared.emit(ClientEvent::Connected);
    shared.log(
        LogLevel::Info,
        &format!("[wshub] Connected to {}", shared.url),
    );

    let (mut write, mut read) = ws.split();

    loop {
        tokio::select! {
            biased;

            _ = settings.interrupt.triggered() => return close_on_interrupt(shared, &mut write).await,

            frame = read.next() => match frame {
                Some(Ok(WsFrame::Text(text))) => deliver(shared, &text),
                Some(Ok(WsFrame::Binary(bytes))) => deliver(shared, &String::from_utf8_lossy(&bytes)),
                // Close replies and pongs are handled by the transport; the
                // stream ends right after a close frame
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    let reason = classify(&e);
                    debug!(%reason, error = %e, "Read failed");
                    return ConnectionOutcome::Disconnected(reason);
                }
                None => return ConnectionOutcome::Disconnected(CloseReason::ExpectedClose),
            },

            Some(message) = outbound_rx.recv() => {
                let payload = match settings.codec.encode(&message) {
                    Ok(payload) => payload,
                    Err(e) => {
                        shared.log(LogLevel::Error, &format!("[wshub] Dropping outbound message: {}", e));
                        continue;
                    }
                };
                // A stalled write must not hold off the interrupt
                let deadline = settings.config.write_deadline;
                let sent = tokio::select! {
                    biased;
                    _ = settings.interrupt.triggered() => None,
                    sent = tokio::time::timeout(deadline, write.send(WsFrame::Text(payload))) => Some(sent),
                };
                match sent {
                    None => return close_on_interrupt(shared, &mut write).await,
                    Some(Ok(Ok(()))) => shared.metrics.increment_sent(),
                    Some(Ok(Err(e))) => {
                        let reason = classify(&e);
                        debug!(%reason, error = %e, "Write failed");
                        return ConnectionOutcome::Disconnected(reason);
                    }
                    Some(Err(_)) => {
                        shared.log(
                            LogLevel::Warn,
                            &format!("[wshub] Write deadline of {:?} exceeded", deadline),
                        );
                        return ConnectionOutcome::Disconnected(CloseReason::Unknown);
                    }
                }
            }
        }
    }
}

/// Send a normal-closure frame, wait out the grace period and report the
/// interrupt
///
/// Both steps are bounded by `close_grace`, so a peer that stopped reading
/// cannot delay the stop.
async fn close_on_interrupt(shared: &Shared, write: &mut ClientSink) -> ConnectionOutcome {
    shared.state.set(ConnectionState::Interrupted);
    shared.log(LogLevel::Info, "[wshub] Interrupted, closing connection");

    let grace = shared.settings.config.close_grace;
    let close = WsFrame::Close(Some(CloseFrame {
        code: CloseCode::Normal,
        reason: "".into(),
    }));
    match tokio::time::timeout(grace, write.send(close)).await {
        Ok(Ok(())) => debug!("Close frame sent"),
        Ok(Err(e)) => debug!(error = %e, "Failed to send close frame"),
        Err(_) => debug!("Timed out sending close frame"),
    }
    tokio::time::sleep(grace).await;
    ConnectionOutcome::Interrupted
}

/// Decode an inbound payload and hand it to the message handler
///
/// Payloads that are not a valid envelope are delivered with the raw text as
/// the body.
fn deliver(shared: &Shared, payload: &str) {
    shared.metrics.increment_received();
    let settings = &shared.settings;

    let message = settings.codec.decode(payload).unwrap_or_else(|e| {
        debug!(error = %e, "Delivering undecodable payload as raw text");
        Message {
            body: serde_json::Value::String(payload.to_string()),
            ..Message::default()
        }
    });

    if let Some(handler) = &settings.handler {
        handler.on_message(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::WsClientBuilder;
    use std::time::Duration;

    #[tokio::test]
    async fn test_first_dial_failure_is_returned() {
        // Nothing listens on port 1
        let client = WsClientBuilder::new().address("127.0.0.1:1").build().unwrap();

        let result = client.start().await;
        assert!(matches!(result, Err(WsHubError::Connect(_))));
        assert_eq!(client.state(), ConnectionState::Disconnected);

        // The outbound queue is handed back, so start can be retried
        assert!(matches!(client.start().await, Err(WsHubError::Connect(_))));
    }

    #[tokio::test]
    async fn test_interrupt_before_start_stops_without_dialling() {
        let interrupt = Interrupt::new();
        interrupt.trigger();
        let client = WsClientBuilder::new()
            .address("127.0.0.1:1")
            .interrupt(interrupt)
            .build()
            .unwrap();

        client.start().await.unwrap();
        assert_eq!(client.state(), ConnectionState::Stopped);
        assert_eq!(client.try_recv_event(), Some(ClientEvent::Stopped));
    }

    #[test]
    fn test_undecodable_payload_delivered_raw() {
        let received = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&received);
        let client = WsClientBuilder::new()
            .address("127.0.0.1:1")
            .reconnect_period(Duration::from_millis(10))
            .message_handler(move |message: Message| sink.lock().push(message))
            .build()
            .unwrap();

        deliver(&client.shared, "not json");
        deliver(&client.shared, r#"{"type":0,"sender_id":"hub","body":"hi"}"#);

        let received = received.lock();
        assert_eq!(received[0].body, serde_json::json!("not json"));
        assert_eq!(received[1].sender_id, "hub");
        assert_eq!(client.metrics().messages_received, 2);
    }
}
