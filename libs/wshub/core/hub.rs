//! The hub: a router task owning the session registry
//!
//! ```text
//!  register_*() ─┐
//!  read loops ───┼─ unregister ─┐
//!  push_message ─┼─ messages ───┼──▶ router task ──▶ per-session queues
//!  sessions() ───┴─ commands ───┘     (registry)
//! ```
//!
//! The registry is touched only by the router task. Its intakes are polled
//! with a fixed priority (commands, registrations, unregistrations, then
//! messages) so a session registered and unregistered in quick succession is
//! always seen in that order.

use crate::core::config::{DeliveryPolicy, HubConfig};
use crate::core::correlation::PendingReplies;
use crate::core::heartbeat::SessionTiming;
use crate::core::metrics::{AtomicHubMetrics, HubMetrics};
use crate::core::session::{
    outbound_queue, spawn_session, Delivery, OutboundSender, SessionContext, SessionHandle,
    SessionHooks, SessionId,
};
use crate::traits::{
    CloseObserver, JsonCodec, LogHandler, LogLevel, Message, MessageCodec, MessageReceiver,
    PongObserver, Result, TracingLog, WsHubError,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::{accept_async, accept_hdr_async, WebSocketStream};

/// Derives a session identity from the upgrade request path
pub trait IdentityExtractor: Send + Sync {
    fn identity(&self, path: &str) -> Option<String>;
}

/// Takes the identity from the path segment following a fixed prefix
///
/// With the default prefix `/connect/`, a request for `/connect/alice`
/// yields `alice`. Empty identities and nested segments are rejected.
#[derive(Debug, Clone)]
pub struct PathIdentity {
    prefix: String,
}

impl PathIdentity {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl Default for PathIdentity {
    fn default() -> Self {
        Self::new("/connect/")
    }
}

impl IdentityExtractor for PathIdentity {
    fn identity(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() || rest.contains('/') {
            return None;
        }
        Some(rest.to_string())
    }
}

impl<F> IdentityExtractor for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn identity(&self, path: &str) -> Option<String> {
        self(path)
    }
}

enum RouterCommand {
    Snapshot(oneshot::Sender<Vec<SessionHandle>>),
    Shutdown,
}

struct Registration {
    handle: SessionHandle,
    outbound: OutboundSender,
}

struct RegistryEntry {
    handle: SessionHandle,
    /// Dropping this closes the session's outbound queue
    outbound: OutboundSender,
}

struct Router {
    registry: HashMap<SessionId, RegistryEntry>,
    codec: Arc<dyn MessageCodec>,
    policy: DeliveryPolicy,
    log: Arc<dyn LogHandler>,
    metrics: Arc<AtomicHubMetrics>,
    command_rx: mpsc::UnboundedReceiver<RouterCommand>,
    register_rx: mpsc::UnboundedReceiver<Registration>,
    unregister_rx: mpsc::UnboundedReceiver<SessionId>,
    message_rx: mpsc::UnboundedReceiver<Message>,
}

impl Router {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                command = self.command_rx.recv() => match command {
                    Some(RouterCommand::Snapshot(reply)) => {
                        let sessions = self.registry.values().map(|e| e.handle.clone()).collect();
                        let _ = reply.send(sessions);
                    }
                    // Every Hub handle dropped counts as a shutdown
                    Some(RouterCommand::Shutdown) | None => break,
                },
                Some(registration) = self.register_rx.recv() => self.register(registration),
                Some(id) = self.unregister_rx.recv() => self.unregister(id),
                Some(message) = self.message_rx.recv() => self.route(message).await,
                else => break,
            }
        }

        let remaining = self.registry.len();
        self.registry.clear();
        self.log.log(
            LogLevel::Info,
            &format!("[wshub] Router stopped, closed {} session(s)", remaining),
        );
    }

    fn register(&mut self, registration: Registration) {
        let Registration { handle, outbound } = registration;

        let duplicates = self
            .registry
            .values()
            .filter(|e| e.handle.identity() == handle.identity())
            .count();
        if duplicates > 0 {
            self.log.log(
                LogLevel::Warn,
                &format!(
                    "[wshub] Identity '{}' already has {} session(s); each one receives its messages",
                    handle.identity(),
                    duplicates
                ),
            );
        }

        self.metrics.record_registration();
        self.log.log(
            LogLevel::Info,
            &format!(
                "[wshub] Registered session {} ({})",
                handle.id(),
                handle.identity()
            ),
        );
        self.registry
            .insert(handle.id(), RegistryEntry { handle, outbound });
    }

    fn unregister(&mut self, id: SessionId) {
        match self.registry.remove(&id) {
            Some(entry) => {
                self.metrics.record_unregistration();
                self.log.log(
                    LogLevel::Info,
                    &format!(
                        "[wshub] Unregistered session {} ({})",
                        id,
                        entry.handle.identity()
                    ),
                );
            }
            None => self.log.log(
                LogLevel::Debug,
                &format!("[wshub] Ignoring unregister for unknown session {}", id),
            ),
        }
    }

    async fn route(&mut self, message: Message) {
        self.metrics.record_routed();

        // Encode once; every recipient shares the same payload
        let payload: Arc<str> = match self.codec.encode(&message) {
            Ok(encoded) => Arc::from(encoded),
            Err(e) => {
                self.metrics.record_marshal_failure();
                self.log.log(
                    LogLevel::Error,
                    &format!(
                        "[wshub] Dropping message from '{}': {}",
                        message.sender_id, e
                    ),
                );
                return;
            }
        };

        for entry in self.registry.values() {
            if !message.is_deliverable_to(entry.handle.identity()) {
                continue;
            }
            match entry.outbound.deliver(Arc::clone(&payload), self.policy).await {
                Delivery::Queued => self.metrics.record_delivery(),
                Delivery::Dropped => {
                    self.metrics.record_dropped();
                    self.log.log(
                        LogLevel::Warn,
                        &format!(
                            "[wshub] Outbound queue full for session {} ({}), message dropped",
                            entry.handle.id(),
                            entry.handle.identity()
                        ),
                    );
                }
                Delivery::Closed => self.log.log(
                    LogLevel::Debug,
                    &format!(
                        "[wshub] Session {} is closing, skipping delivery",
                        entry.handle.id()
                    ),
                ),
            }
        }
    }
}

struct HubInner {
    config: HubConfig,
    timing: SessionTiming,
    hooks: Arc<SessionHooks>,
    metrics: Arc<AtomicHubMetrics>,
    next_id: AtomicU64,
    command_tx: mpsc::UnboundedSender<RouterCommand>,
    register_tx: mpsc::UnboundedSender<Registration>,
    unregister_tx: mpsc::UnboundedSender<SessionId>,
    message_tx: mpsc::UnboundedSender<Message>,
    router: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running hub
///
/// Cheap to clone; all clones drive the same router. The router stops when
/// [`Hub::shutdown`] is called or the last clone is dropped.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    /// Upgrade an accepted connection and register it under `identity`
    pub async fn register_session<S>(
        &self,
        identity: impl Into<String>,
        stream: S,
    ) -> Result<SessionHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws = accept_async(stream)
            .await
            .map_err(|e| WsHubError::Handshake(e.to_string()))?;
        self.register_upgraded(identity, ws)
    }

    /// Upgrade an accepted connection, deriving its identity from the request
    ///
    /// Requests the extractor rejects are answered with HTTP 400 and no session
    /// is created.
    pub async fn register_with<S, E>(&self, stream: S, extractor: &E) -> Result<SessionHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        E: IdentityExtractor + ?Sized,
    {
        let mut identity = None;
        let callback = |request: &Request, response: Response| {
            match extractor.identity(request.uri().path()) {
                Some(found) => {
                    identity = Some(found);
                    Ok(response)
                }
                None => {
                    let mut rejection =
                        ErrorResponse::new(Some("missing session identity".to_string()));
                    *rejection.status_mut() = StatusCode::BAD_REQUEST;
                    Err(rejection)
                }
            }
        };

        let ws = accept_hdr_async(stream, callback)
            .await
            .map_err(|e| WsHubError::Handshake(e.to_string()))?;
        let identity = identity
            .ok_or_else(|| WsHubError::Handshake("missing session identity".to_string()))?;
        self.register_upgraded(identity, ws)
    }

    /// Register an already upgraded connection and start its loops
    pub fn register_upgraded<S>(
        &self,
        identity: impl Into<String>,
        ws: WebSocketStream<S>,
    ) -> Result<SessionHandle>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let inner = &self.inner;
        let id = SessionId::new(inner.next_id.fetch_add(1, Ordering::Relaxed));
        let handle = SessionHandle::new(id, identity.into());
        let (outbound_tx, outbound_rx) = outbound_queue(inner.config.queue_capacity);

        inner
            .register_tx
            .send(Registration {
                handle: handle.clone(),
                outbound: outbound_tx,
            })
            .map_err(|_| WsHubError::ChannelSend("hub router is not running".to_string()))?;

        let ctx = SessionContext {
            handle: handle.clone(),
            timing: inner.timing,
            hooks: Arc::clone(&inner.hooks),
            unregister_tx: inner.unregister_tx.clone(),
        };
        spawn_session(ws, ctx, outbound_rx);

        Ok(handle)
    }

    /// Submit a message for routing
    ///
    /// Delivery is asynchronous: this returns once the router has the message.
    pub fn push_message(&self, message: Message) -> Result<()> {
        self.inner
            .message_tx
            .send(message)
            .map_err(|_| WsHubError::ChannelSend("hub router is not running".to_string()))
    }

    /// Push `message` and wait for a reply carrying the same action tag
    pub async fn request(&self, message: Message, timeout: Duration) -> Result<Message> {
        if message.action.is_empty() {
            return Err(WsHubError::Other(
                "a request needs a non-empty action tag".to_string(),
            ));
        }

        let replies = &self.inner.hooks.replies;
        let action = message.action.clone();
        let reply = replies.register(&action)?;

        if let Err(e) = self.push_message(message) {
            replies.cancel(&action);
            return Err(e);
        }

        match tokio::time::timeout(timeout, reply).await {
            Ok(Ok(message)) => Ok(message),
            Ok(Err(_)) => Err(WsHubError::ChannelSend(format!(
                "reply waiter for action '{}' was dropped",
                action
            ))),
            Err(_) => {
                replies.cancel(&action);
                Err(WsHubError::Timeout(format!(
                    "no reply for action '{}' within {:?}",
                    action, timeout
                )))
            }
        }
    }

    /// Snapshot of the registered sessions
    pub async fn sessions(&self) -> Result<Vec<SessionHandle>> {
        let (tx, rx) = oneshot::channel();
        self.inner
            .command_tx
            .send(RouterCommand::Snapshot(tx))
            .map_err(|_| WsHubError::ChannelSend("hub router is not running".to_string()))?;
        rx.await
            .map_err(|_| WsHubError::ChannelSend("hub router stopped".to_string()))
    }

    pub fn metrics(&self) -> HubMetrics {
        self.inner.metrics.snapshot()
    }

    pub fn config(&self) -> &HubConfig {
        &self.inner.config
    }

    /// Stop the router and close every session's outbound queue
    pub async fn shutdown(&self) {
        let _ = self.inner.command_tx.send(RouterCommand::Shutdown);
        let router = self.inner.router.lock().take();
        if let Some(router) = router {
            let _ = router.await;
        }
    }
}

/// Builder for [`Hub`]
pub struct HubBuilder {
    config: HubConfig,
    receiver: Option<Arc<dyn MessageReceiver>>,
    close_observer: Option<Arc<dyn CloseObserver>>,
    pong_observer: Option<Arc<dyn PongObserver>>,
    log: Arc<dyn LogHandler>,
    codec: Arc<dyn MessageCodec>,
}

impl HubBuilder {
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            receiver: None,
            close_observer: None,
            pong_observer: None,
            log: Arc::new(TracingLog),
            codec: Arc::new(JsonCodec),
        }
    }

    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// Invoked for every inbound data frame
    pub fn message_receiver<R: MessageReceiver + 'static>(mut self, receiver: R) -> Self {
        self.receiver = Some(Arc::new(receiver));
        self
    }

    /// Invoked once per session when its read loop ends
    pub fn close_observer<C: CloseObserver + 'static>(mut self, observer: C) -> Self {
        self.close_observer = Some(Arc::new(observer));
        self
    }

    /// Invoked on every pong
    pub fn pong_observer<P: PongObserver + 'static>(mut self, observer: P) -> Self {
        self.pong_observer = Some(Arc::new(observer));
        self
    }

    /// Replace the default `tracing` log handler
    pub fn log_handler<L: LogHandler + 'static>(mut self, log: L) -> Self {
        self.log = Arc::new(log);
        self
    }

    /// Replace the default JSON codec
    pub fn codec<C: MessageCodec>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Validate the configuration and start the router task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn build(self) -> Result<Hub> {
        self.config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (register_tx, register_rx) = mpsc::unbounded_channel();
        let (unregister_tx, unregister_rx) = mpsc::unbounded_channel();
        let (message_tx, message_rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(AtomicHubMetrics::default());

        let router = Router {
            registry: HashMap::new(),
            codec: Arc::clone(&self.codec),
            policy: self.config.delivery_policy,
            log: Arc::clone(&self.log),
            metrics: Arc::clone(&metrics),
            command_rx,
            register_rx,
            unregister_rx,
            message_rx,
        };
        let router = tokio::spawn(router.run());

        let hooks = SessionHooks {
            receiver: self.receiver,
            close_observer: self.close_observer,
            pong_observer: self.pong_observer,
            log: self.log,
            codec: self.codec,
            replies: Arc::new(PendingReplies::new()),
        };

        Ok(Hub {
            inner: Arc::new(HubInner {
                timing: SessionTiming::from_config(&self.config),
                config: self.config,
                hooks: Arc::new(hooks),
                metrics,
                next_id: AtomicU64::new(1),
                command_tx,
                register_tx,
                unregister_tx,
                message_tx,
                router: Mutex::new(Some(router)),
            }),
        })
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}
