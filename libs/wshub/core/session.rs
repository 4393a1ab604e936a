//! Hub-side session: one upgraded connection and its two loops
//!
//! ```text
//!              ┌──────────── read loop ─────────────┐
//!  peer ──────▶│ frames, pongs, liveness deadline T │──▶ receiver hook
//!              └────────────────┬───────────────────┘
//!                               │ unregister(id) on termination
//!                               ▼
//!                            router ── drops queue sender ──┐
//!                                                           ▼
//!              ┌──────────── write loop ────────────────────────┐
//!  peer ◀──────│ queued payloads, pings every P, deadline W     │
//!              └────────────────────────────────────────────────┘
//! ```
//!
//! The transport is split: the write loop owns the sink and is the only
//! writer, the read loop owns the stream. The write loop signals the read loop
//! when it stops so that a write failure also tears down the read side.

use crate::core::classifier::{classify, CloseReason};
use crate::core::config::DeliveryPolicy;
use crate::core::connection_state::{AtomicSessionState, SessionState};
use crate::core::correlation::PendingReplies;
use crate::core::heartbeat::{heartbeat_ticker, SessionTiming};
use crate::core::liveness::LivenessDeadline;
use crate::traits::{
    CloseObserver, LogHandler, LogLevel, MessageCodec, MessageReceiver, PongObserver, Result,
    WsHubError,
};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsFrame;
use tokio_tungstenite::WebSocketStream;
use tracing::debug;

/// Hub-assigned session identifier, unique for the lifetime of a hub
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Public view of a registered session
///
/// Two sessions may share an identity; the id tells them apart.
#[derive(Clone)]
pub struct SessionHandle {
    id: SessionId,
    identity: String,
    state: Arc<AtomicSessionState>,
}

impl SessionHandle {
    pub(crate) fn new(id: SessionId, identity: String) -> Self {
        Self {
            id,
            identity,
            state: Arc::new(AtomicSessionState::new(SessionState::Connecting)),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        self.state.get()
    }

    pub(crate) fn state_cell(&self) -> &Arc<AtomicSessionState> {
        &self.state
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("id", &self.id)
            .field("identity", &self.identity)
            .field("state", &self.state.get())
            .finish()
    }
}

/// Pre-encoded payload shared by every recipient of one routed message
pub(crate) type Payload = Arc<str>;

/// Result of handing a payload to a session's outbound queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Delivery {
    Queued,
    /// Bounded queue full under [`DeliveryPolicy::DropWhenFull`]
    Dropped,
    /// Write loop already gone; unregistration is on its way
    Closed,
}

/// Router side of a session's outbound queue
pub(crate) enum OutboundSender {
    Bounded(mpsc::Sender<Payload>),
    Unbounded(mpsc::UnboundedSender<Payload>),
}

impl OutboundSender {
    pub(crate) async fn deliver(&self, payload: Payload, policy: DeliveryPolicy) -> Delivery {
        match self {
            OutboundSender::Unbounded(tx) => match tx.send(payload) {
                Ok(()) => Delivery::Queued,
                Err(_) => Delivery::Closed,
            },
            OutboundSender::Bounded(tx) => match policy {
                DeliveryPolicy::Block => match tx.send(payload).await {
                    Ok(()) => Delivery::Queued,
                    Err(_) => Delivery::Closed,
                },
                DeliveryPolicy::DropWhenFull => match tx.try_send(payload) {
                    Ok(()) => Delivery::Queued,
                    Err(mpsc::error::TrySendError::Full(_)) => Delivery::Dropped,
                    Err(mpsc::error::TrySendError::Closed(_)) => Delivery::Closed,
                },
            },
        }
    }
}

/// Write-loop side of a session's outbound queue
pub(crate) enum OutboundReceiver {
    Bounded(mpsc::Receiver<Payload>),
    Unbounded(mpsc::UnboundedReceiver<Payload>),
}

impl OutboundReceiver {
    async fn recv(&mut self) -> Option<Payload> {
        match self {
            OutboundReceiver::Bounded(rx) => rx.recv().await,
            OutboundReceiver::Unbounded(rx) => rx.recv().await,
        }
    }
}

/// Create an outbound queue; `None` means unbounded
pub(crate) fn outbound_queue(capacity: Option<usize>) -> (OutboundSender, OutboundReceiver) {
    match capacity {
        Some(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (OutboundSender::Bounded(tx), OutboundReceiver::Bounded(rx))
        }
        None => {
            let (tx, rx) = mpsc::unbounded_channel();
            (OutboundSender::Unbounded(tx), OutboundReceiver::Unbounded(rx))
        }
    }
}

/// Hooks and shared services every session of a hub uses
pub(crate) struct SessionHooks {
    pub receiver: Option<Arc<dyn MessageReceiver>>,
    pub close_observer: Option<Arc<dyn CloseObserver>>,
    pub pong_observer: Option<Arc<dyn PongObserver>>,
    pub log: Arc<dyn LogHandler>,
    pub codec: Arc<dyn MessageCodec>,
    pub replies: Arc<PendingReplies>,
}

/// Everything a session's loops need besides the transport
pub(crate) struct SessionContext {
    pub handle: SessionHandle,
    pub timing: SessionTiming,
    pub hooks: Arc<SessionHooks>,
    pub unregister_tx: mpsc::UnboundedSender<SessionId>,
}

/// Start the read loop, the write loop and their supervisor
///
/// The returned task completes once both loops have exited and the session
/// has reached CLOSED.
pub(crate) fn spawn_session<S>(
    ws: WebSocketStream<S>,
    ctx: SessionContext,
    outbound: OutboundReceiver,
) -> JoinHandle<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let ctx = Arc::new(ctx);
    let writer_done = Arc::new(Notify::new());
    let (sink, stream) = ws.split();

    ctx.handle.state_cell().advance(SessionState::Open);

    let reader = tokio::spawn(read_loop(stream, Arc::clone(&ctx), Arc::clone(&writer_done)));
    let writer = tokio::spawn(write_loop(sink, outbound, Arc::clone(&ctx), writer_done));

    tokio::spawn(async move {
        let _ = reader.await;
        let leftover = writer.await.ok().flatten();

        // After a write failure the queue is still registered. Drain it until
        // the router drops the sender so CLOSED implies the entry is gone.
        if let Some(mut outbound) = leftover {
            while outbound.recv().await.is_some() {}
        }

        ctx.handle.state_cell().advance(SessionState::Closed);
        debug!(
            session_id = ctx.handle.id().as_u64(),
            identity = ctx.handle.identity(),
            "Session closed"
        );
    })
}

async fn read_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    ctx: Arc<SessionContext>,
    writer_done: Arc<Notify>,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let timeout = ctx.timing.liveness_timeout;
    let mut liveness = LivenessDeadline::start(timeout);

    let failure = loop {
        tokio::select! {
            _ = writer_done.notified() => {
                break read_failure(CloseReason::ExpectedClose, "write side closed");
            }
            frame = tokio::time::timeout_at(liveness.deadline(), stream.next()) => match frame {
                Err(_) => {
                    break read_failure(
                        CloseReason::Unknown,
                        format!("no heartbeat acknowledgment within {:?}", timeout),
                    );
                }
                Ok(None) => break read_failure(CloseReason::ExpectedClose, "stream ended"),
                Ok(Some(Err(e))) => {
                    break WsHubError::TransportRead {
                        reason: classify(&e),
                        detail: e.to_string(),
                    };
                }
                Ok(Some(Ok(frame))) => match frame {
                    WsFrame::Pong(_) => {
                        let next_deadline = liveness.renew();
                        if let Some(observer) = &ctx.hooks.pong_observer {
                            observer.on_pong(ctx.handle.identity(), next_deadline);
                        }
                    }
                    WsFrame::Text(text) => handle_payload(&ctx, &text),
                    WsFrame::Binary(bytes) => handle_payload(&ctx, &String::from_utf8_lossy(&bytes)),
                    WsFrame::Close(frame) => {
                        let detail = match frame {
                            Some(frame) => format!("close frame {} {}", frame.code, frame.reason),
                            None => "close frame".to_string(),
                        };
                        break read_failure(CloseReason::ExpectedClose, detail);
                    }
                    // Pings are answered by the transport itself
                    WsFrame::Ping(_) | WsFrame::Frame(_) => {}
                },
            },
        }
    };

    ctx.handle.state_cell().advance(SessionState::Closing);

    let reason = failure.close_reason().unwrap_or(CloseReason::Unknown);
    let level = if reason == CloseReason::Unknown {
        LogLevel::Warn
    } else {
        LogLevel::Info
    };
    ctx.hooks.log.log(
        level,
        &format!(
            "[wshub] Session {} ({}) read loop ended after {} pong(s): {}",
            ctx.handle.id(),
            ctx.handle.identity(),
            liveness.pongs(),
            failure
        ),
    );

    // The router may already be gone during hub shutdown
    let _ = ctx.unregister_tx.send(ctx.handle.id());

    if let Some(observer) = &ctx.hooks.close_observer {
        observer.on_close(ctx.handle.identity(), reason);
    }
}

fn read_failure(reason: CloseReason, detail: impl Into<String>) -> WsHubError {
    WsHubError::TransportRead {
        reason,
        detail: detail.into(),
    }
}

fn handle_payload(ctx: &SessionContext, payload: &str) {
    if !ctx.hooks.replies.is_empty() {
        if let Ok(message) = ctx.hooks.codec.decode(payload) {
            ctx.hooks.replies.resolve(message);
        }
    }
    if let Some(receiver) = &ctx.hooks.receiver {
        receiver.on_message(ctx.handle.identity(), payload);
    }
}

/// Returns the outbound queue if the loop stopped on a write failure
async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, WsFrame>,
    mut outbound: OutboundReceiver,
    ctx: Arc<SessionContext>,
    writer_done: Arc<Notify>,
) -> Option<OutboundReceiver>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let deadline = ctx.timing.write_deadline;
    let mut ticker = heartbeat_ticker(ctx.timing.heartbeat_period);

    let result = loop {
        tokio::select! {
            payload = outbound.recv() => match payload {
                Some(payload) => {
                    let frame = WsFrame::Text(payload.to_string());
                    if let Err(e) = write_frame(&mut sink, frame, deadline).await {
                        break Err(e);
                    }
                }
                None => {
                    // Queue closed by the router: say goodbye and stop
                    let _ = write_frame(&mut sink, WsFrame::Close(None), deadline).await;
                    break Ok(());
                }
            },
            _ = ticker.tick() => {
                if let Err(e) = write_frame(&mut sink, WsFrame::Ping(Vec::new()), deadline).await {
                    break Err(e);
                }
            }
        }
    };

    ctx.handle.state_cell().advance(SessionState::Closing);
    let _ = tokio::time::timeout(deadline, sink.close()).await;
    writer_done.notify_one();

    match result {
        Ok(()) => None,
        Err(e) => {
            ctx.hooks.log.log(
                LogLevel::Debug,
                &format!(
                    "[wshub] Session {} ({}) write loop ended: {}",
                    ctx.handle.id(),
                    ctx.handle.identity(),
                    e
                ),
            );
            Some(outbound)
        }
    }
}

async fn write_frame<S>(
    sink: &mut SplitSink<WebSocketStream<S>, WsFrame>,
    frame: WsFrame,
    deadline: Duration,
) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    match tokio::time::timeout(deadline, sink.send(frame)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(WsHubError::TransportWrite(e.to_string())),
        Err(_) => Err(WsHubError::TransportWrite(format!(
            "write deadline of {:?} exceeded",
            deadline
        ))),
    }
}
