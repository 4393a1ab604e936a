//! Hub server
//!
//! Accepts sessions on `/connect/{identity}`, relays envelopes sent by
//! sessions to their recipients, and publishes operator commands read from
//! stdin (`all <title> <text>` or `to <id,id> <title> <text>`).
//!
//! Usage: `hub_server [--config <path>]`

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use wshub_node::bin_common::{
    init_tracing, parse_command, BinaryRunner, NodeArgs, NodeRole, RunConfig,
};
use wshub_node::wshub::{
    CloseReason, Hub, HubConfig, Interrupt, JsonCodec, MessageCodec, PathIdentity,
};

struct HubServer {
    hub_config: HubConfig,
    run_config: RunConfig,
    interrupt: Interrupt,
}

impl HubServer {
    fn new(hub_config: HubConfig) -> Self {
        let run_config = RunConfig::new("Hub Server")
            .with_detail("Listen", &hub_config.listen_addr)
            .with_detail("Liveness timeout", format!("{:?}", hub_config.liveness_timeout))
            .with_detail("Heartbeat period", format!("{:?}", hub_config.heartbeat_period()));

        Self {
            hub_config,
            run_config,
            interrupt: Interrupt::new(),
        }
    }
}

impl BinaryRunner for HubServer {
    async fn run(&mut self) -> Result<()> {
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel::<(String, String)>();

        let hub = Hub::builder()
            .config(self.hub_config.clone())
            .message_receiver(move |identity: &str, payload: &str| {
                let _ = inbound_tx.send((identity.to_string(), payload.to_string()));
            })
            .close_observer(|identity: &str, reason: CloseReason| {
                info!(identity, %reason, "Session closed");
            })
            .pong_observer(|identity: &str, next_deadline: DateTime<Utc>| {
                debug!(identity, %next_deadline, "Heartbeat acknowledged");
            })
            .build()?;

        // Relay envelopes from sessions; the sender is always the session itself
        let relay_hub = hub.clone();
        tokio::spawn(async move {
            while let Some((identity, payload)) = inbound_rx.recv().await {
                match JsonCodec.decode(&payload) {
                    Ok(mut message) => {
                        message.sender_id = identity;
                        if relay_hub.push_message(message).is_err() {
                            break;
                        }
                    }
                    Err(_) => info!(identity = %identity, %payload, "Received raw payload"),
                }
            }
        });

        // Operator commands
        let publish_hub = hub.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(tokio::io::stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command(&line) {
                    Some(message) => {
                        if publish_hub.push_message(message).is_err() {
                            break;
                        }
                    }
                    None => warn!(
                        "Unknown command '{}'; use `all <title> <text>` or `to <id,id> <title> <text>`",
                        line.trim()
                    ),
                }
            }
        });

        let listener = TcpListener::bind(&self.hub_config.listen_addr)
            .await
            .with_context(|| format!("binding {}", self.hub_config.listen_addr))?;
        info!("Listening on {}", listener.local_addr()?);

        let extractor = Arc::new(PathIdentity::default());
        loop {
            tokio::select! {
                _ = self.interrupt.triggered() => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => {
                        let hub = hub.clone();
                        let extractor = Arc::clone(&extractor);
                        tokio::spawn(async move {
                            match hub.register_with(stream, extractor.as_ref()).await {
                                Ok(session) => debug!(%peer, identity = session.identity(), "Session opened"),
                                Err(e) => warn!(%peer, "Rejected connection: {}", e),
                            }
                        });
                    }
                    Err(e) => error!("Accept failed: {}", e),
                },
            }
        }

        hub.shutdown().await;
        let metrics = hub.metrics();
        info!(
            "Routed {} messages, {} deliveries, {} dropped, {} sessions served",
            metrics.messages_routed,
            metrics.deliveries,
            metrics.dropped_deliveries,
            metrics.registrations
        );
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    // Load config first (before logging is initialized)
    let args = NodeArgs::from_env(NodeRole::Hub)?;
    let config = HubConfig::load(&args.config_path)
        .with_context(|| format!("loading {}", args.config_path.display()))?;

    init_tracing(&config.log_level);
    config.log();

    let mut server = HubServer::new(config);
    server.interrupt.spawn_signal_handler();
    server.execute().await
}
