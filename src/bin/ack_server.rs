//! Acknowledgment server
//!
//! Runs a hub and, every few seconds, sends a tagged request to one identity
//! and waits for the reply carrying the same action tag.
//!
//! Usage: `ack_server [--config <path>] [target-identity] [interval-secs]`

use anyhow::{Context, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use wshub_node::bin_common::{init_tracing, BinaryRunner, NodeArgs, NodeRole, RunConfig, HUB_SENDER};
use wshub_node::wshub::{Hub, HubConfig, Interrupt, Message, PathIdentity, WsHubError};

const REPLY_TIMEOUT: Duration = Duration::from_secs(3);

struct AckServer {
    hub_config: HubConfig,
    target: String,
    interval: Duration,
    run_config: RunConfig,
    interrupt: Interrupt,
}

impl AckServer {
    fn new(hub_config: HubConfig, target: String, interval: Duration) -> Self {
        let run_config = RunConfig::new("Ack Server")
            .with_detail("Listen", &hub_config.listen_addr)
            .with_detail("Target", &target)
            .with_detail("Interval", format!("{:?}", interval));

        Self {
            hub_config,
            target,
            interval,
            run_config,
            interrupt: Interrupt::new(),
        }
    }

    fn spawn_request(&self, hub: &Hub) {
        let hub = hub.clone();
        let target = self.target.clone();
        // Tags only need to be unique among pending requests
        let action = Utc::now().timestamp_millis().to_string();

        tokio::spawn(async move {
            let request = Message::targeted(HUB_SENDER, [target.as_str()], "ping")
                .with_title("ack-request")
                .with_action(action.as_str());

            match hub.request(request, REPLY_TIMEOUT).await {
                Ok(reply) => info!(action = %action, from = %reply.sender_id, body = %reply.body, "Acknowledged"),
                Err(WsHubError::Timeout(_)) => warn!(action = %action, target = %target, "No acknowledgment"),
                Err(e) => error!(action = %action, "Request failed: {}", e),
            }
        });
    }
}

impl BinaryRunner for AckServer {
    async fn run(&mut self) -> Result<()> {
        let hub = Hub::builder().config(self.hub_config.clone()).build()?;

        let listener = TcpListener::bind(&self.hub_config.listen_addr)
            .await
            .with_context(|| format!("binding {}", self.hub_config.listen_addr))?;
        info!("Listening on {}", listener.local_addr()?);

        let extractor = Arc::new(PathIdentity::default());
        let mut ticker = tokio::time::interval(self.interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.interrupt.triggered() => break,
                _ = ticker.tick() => self.spawn_request(&hub),
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
        Ok(())
    }

    fn config(&self) -> &RunConfig {
        &self.run_config
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let args = NodeArgs::from_env(NodeRole::Hub)?;
    let config = HubConfig::load(&args.config_path)
        .with_context(|| format!("loading {}", args.config_path.display()))?;

    let target = args.positional(0).unwrap_or("0001").to_string();
    let interval_secs = match args.positional(1) {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid interval '{}'", raw))?,
        None => 5,
    };

    init_tracing(&config.log_level);
    config.log();

    let mut server = AckServer::new(config, target, Duration::from_secs(interval_secs));
    server.interrupt.spawn_signal_handler();
    server.execute().await
}
