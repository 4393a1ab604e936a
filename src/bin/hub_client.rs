//! Hub client
//!
//! Connects to a hub as `/connect/{identity}`, logs every message it
//! receives, and acknowledges messages that carry an action tag by replying
//! with the same tag. Reconnects on its own; stops on Ctrl+C.
//!
//! Usage: `hub_client [--config <path>] [identity]`

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{info, warn};
use wshub_node::bin_common::{init_tracing, BinaryRunner, NodeArgs, NodeRole, RunConfig};
use wshub_node::wshub::{ClientConfig, Interrupt, Message, WsClient};

struct HubClient {
    identity: String,
    client: WsClient,
    requests: mpsc::UnboundedReceiver<Message>,
    run_config: RunConfig,
}

impl HubClient {
    fn new(identity: String, config: ClientConfig, interrupt: Interrupt) -> Result<Self> {
        let run_config = RunConfig::new("Hub Client")
            .with_detail("Identity", &identity)
            .with_detail("URL", config.url());

        let (requests_tx, requests) = mpsc::unbounded_channel();
        let client = WsClient::builder()
            .config(config)
            .interrupt(interrupt)
            .message_handler(move |message: Message| {
                info!(
                    sender = %message.sender_id,
                    title = %message.title,
                    body = %message.body,
                    "Message received"
                );
                if !message.action.is_empty() {
                    let _ = requests_tx.send(message);
                }
            })
            .build()?;

        Ok(Self {
            identity,
            client,
            requests,
            run_config,
        })
    }
}

impl BinaryRunner for HubClient {
    async fn run(&mut self) -> Result<()> {
        self.client.start().await?;

        // Acknowledge tagged messages through the connection writer
        let sender = self.client.sender();
        let identity = self.identity.clone();
        let mut requests = std::mem::replace(&mut self.requests, mpsc::unbounded_channel().1);
        tokio::spawn(async move {
            while let Some(request) = requests.recv().await {
                let ack = Message::targeted(identity.as_str(), [request.sender_id], "ack")
                    .with_action(request.action);
                if let Err(e) = sender.send(ack) {
                    warn!("Failed to queue acknowledgment: {}", e);
                    break;
                }
            }
        });

        self.client.wait().await;

        let metrics = self.client.metrics();
        info!(
            "Sent {} messages, received {}, reconnected {} times",
            metrics.messages_sent, metrics.messages_received, metrics.reconnect_count
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

    let args = NodeArgs::from_env(NodeRole::Client)?;
    let mut config = ClientConfig::load(&args.config_path)
        .with_context(|| format!("loading {}", args.config_path.display()))?;

    let identity = args.positional(0).unwrap_or("0001").to_string();
    config.path = format!("/connect/{}", identity);

    init_tracing(&config.log_level);
    config.log();

    let interrupt = Interrupt::new();
    interrupt.spawn_signal_handler();

    let mut client = HubClient::new(identity, config, interrupt)?;
    client.execute().await
}
