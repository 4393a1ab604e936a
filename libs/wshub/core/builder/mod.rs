pub mod states;

use crate::core::client::{ClientSettings, WsClient};
use crate::core::config::ClientConfig;
use crate::core::interrupt::Interrupt;
use crate::traits::*;
use states::*;
use std::sync::Arc;
use std::time::Duration;

/// Type-state builder for [`WsClient`]
///
/// The hub address is required; `build()` is only available once it is set.
///
/// ```ignore
/// let client = WsClient::builder()
///     .address("localhost:8881")
///     .path("/connect/0001")
///     .message_handler(|message: Message| println!("{:?}", message))
///     .build()?;
/// client.start().await?;
/// ```
pub struct WsClientBuilder<A: AddressState> {
    _state: TypeState<A>,
    config: ClientConfig,
    handler: Option<Arc<dyn ClientMessageHandler>>,
    log: Arc<dyn LogHandler>,
    codec: Arc<dyn MessageCodec>,
    reconnect_strategy: Option<Box<dyn ReconnectionStrategy>>,
    interrupt: Option<Interrupt>,
}

impl WsClient {
    pub fn builder() -> WsClientBuilder<NoAddress> {
        WsClientBuilder::new()
    }
}

impl WsClientBuilder<NoAddress> {
    /// Create a new builder instance
    pub fn new() -> Self {
        Self {
            _state: TypeState::new(),
            config: ClientConfig::new(String::new()),
            handler: None,
            log: Arc::new(TracingLog),
            codec: Arc::new(JsonCodec),
            reconnect_strategy: None,
            interrupt: None,
        }
    }

    /// Hub host and port, e.g. `localhost:8881`
    pub fn address(mut self, address: impl Into<String>) -> WsClientBuilder<HasAddress> {
        self.config.address = address.into();
        self.into_addressed()
    }

    /// Take address, path, scheme and timings from a loaded config
    ///
    /// Replaces anything set on the builder's config so far.
    pub fn config(mut self, config: ClientConfig) -> WsClientBuilder<HasAddress> {
        self.config = config;
        self.into_addressed()
    }

    fn into_addressed(self) -> WsClientBuilder<HasAddress> {
        WsClientBuilder {
            _state: TypeState::new(),
            config: self.config,
            handler: self.handler,
            log: self.log,
            codec: self.codec,
            reconnect_strategy: self.reconnect_strategy,
            interrupt: self.interrupt,
        }
    }
}

impl Default for WsClientBuilder<NoAddress> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: AddressState> WsClientBuilder<A> {
    /// Request path, e.g. `/connect/0001`
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.config.path = path.into();
        self
    }

    /// Dial `wss://` instead of `ws://`
    pub fn secure(mut self, secure: bool) -> Self {
        self.config.secure = secure;
        self
    }

    /// Fixed delay before each reconnect attempt (default 10s)
    pub fn reconnect_period(mut self, period: Duration) -> Self {
        self.config.reconnect_period = period;
        self
    }

    /// Wait after the close frame on interrupt (default 1s)
    pub fn close_grace(mut self, grace: Duration) -> Self {
        self.config.close_grace = grace;
        self
    }

    /// Deadline for a single frame write (default 10s)
    pub fn write_deadline(mut self, deadline: Duration) -> Self {
        self.config.write_deadline = deadline;
        self
    }

    pub fn message_handler<H: ClientMessageHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Replace the default `tracing` log handler
    pub fn log_handler<L: LogHandler + 'static>(mut self, log: L) -> Self {
        self.log = Arc::new(log);
        self
    }

    pub fn codec<C: MessageCodec>(mut self, codec: C) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Share an interrupt signal, e.g. one wired to Ctrl+C
    ///
    /// By default the client creates its own; see [`WsClient::interrupt`].
    pub fn interrupt(mut self, interrupt: Interrupt) -> Self {
        self.interrupt = Some(interrupt);
        self
    }

    /// Override the default fixed delay of `reconnect_period`
    pub fn reconnect_strategy<S: ReconnectionStrategy + 'static>(mut self, strategy: S) -> Self {
        self.reconnect_strategy = Some(Box::new(strategy));
        self
    }
}

// Build method - only available once the address is set
impl WsClientBuilder<HasAddress> {
    pub fn build(self) -> Result<WsClient> {
        self.config.validate()?;

        let reconnect_strategy = self
            .reconnect_strategy
            .unwrap_or_else(|| Box::new(FixedDelay::unlimited(self.config.reconnect_period)));

        Ok(WsClient::from_settings(ClientSettings {
            config: self.config,
            handler: self.handler,
            log: self.log,
            codec: self.codec,
            reconnect_strategy,
            interrupt: self.interrupt.unwrap_or_default(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection_state::ConnectionState;

    #[test]
    fn test_builder_sets_url() {
        let client = WsClient::builder()
            .address("localhost:8881")
            .path("connect/0001")
            .build()
            .unwrap();
        assert_eq!(client.url(), "ws://localhost:8881/connect/0001");
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_address_keeps_earlier_settings() {
        let client = WsClient::builder()
            .path("/connect/early")
            .write_deadline(Duration::from_millis(250))
            .address("localhost:8881")
            .build()
            .unwrap();
        assert_eq!(client.url(), "ws://localhost:8881/connect/early");
    }

    #[test]
    fn test_builder_secure_and_config() {
        let config = ClientConfig::new("hub.example.com");
        let client = WsClient::builder().config(config).secure(true).build().unwrap();
        assert_eq!(client.url(), "wss://hub.example.com/");
    }

    #[test]
    fn test_builder_rejects_empty_address() {
        let result = WsClient::builder().address("  ").build();
        assert!(matches!(result, Err(WsHubError::Configuration(_))));
    }

    #[test]
    fn test_builder_rejects_zero_reconnect_period() {
        let result = WsClient::builder()
            .address("localhost:8881")
            .reconnect_period(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_shared_interrupt() {
        let interrupt = Interrupt::new();
        let client = WsClient::builder()
            .address("localhost:8881")
            .interrupt(interrupt.clone())
            .build()
            .unwrap();
        interrupt.trigger();
        assert!(client.interrupt().is_triggered());
    }
}
