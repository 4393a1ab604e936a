use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::info;

/// Shared interrupt signal for the client connector
///
/// Cloning shares the same signal. Once triggered it stays triggered, so a
/// task that starts waiting after the trigger still observes it.
#[derive(Clone)]
pub struct Interrupt {
    tx: Arc<watch::Sender<bool>>,
}

impl Interrupt {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the interrupt
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolve once the interrupt has fired
    pub async fn triggered(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close here
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Spawn a Ctrl+C signal handler that fires the interrupt
    pub fn spawn_signal_handler(&self) {
        let interrupt = self.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                info!("Received interrupt signal (Ctrl+C)");
                interrupt.trigger();
            }
        });
    }
}

impl Default for Interrupt {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Interrupt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interrupt")
            .field("triggered", &self.is_triggered())
            .finish()
    }
}
