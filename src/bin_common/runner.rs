//! Binary runner utilities
//!
//! Provides a standardized way to run binaries with startup and shutdown
//! banners around the main loop.

use tracing::info;

/// Configuration for running a binary application
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Name of the binary (for logging)
    pub name: String,
    /// Extra `label: value` lines shown in the startup banner
    pub details: Vec<(String, String)>,
}

impl RunConfig {
    /// Create a new run configuration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            details: Vec::new(),
        }
    }

    /// Add a line to the startup banner
    pub fn with_detail(mut self, label: impl Into<String>, value: impl ToString) -> Self {
        self.details.push((label.into(), value.to_string()));
        self
    }
}

/// Trait for binary applications
pub trait BinaryRunner {
    /// Run the application main loop
    async fn run(&mut self) -> anyhow::Result<()>;

    /// Get the run configuration
    fn config(&self) -> &RunConfig;

    /// Print startup banner
    fn print_banner(&self) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("Starting {}", config.name);
        for (label, value) in &config.details {
            info!("{}: {}", label, value);
        }
        info!("Press Ctrl+C to stop");
        info!("========================================");
        info!("");
    }

    /// Print shutdown banner
    fn print_shutdown(&self, stats: Option<&str>) {
        let config = self.config();
        info!("");
        info!("========================================");
        info!("{} stopped gracefully", config.name);
        if let Some(stats) = stats {
            info!("{}", stats);
        }
        info!("========================================");
    }

    /// Execute the binary with proper initialization and cleanup
    async fn execute(&mut self) -> anyhow::Result<()> {
        self.print_banner();
        let result = self.run().await;
        self.print_shutdown(None);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_config_builder() {
        let config = RunConfig::new("hub_server")
            .with_detail("Listen", "0.0.0.0:8881")
            .with_detail("Liveness", "60s");

        assert_eq!(config.name, "hub_server");
        assert_eq!(config.details.len(), 2);
        assert_eq!(config.details[0], ("Listen".to_string(), "0.0.0.0:8881".to_string()));
    }

    #[test]
    fn test_default_config() {
        let config = RunConfig::new("default");
        assert!(config.details.is_empty());
    }
}
