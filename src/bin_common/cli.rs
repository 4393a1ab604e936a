//! Command line handling shared by the node binaries
//!
//! ```text
//! hub_server [--config <path>]
//! hub_client [--config <path>] [identity]
//! ack_server [--config <path>] [target] [interval-secs]
//! ```
//!
//! The config file comes from `--config`, then from the role's environment
//! variable, then from the default under `config/`.

use anyhow::{anyhow, bail, Result};
use std::path::PathBuf;

/// Which side of the hub a binary runs, and so which config it loads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Hub,
    Client,
}

impl NodeRole {
    pub fn default_config_path(self) -> &'static str {
        match self {
            NodeRole::Hub => "config/hub_config.yaml",
            NodeRole::Client => "config/client_config.yaml",
        }
    }

    pub fn config_env_var(self) -> &'static str {
        match self {
            NodeRole::Hub => "HUB_CONFIG_PATH",
            NodeRole::Client => "CLIENT_CONFIG_PATH",
        }
    }

    /// Resolve the config path; an explicit path always wins
    pub fn config_path(self, explicit: Option<&str>) -> PathBuf {
        explicit
            .map(PathBuf::from)
            .or_else(|| std::env::var_os(self.config_env_var()).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(self.default_config_path()))
    }
}

/// Parsed arguments of a node binary
#[derive(Debug, Clone)]
pub struct NodeArgs {
    pub config_path: PathBuf,
    positional: Vec<String>,
}

impl NodeArgs {
    /// Parse the process arguments
    pub fn from_env(role: NodeRole) -> Result<Self> {
        Self::parse(role, std::env::args().skip(1))
    }

    /// Parse `args` (without the program name)
    pub fn parse<I, S>(role: NodeRole, args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut explicit = None;
        let mut positional = Vec::new();
        let mut args = args.into_iter().map(Into::<String>::into);

        while let Some(arg) = args.next() {
            if arg == "--config" || arg == "-c" {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow!("{} expects a file path", arg))?;
                explicit = Some(path);
            } else if let Some(path) = arg.strip_prefix("--config=") {
                explicit = Some(path.to_string());
            } else if arg.starts_with('-') {
                bail!("unknown option '{}'", arg);
            } else {
                positional.push(arg);
            }
        }

        Ok(Self {
            config_path: role.config_path(explicit.as_deref()),
            positional,
        })
    }

    /// Positional argument at `index`, if given
    pub fn positional(&self, index: usize) -> Option<&str> {
        self.positional.get(index).map(String::as_str)
    }
}
