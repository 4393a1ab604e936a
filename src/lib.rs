//! wshub node - sample hub and client binaries
//!
//! This crate bundles the binaries that run a [`wshub`] hub or client, plus
//! the helpers they share.
//!
//! ## Architecture
//!
//! - **bin_common**: Common utilities for binary executables (config paths,
//!   logging, runner, stdin commands)
//! - **wshub**: Hub, sessions and client connector (re-exported from workspace)
//!
//! ## Usage in Binaries
//!
//! ```rust
//! use wshub_node::bin_common::{NodeArgs, NodeRole};
//! use wshub_node::wshub::HubConfig;
//! ```

// Re-export workspace library for convenience
pub use wshub;

// Binary common utilities
pub mod bin_common {
    //! Common utilities for binary executables

    pub mod cli;
    pub mod commands;
    pub mod logging;
    pub mod runner;

    pub use cli::{NodeArgs, NodeRole};
    pub use commands::{parse_command, HUB_SENDER};
    pub use logging::init_tracing;
    pub use runner::{BinaryRunner, RunConfig};
}
