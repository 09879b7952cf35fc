//! CLI command implementations.

pub mod cluster;
pub mod config;
pub mod grant;
pub mod role;
pub mod user;
pub mod version;

use anyhow::{Context, Result};
use permit::{Engine, PermitConfig};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Configuration shared by every command. The cluster connection is made
/// only by commands that need one.
pub struct Session {
    config: PermitConfig,
}

impl Session {
    pub fn new(config: PermitConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PermitConfig {
        &self.config
    }

    /// Connects to the configured cluster.
    pub async fn engine(&self) -> Result<Engine> {
        permit::connect(&self.config).await.with_context(|| {
            format!(
                "failed to connect to cluster '{}'",
                self.config.cluster.name
            )
        })
    }
}

/// A token cancelled on Ctrl-C, so a pending approval wait stops cleanly.
pub fn interrupt_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            debug!("interrupted");
            child.cancel();
        }
    });
    token
}
