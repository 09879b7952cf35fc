//! Errors of the top-level API.

use permit_config::ConfigError;
use permit_engine::EngineError;
use permit_store::ConnectError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PermitError>;

/// Anything that can go wrong between reading the configuration and
/// finishing an engine operation.
#[derive(Debug, Error)]
pub enum PermitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to connect to the cluster: {0}")]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}
