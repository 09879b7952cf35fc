//! Store error types.

use permit_types::ObjectRef;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by the orchestration API, normalized across backends.
///
/// Idempotent operations never produce "already exists" or "already absent";
/// those collapse into success inside the adapter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("{object} not found")]
    NotFound { object: ObjectRef },

    /// A different object already exists under the same name, or a write
    /// lost an optimistic-concurrency race.
    #[error("conflict on {object}: {detail}")]
    Conflict { object: ObjectRef, detail: String },

    /// The engine's own credentials may not perform the call.
    #[error("forbidden: {object}: {message}")]
    Forbidden { object: ObjectRef, message: String },

    /// Network failure, throttling or server-side error. Safe to retry.
    #[error("transient failure on {object}: {message}")]
    Transient { object: ObjectRef, message: String },

    /// The API rejected the object as malformed, or returned one the
    /// adapter cannot interpret.
    #[error("invalid {object}: {message}")]
    Invalid { object: ObjectRef, message: String },

    /// Any other API failure.
    #[error("api error on {object} (status {code}): {message}")]
    Api {
        object: ObjectRef,
        code: u16,
        message: String,
    },
}

impl StoreError {
    pub fn not_found(object: ObjectRef) -> Self {
        Self::NotFound { object }
    }

    pub fn conflict(object: ObjectRef, detail: impl Into<String>) -> Self {
        Self::Conflict {
            object,
            detail: detail.into(),
        }
    }

    pub fn transient(object: ObjectRef, message: impl Into<String>) -> Self {
        Self::Transient {
            object,
            message: message.into(),
        }
    }

    pub fn invalid(object: ObjectRef, message: impl Into<String>) -> Self {
        Self::Invalid {
            object,
            message: message.into(),
        }
    }

    /// Returns true if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// The object the failed call was about.
    pub fn object(&self) -> &ObjectRef {
        match self {
            Self::NotFound { object }
            | Self::Conflict { object, .. }
            | Self::Forbidden { object, .. }
            | Self::Transient { object, .. }
            | Self::Invalid { object, .. }
            | Self::Api { object, .. } => object,
        }
    }
}

/// Failure to build a client for a live cluster.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("failed to load kubeconfig: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    #[error("failed to infer cluster configuration: {0}")]
    Infer(#[from] kube::config::InferConfigError),

    #[error("failed to build client: {0}")]
    Client(#[from] kube::Error),
}
