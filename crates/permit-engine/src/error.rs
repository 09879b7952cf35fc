//! Caller-facing error taxonomy.

use std::time::Duration;

use permit_issuer::{IssuanceStage, IssueError, KubeconfigError};
use permit_store::StoreError;
use permit_types::{NameError, ObjectRef, RoleKey, UserName};
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by [`crate::Engine`].
///
/// "Already exists" and "already absent" never appear here; idempotent
/// operations report them as success.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A malformed user name, object name or role reference.
    #[error("invalid argument: {0}")]
    InvalidArgument(#[from] NameError),

    /// An object exists under the same name with a different definition,
    /// or a concurrent writer changed it first.
    #[error("conflict on {object}: {detail}")]
    Conflict { object: ObjectRef, detail: String },

    /// The role a grant refers to does not exist.
    #[error("{role} not found")]
    RoleNotFound { role: RoleKey },

    #[error("{object} not found")]
    NotFound { object: ObjectRef },

    #[error("certificate request for {user} was denied: {reason}")]
    IssuanceDenied { user: UserName, reason: String },

    #[error("certificate request for {user} was not approved within {timeout:?}")]
    IssuanceTimedOut { user: UserName, timeout: Duration },

    #[error("issuance for {user} failed during {stage}")]
    IssuanceFailed {
        user: UserName,
        stage: IssuanceStage,
        #[source]
        source: IssueError,
    },

    #[error("issuance for {user} was cancelled")]
    Cancelled { user: UserName },

    #[error("key generation for {user} failed: {message}")]
    Crypto { user: UserName, message: String },

    /// Safe to retry.
    #[error(transparent)]
    Transient(StoreError),

    /// The engine's own credentials lack a permission.
    #[error(transparent)]
    Forbidden(StoreError),

    /// The API rejected a request or failed in an unclassified way.
    #[error(transparent)]
    Api(StoreError),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),
}

impl EngineError {
    /// Returns true if the caller may retry the same operation.
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Transient(_) | EngineError::IssuanceTimedOut { .. } => true,
            EngineError::IssuanceFailed { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { object } => EngineError::NotFound { object },
            StoreError::Conflict { object, detail } => EngineError::Conflict { object, detail },
            err @ StoreError::Forbidden { .. } => EngineError::Forbidden(err),
            err @ StoreError::Transient { .. } => EngineError::Transient(err),
            err @ (StoreError::Invalid { .. } | StoreError::Api { .. }) => EngineError::Api(err),
        }
    }
}

impl From<IssueError> for EngineError {
    fn from(err: IssueError) -> Self {
        match err {
            IssueError::Crypto { user, message } => EngineError::Crypto { user, message },
            IssueError::Denied { user, reason, .. } => EngineError::IssuanceDenied { user, reason },
            IssueError::TimedOut { user, timeout, .. } => {
                EngineError::IssuanceTimedOut { user, timeout }
            }
            IssueError::Cancelled { user, .. } => EngineError::Cancelled { user },
            other => EngineError::IssuanceFailed {
                user: other.user().clone(),
                stage: other.stage(),
                source: other,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use permit_types::ObjectKind;

    fn object() -> ObjectRef {
        ObjectRef::cluster(ObjectKind::ClusterRole, "viewer")
    }

    #[test]
    fn store_errors_map_onto_the_taxonomy() {
        assert!(matches!(
            EngineError::from(StoreError::not_found(object())),
            EngineError::NotFound { .. }
        ));
        assert!(matches!(
            EngineError::from(StoreError::conflict(object(), "x")),
            EngineError::Conflict { .. }
        ));

        let transient = EngineError::from(StoreError::transient(object(), "503"));
        assert!(transient.is_retryable());

        let invalid = EngineError::from(StoreError::invalid(object(), "bad"));
        assert!(matches!(invalid, EngineError::Api(_)));
        assert!(!invalid.is_retryable());
    }

    #[test]
    fn transient_issuance_failure_is_retryable() {
        let user = UserName::new("alice").unwrap();
        let err = EngineError::from(IssueError::Failed {
            user: user.clone(),
            stage: IssuanceStage::SubmitCsr,
            source: StoreError::transient(object(), "timeout"),
        });

        match &err {
            EngineError::IssuanceFailed { stage, .. } => {
                assert_eq!(*stage, IssuanceStage::SubmitCsr);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.is_retryable());

        let denied = EngineError::from(IssueError::Denied {
            user,
            csr: "c".into(),
            reason: "no".into(),
        });
        assert!(!denied.is_retryable());
    }
}
