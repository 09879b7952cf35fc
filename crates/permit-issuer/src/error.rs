//! Issuance errors.

use std::fmt::{self, Display};
use std::time::Duration;

use permit_store::StoreError;
use permit_types::UserName;
use thiserror::Error;

/// Result type for issuance.
pub type IssueResult<T> = Result<T, IssueError>;

/// Step of the issuance state machine an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssuanceStage {
    GenerateKeypair,
    SubmitCsr,
    AwaitApproval,
    FetchCertificate,
    AssembleBundle,
}

impl Display for IssuanceStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssuanceStage::GenerateKeypair => "generate-keypair",
            IssuanceStage::SubmitCsr => "submit-csr",
            IssuanceStage::AwaitApproval => "await-approval",
            IssuanceStage::FetchCertificate => "fetch-certificate",
            IssuanceStage::AssembleBundle => "assemble-bundle",
        })
    }
}

/// Terminal outcomes of an issuance other than success.
#[derive(Debug, Error)]
pub enum IssueError {
    #[error("key generation for {user} failed: {message}")]
    Crypto { user: UserName, message: String },

    #[error("CSR {csr} for {user} was denied: {reason}")]
    Denied {
        user: UserName,
        csr: String,
        reason: String,
    },

    /// The signer marked the CSR as failed after approval.
    #[error("signer failed CSR {csr} for {user}: {reason}")]
    SignerFailed {
        user: UserName,
        csr: String,
        reason: String,
    },

    /// The approval wait hit its deadline. The CSR is left in place.
    #[error("CSR {csr} for {user} was not approved within {timeout:?}")]
    TimedOut {
        user: UserName,
        csr: String,
        timeout: Duration,
    },

    /// The caller cancelled the wait. The CSR is left in place.
    #[error("issuance for {user} was cancelled during {stage}")]
    Cancelled { user: UserName, stage: IssuanceStage },

    /// A concurrent issuance for the same user replaced our CSR.
    #[error("CSR {csr} for {user} was replaced by a concurrent issuance")]
    Superseded { user: UserName, csr: String },

    /// An orchestration API call failed.
    #[error("issuance for {user} failed during {stage}: {source}")]
    Failed {
        user: UserName,
        stage: IssuanceStage,
        #[source]
        source: StoreError,
    },
}

impl IssueError {
    /// Returns true if retrying the issuance for the same user may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            IssueError::TimedOut { .. } | IssueError::Superseded { .. } => true,
            IssueError::Failed { source, .. } => source.is_transient(),
            _ => false,
        }
    }

    pub fn user(&self) -> &UserName {
        match self {
            IssueError::Crypto { user, .. }
            | IssueError::Denied { user, .. }
            | IssueError::SignerFailed { user, .. }
            | IssueError::TimedOut { user, .. }
            | IssueError::Cancelled { user, .. }
            | IssueError::Superseded { user, .. }
            | IssueError::Failed { user, .. } => user,
        }
    }

    pub fn stage(&self) -> IssuanceStage {
        match self {
            IssueError::Crypto { .. } => IssuanceStage::GenerateKeypair,
            IssueError::Denied { .. } | IssueError::TimedOut { .. } => {
                IssuanceStage::AwaitApproval
            }
            IssueError::SignerFailed { .. } | IssueError::Superseded { .. } => {
                IssuanceStage::FetchCertificate
            }
            IssueError::Cancelled { stage, .. } | IssueError::Failed { stage, .. } => *stage,
        }
    }
}
