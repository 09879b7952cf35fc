use std::time::Duration;

use permit_types::KUBE_APISERVER_CLIENT_SIGNER;

/// Who approves submitted CSRs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ApprovalMode {
    /// The issuer approves its own requests right after submitting them.
    #[default]
    SelfApprove,
    /// Someone else approves; the issuer only waits.
    External,
}

/// Issuer settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuerConfig {
    pub approval: ApprovalMode,
    /// Signer the CSRs are addressed to.
    pub signer_name: String,
    /// Requested certificate lifetime. `None` leaves it to the signer.
    pub expiration: Option<Duration>,
    /// First poll interval of the approval wait.
    pub poll_initial: Duration,
    /// Upper bound of the poll interval.
    pub poll_max: Duration,
}

impl Default for IssuerConfig {
    fn default() -> Self {
        Self {
            approval: ApprovalMode::default(),
            signer_name: KUBE_APISERVER_CLIENT_SIGNER.to_string(),
            expiration: Some(Duration::from_secs(365 * 24 * 60 * 60)),
            poll_initial: Duration::from_millis(250),
            poll_max: Duration::from_secs(5),
        }
    }
}

impl IssuerConfig {
    /// `expiration` as the CSR's `expirationSeconds`, saturating.
    pub(crate) fn expiration_seconds(&self) -> Option<i32> {
        self.expiration
            .map(|d| i32::try_from(d.as_secs()).unwrap_or(i32::MAX))
    }
}
