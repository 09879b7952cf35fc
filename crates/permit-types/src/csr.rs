//! Certificate signing requests as seen by the credential issuer.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Signer that issues client certificates trusted by the API server.
pub const KUBE_APISERVER_CLIENT_SIGNER: &str = "kubernetes.io/kube-apiserver-client";

/// Requested key usage of the issued certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum KeyUsage {
    ClientAuth,
    DigitalSignature,
    KeyEncipherment,
}

impl KeyUsage {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyUsage::ClientAuth => "client auth",
            KeyUsage::DigitalSignature => "digital signature",
            KeyUsage::KeyEncipherment => "key encipherment",
        }
    }

    pub fn parse(usage: &str) -> Option<Self> {
        match usage {
            "client auth" => Some(KeyUsage::ClientAuth),
            "digital signature" => Some(KeyUsage::DigitalSignature),
            "key encipherment" => Some(KeyUsage::KeyEncipherment),
            _ => None,
        }
    }
}

/// Type of a condition recorded on a CSR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CsrConditionKind {
    Approved,
    Denied,
    Failed,
}

impl CsrConditionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CsrConditionKind::Approved => "Approved",
            CsrConditionKind::Denied => "Denied",
            CsrConditionKind::Failed => "Failed",
        }
    }

    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "Approved" => Some(CsrConditionKind::Approved),
            "Denied" => Some(CsrConditionKind::Denied),
            "Failed" => Some(CsrConditionKind::Failed),
            _ => None,
        }
    }
}

/// A condition on a CSR's status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrCondition {
    pub kind: CsrConditionKind,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl CsrCondition {
    pub fn new(
        kind: CsrConditionKind,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            reason: reason.into(),
            message: message.into(),
        }
    }
}

/// Status half of a CSR, written by approvers and the signer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrStatus {
    pub conditions: Vec<CsrCondition>,
    /// PEM-encoded certificate, set by the signer after approval.
    pub certificate_pem: Option<String>,
}

/// Where a CSR is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CsrState {
    /// No decision yet.
    Pending,
    /// Approved but the signer has not produced a certificate yet.
    Approved,
    /// Approved and signed.
    Issued { certificate_pem: String },
    Denied { reason: String },
    Failed { reason: String },
}

impl CsrState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CsrState::Issued { .. } | CsrState::Denied { .. } | CsrState::Failed { .. }
        )
    }
}

impl Display for CsrState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CsrState::Pending => f.write_str("pending"),
            CsrState::Approved => f.write_str("approved"),
            CsrState::Issued { .. } => f.write_str("issued"),
            CsrState::Denied { reason } => write!(f, "denied ({reason})"),
            CsrState::Failed { reason } => write!(f, "failed ({reason})"),
        }
    }
}

impl CsrStatus {
    /// Derives the lifecycle state from conditions and certificate.
    ///
    /// Denied and Failed win over Approved. An Approved CSR without a
    /// certificate is still waiting on the signer.
    pub fn state(&self) -> CsrState {
        let reason_of = |kind: CsrConditionKind| {
            self.conditions
                .iter()
                .find(|c| c.kind == kind)
                .map(describe)
        };

        if let Some(reason) = reason_of(CsrConditionKind::Denied) {
            return CsrState::Denied { reason };
        }
        if let Some(reason) = reason_of(CsrConditionKind::Failed) {
            return CsrState::Failed { reason };
        }
        if reason_of(CsrConditionKind::Approved).is_some() {
            return match self.certificate_pem.as_deref() {
                Some(pem) if !pem.trim().is_empty() => CsrState::Issued {
                    certificate_pem: pem.to_string(),
                },
                _ => CsrState::Approved,
            };
        }
        CsrState::Pending
    }
}

fn describe(condition: &CsrCondition) -> String {
    match (condition.reason.is_empty(), condition.message.is_empty()) {
        (true, true) => condition.kind.as_str().to_string(),
        (false, true) => condition.reason.clone(),
        (true, false) => condition.message.clone(),
        (false, false) => format!("{}: {}", condition.reason, condition.message),
    }
}

/// A cluster-scoped certificate signing request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsrObject {
    pub name: String,
    /// PEM-encoded PKCS#10 request.
    pub request_pem: String,
    pub signer_name: String,
    pub usages: Vec<KeyUsage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_seconds: Option<i32>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub status: CsrStatus,
}

impl CsrObject {
    /// Builds a client-authentication request.
    pub fn client_auth(
        name: impl Into<String>,
        request_pem: impl Into<String>,
        signer_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            request_pem: request_pem.into(),
            signer_name: signer_name.into(),
            usages: vec![KeyUsage::ClientAuth],
            expiration_seconds: None,
            labels: BTreeMap::new(),
            status: CsrStatus::default(),
        }
    }

    pub fn with_expiration_seconds(mut self, seconds: Option<i32>) -> Self {
        self.expiration_seconds = seconds;
        self
    }

    pub fn with_labels(mut self, labels: BTreeMap<String, String>) -> Self {
        self.labels = labels;
        self
    }

    pub fn state(&self) -> CsrState {
        self.status.state()
    }

    /// Returns whether `other` is the same request. Status and labels do
    /// not participate.
    pub fn same_definition(&self, other: &CsrObject) -> bool {
        self.name == other.name
            && self.request_pem.trim() == other.request_pem.trim()
            && self.signer_name == other.signer_name
            && self.usages == other.usages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(conditions: Vec<CsrCondition>, cert: Option<&str>) -> CsrStatus {
        CsrStatus {
            conditions,
            certificate_pem: cert.map(str::to_string),
        }
    }

    #[test]
    fn fresh_request_is_pending() {
        assert_eq!(CsrStatus::default().state(), CsrState::Pending);
    }

    #[test]
    fn approved_without_certificate_is_not_issued() {
        let approved = CsrCondition::new(CsrConditionKind::Approved, "AutoApproved", "");
        assert_eq!(status(vec![approved.clone()], None).state(), CsrState::Approved);
        assert_eq!(status(vec![approved], Some("  ")).state(), CsrState::Approved);
    }

    #[test]
    fn approved_with_certificate_is_issued() {
        let approved = CsrCondition::new(CsrConditionKind::Approved, "", "");
        let state = status(vec![approved], Some("-----BEGIN CERTIFICATE-----")).state();
        assert!(matches!(state, CsrState::Issued { .. }));
        assert!(state.is_terminal());
    }

    #[test]
    fn denial_wins_over_approval() {
        let state = status(
            vec![
                CsrCondition::new(CsrConditionKind::Approved, "", ""),
                CsrCondition::new(CsrConditionKind::Denied, "PolicyViolation", "not allowed"),
            ],
            Some("cert"),
        )
        .state();

        assert_eq!(
            state,
            CsrState::Denied {
                reason: "PolicyViolation: not allowed".into()
            }
        );
    }

    #[test]
    fn failure_is_terminal() {
        let state = status(
            vec![CsrCondition::new(CsrConditionKind::Failed, "SignerError", "")],
            None,
        )
        .state();
        assert_eq!(
            state,
            CsrState::Failed {
                reason: "SignerError".into()
            }
        );
    }

    #[test]
    fn definition_ignores_status_and_labels() {
        let a = CsrObject::client_auth("csr", "PEM\n", KUBE_APISERVER_CLIENT_SIGNER);
        let mut b = CsrObject::client_auth("csr", "PEM", KUBE_APISERVER_CLIENT_SIGNER);
        b.status.certificate_pem = Some("cert".into());
        b.labels.insert("k".into(), "v".into());

        assert!(a.same_definition(&b));

        let c = CsrObject::client_auth("csr", "OTHER", KUBE_APISERVER_CLIENT_SIGNER);
        assert!(!a.same_definition(&c));
    }

    #[test]
    fn key_usage_round_trips_kubernetes_strings() {
        for usage in [
            KeyUsage::ClientAuth,
            KeyUsage::DigitalSignature,
            KeyUsage::KeyEncipherment,
        ] {
            assert_eq!(KeyUsage::parse(usage.as_str()), Some(usage));
        }
        assert_eq!(KeyUsage::parse("server auth"), None);
    }
}
