//! Credential bundles handed back to callers after a successful issuance.

use std::fmt;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::names::UserName;

/// Public connection details of the cluster. Read once per issuer, shared
/// by every bundle it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterInfo {
    /// Name used for the cluster entry of generated connection profiles.
    pub name: String,
    /// Public API server URL, e.g. `https://k8s.example.com:6443`.
    pub endpoint: String,
    /// PEM-encoded cluster CA certificate(s).
    pub ca_pem: String,
}

impl ClusterInfo {
    pub fn new(
        name: impl Into<String>,
        endpoint: impl Into<String>,
        ca_pem: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            endpoint: endpoint.into(),
            ca_pem: ca_pem.into(),
        }
    }
}

/// Everything needed to authenticate to the cluster as one user.
///
/// The core never persists bundles; delivery and storage are the caller's
/// concern. The private key is wiped from memory when the bundle drops and is
/// never printed by `Debug`.
#[derive(Clone)]
pub struct CredentialBundle {
    pub user: UserName,
    pub cluster: ClusterInfo,
    /// PEM-encoded client certificate issued for `user`.
    pub client_cert_pem: String,
    client_key_pem: Zeroizing<String>,
}

impl CredentialBundle {
    pub fn new(
        user: UserName,
        cluster: ClusterInfo,
        client_cert_pem: impl Into<String>,
        client_key_pem: Zeroizing<String>,
    ) -> Self {
        Self {
            user,
            cluster,
            client_cert_pem: client_cert_pem.into(),
            client_key_pem,
        }
    }

    /// PEM-encoded private key matching [`Self::client_cert_pem`].
    pub fn client_key_pem(&self) -> &str {
        &self.client_key_pem
    }
}

impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialBundle")
            .field("user", &self.user)
            .field("cluster", &self.cluster)
            .field("client_cert_pem", &self.client_cert_pem)
            .field("client_key_pem", &"<redacted>")
            .finish()
    }
}
