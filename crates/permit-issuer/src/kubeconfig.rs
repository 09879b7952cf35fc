//! Connection profiles: a [`CredentialBundle`] rendered as a kubeconfig
//! document.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use permit_types::CredentialBundle;
use serde::Serialize;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

#[derive(Debug, Error)]
#[error("failed to render kubeconfig: {0}")]
pub struct KubeconfigError(#[from] serde_yaml::Error);

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct Document<'a> {
    #[serde(rename = "apiVersion")]
    api_version: &'static str,
    kind: &'static str,
    clusters: [Named<'a, ClusterEntry>; 1],
    users: [Named<'a, UserEntry>; 1],
    contexts: [Named<'a, ContextEntry<'a>>; 1],
    current_context: &'a str,
}

#[derive(Serialize)]
struct Named<'a, T> {
    name: &'a str,
    #[serde(flatten)]
    entry: T,
}

#[derive(Serialize)]
struct ClusterEntry {
    cluster: ClusterData,
}

#[derive(Serialize)]
#[serde(rename_all = "kebab-case")]
struct ClusterData {
    server: String,
    certificate_authority_data: String,
}

#[derive(Serialize)]
struct UserEntry {
    user: UserData,
}

#[derive(Serialize, Zeroize, ZeroizeOnDrop)]
#[serde(rename_all = "kebab-case")]
struct UserData {
    client_certificate_data: String,
    client_key_data: String,
}

#[derive(Serialize)]
struct ContextEntry<'a> {
    context: ContextData<'a>,
}

#[derive(Serialize)]
struct ContextData<'a> {
    cluster: &'a str,
    user: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
}

/// Name of the context a profile for `bundle` selects.
pub fn context_name(bundle: &CredentialBundle) -> String {
    format!("{}@{}", bundle.user, bundle.cluster.name)
}

/// Renders `bundle` as a single-context kubeconfig, optionally defaulting to
/// `namespace`. The document embeds the private key and is wiped on drop.
pub fn render(
    bundle: &CredentialBundle,
    namespace: Option<&str>,
) -> Result<Zeroizing<String>, KubeconfigError> {
    let context = context_name(bundle);
    let cluster = bundle.cluster.name.as_str();
    let user = bundle.user.as_str();

    let document = Document {
        api_version: "v1",
        kind: "Config",
        clusters: [Named {
            name: cluster,
            entry: ClusterEntry {
                cluster: ClusterData {
                    server: bundle.cluster.endpoint.clone(),
                    certificate_authority_data: STANDARD.encode(&bundle.cluster.ca_pem),
                },
            },
        }],
        users: [Named {
            name: user,
            entry: UserEntry {
                user: UserData {
                    client_certificate_data: STANDARD.encode(&bundle.client_cert_pem),
                    client_key_data: STANDARD.encode(bundle.client_key_pem()),
                },
            },
        }],
        contexts: [Named {
            name: &context,
            entry: ContextEntry {
                context: ContextData {
                    cluster,
                    user,
                    namespace,
                },
            },
        }],
        current_context: &context,
    };

    Ok(Zeroizing::new(serde_yaml::to_string(&document)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use permit_types::{ClusterInfo, UserName};

    fn bundle() -> CredentialBundle {
        CredentialBundle::new(
            UserName::new("alice").unwrap(),
            ClusterInfo::new("prod", "https://k8s.example.com:6443", "CA-PEM"),
            "CERT-PEM",
            Zeroizing::new("KEY-PEM".to_string()),
        )
    }

    fn decode(value: &serde_yaml::Value) -> String {
        let encoded = value.as_str().unwrap();
        String::from_utf8(STANDARD.decode(encoded).unwrap()).unwrap()
    }

    #[test]
    fn renders_a_single_context_profile() {
        let yaml = render(&bundle(), None).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();

        assert_eq!(doc["apiVersion"], "v1");
        assert_eq!(doc["kind"], "Config");
        assert_eq!(doc["current-context"], "alice@prod");

        let cluster = &doc["clusters"][0];
        assert_eq!(cluster["name"], "prod");
        assert_eq!(cluster["cluster"]["server"], "https://k8s.example.com:6443");
        assert_eq!(decode(&cluster["cluster"]["certificate-authority-data"]), "CA-PEM");

        let user = &doc["users"][0];
        assert_eq!(user["name"], "alice");
        assert_eq!(decode(&user["user"]["client-certificate-data"]), "CERT-PEM");
        assert_eq!(decode(&user["user"]["client-key-data"]), "KEY-PEM");

        let context = &doc["contexts"][0]["context"];
        assert_eq!(context["cluster"], "prod");
        assert_eq!(context["user"], "alice");
        assert!(context.get("namespace").is_none());
    }

    #[test]
    fn default_namespace_is_optional() {
        let yaml = render(&bundle(), Some("dev")).unwrap();
        let doc: serde_yaml::Value = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(doc["contexts"][0]["context"]["namespace"], "dev");
    }
}
