//! Building an engine from configuration.

use permit_config::{ApprovalSetting, IssuerSettings, PermitConfig};
use permit_engine::{ApprovalMode, Engine, IssuerConfig};
use permit_store::memory::MemoryCluster;
use permit_store::{KubeSettings, KubeStore};
use tracing::info;

use crate::error::Result;

/// Issuer settings as the issuer takes them.
pub fn issuer_config(settings: &IssuerSettings) -> IssuerConfig {
    IssuerConfig {
        approval: match settings.approval {
            ApprovalSetting::SelfApprove => ApprovalMode::SelfApprove,
            ApprovalSetting::External => ApprovalMode::External,
        },
        signer_name: settings.signer_name.clone(),
        expiration: settings.certificate_lifetime(),
        poll_initial: settings.poll_initial(),
        poll_max: settings.poll_max(),
    }
}

/// Kubernetes connection settings from the `[cluster]` and `[store]`
/// sections.
pub fn kube_settings(config: &PermitConfig) -> KubeSettings {
    KubeSettings {
        cluster_name: config.cluster.name.clone(),
        endpoint: config.cluster.address.clone(),
        context: config.cluster.context.clone(),
        ca_pem: None,
        ca_config_map_namespace: config.cluster.ca_config_map_namespace.clone(),
        page_size: config.store.page_size,
    }
}

/// Connects to the configured Kubernetes cluster.
pub async fn connect(config: &PermitConfig) -> Result<Engine> {
    config.validate()?;
    let store = KubeStore::connect(kube_settings(config)).await?;
    info!(cluster = %config.cluster.name, "connected");
    Ok(engine_over(store, config))
}

/// An engine over an in-process cluster, for dry runs and tests.
pub fn in_memory(cluster: MemoryCluster, config: &PermitConfig) -> Engine {
    engine_over(cluster, config)
}

fn engine_over<C>(cluster: C, config: &PermitConfig) -> Engine
where
    C: permit_store::RbacStore + permit_store::CertificateApi + 'static,
{
    Engine::for_cluster(cluster, issuer_config(&config.issuer))
        .with_approval_timeout(config.issuer.approval_timeout())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn issuer_settings_carry_over() {
        let settings = IssuerSettings {
            approval: ApprovalSetting::External,
            certificate_lifetime_days: 1,
            poll_initial_ms: 50,
            poll_max_ms: 500,
            ..IssuerSettings::default()
        };

        let config = issuer_config(&settings);
        assert_eq!(config.approval, ApprovalMode::External);
        assert_eq!(config.expiration, Some(Duration::from_secs(86_400)));
        assert_eq!(config.poll_initial, Duration::from_millis(50));
        assert_eq!(config.poll_max, Duration::from_millis(500));
    }

    #[test]
    fn engine_uses_configured_timeout() {
        let mut config = PermitConfig::default();
        config.issuer.approval_timeout_secs = 7;

        let engine = in_memory(MemoryCluster::new("dev"), &config);
        assert_eq!(engine.approval_timeout(), Duration::from_secs(7));
    }

    #[test]
    fn kube_settings_follow_cluster_section() {
        let mut config = PermitConfig::default();
        config.cluster.address = Some("https://k8s.example.com:6443".into());
        config.store.page_size = 25;

        let settings = kube_settings(&config);
        assert_eq!(settings.endpoint.as_deref(), Some("https://k8s.example.com:6443"));
        assert_eq!(settings.page_size, 25);
        assert_eq!(settings.cluster_name, "kubernetes");
    }
}
