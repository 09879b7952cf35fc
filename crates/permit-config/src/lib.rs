//! Configuration management for permit
//!
//! Settings are merged from several sources, highest precedence first:
//! 1. CLI arguments (applied by the binary)
//! 2. Environment variables (`PERMIT_` prefix, `__` between nested keys,
//!    e.g. `PERMIT_ISSUER__APPROVAL=external`)
//! 3. `permit.local.toml` (local overrides, kept out of version control)
//! 4. `permit.toml` (project config)
//! 5. `~/.config/permit/config.toml` (user defaults)
//! 6. Built-in defaults

use serde::{Deserialize, Serialize};
use std::time::Duration;

mod error;
mod loader;
mod paths;

pub use error::ConfigError;
pub use loader::{ConfigLoader, ENV_PREFIX, ENV_SEPARATOR};
pub use paths::Paths;

/// Signer addressed by default: the API server's client-certificate signer.
pub const DEFAULT_SIGNER: &str = "kubernetes.io/kube-apiserver-client";

/// Complete permit configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermitConfig {
    pub cluster: ClusterSettings,
    pub issuer: IssuerSettings,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

/// The cluster permit talks to and how generated profiles describe it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterSettings {
    /// Cluster name written into generated kubeconfigs.
    pub name: String,
    /// Public control-plane URL for generated kubeconfigs. Unset means the
    /// URL of the connection permit itself uses.
    pub address: Option<String>,
    /// kubeconfig context to connect with. Unset means the current context
    /// (or the in-cluster service account).
    pub context: Option<String>,
    /// Namespace holding the `kube-root-ca.crt` config map.
    pub ca_config_map_namespace: String,
}

impl Default for ClusterSettings {
    fn default() -> Self {
        Self {
            name: "kubernetes".to_string(),
            address: None,
            context: None,
            ca_config_map_namespace: "default".to_string(),
        }
    }
}

/// Who approves certificate requests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ApprovalSetting {
    /// permit approves its own requests.
    #[default]
    #[serde(rename = "self")]
    SelfApprove,
    /// An administrator or controller approves them.
    External,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuerSettings {
    pub approval: ApprovalSetting,
    pub signer_name: String,
    /// Requested certificate lifetime; `0` leaves it to the signer.
    pub certificate_lifetime_days: u32,
    pub poll_initial_ms: u64,
    pub poll_max_ms: u64,
    /// How long `user create` waits for approval and signing.
    pub approval_timeout_secs: u64,
}

impl Default for IssuerSettings {
    fn default() -> Self {
        Self {
            approval: ApprovalSetting::default(),
            signer_name: DEFAULT_SIGNER.to_string(),
            certificate_lifetime_days: 365,
            poll_initial_ms: 250,
            poll_max_ms: 5_000,
            approval_timeout_secs: 60,
        }
    }
}

impl IssuerSettings {
    pub fn certificate_lifetime(&self) -> Option<Duration> {
        (self.certificate_lifetime_days > 0)
            .then(|| Duration::from_secs(u64::from(self.certificate_lifetime_days) * 24 * 60 * 60))
    }

    pub fn poll_initial(&self) -> Duration {
        Duration::from_millis(self.poll_initial_ms)
    }

    pub fn poll_max(&self) -> Duration {
        Duration::from_millis(self.poll_max_ms)
    }

    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    /// Objects requested per listing page.
    pub page_size: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self { page_size: 100 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `tracing-subscriber` filter directive; `RUST_LOG` wins when set.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::default(),
        }
    }
}

impl PermitConfig {
    /// Loads configuration from the default locations
    pub fn load() -> Result<Self, ConfigError> {
        ConfigLoader::new().load()
    }

    /// Rejects values no component can work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cluster.name.trim().is_empty() {
            return Err(ConfigError::invalid("cluster.name", "must not be empty"));
        }
        if self
            .cluster
            .address
            .as_deref()
            .is_some_and(|address| address.trim().is_empty())
        {
            return Err(ConfigError::invalid("cluster.address", "must not be empty"));
        }
        if self.store.page_size == 0 {
            return Err(ConfigError::invalid("store.page_size", "must be at least 1"));
        }
        if self.issuer.poll_initial_ms == 0 {
            return Err(ConfigError::invalid("issuer.poll_initial_ms", "must be at least 1"));
        }
        if self.issuer.poll_max_ms < self.issuer.poll_initial_ms {
            return Err(ConfigError::invalid(
                "issuer.poll_max_ms",
                format!(
                    "{} is below issuer.poll_initial_ms ({})",
                    self.issuer.poll_max_ms, self.issuer.poll_initial_ms
                ),
            ));
        }
        if self.issuer.approval_timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "issuer.approval_timeout_secs",
                "must be at least 1",
            ));
        }
        if self.issuer.signer_name.trim().is_empty() {
            return Err(ConfigError::invalid("issuer.signer_name", "must not be empty"));
        }
        Ok(())
    }

    /// The effective configuration as a TOML document.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn defaults_are_valid() {
        let config = PermitConfig::default();
        config.validate().unwrap();

        assert_eq!(config.issuer.certificate_lifetime().unwrap().as_secs(), 31_536_000);
        assert_eq!(config.issuer.poll_initial(), Duration::from_millis(250));
        assert_eq!(config.issuer.approval_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn zero_lifetime_defers_to_the_signer() {
        let issuer = IssuerSettings {
            certificate_lifetime_days: 0,
            ..IssuerSettings::default()
        };
        assert_eq!(issuer.certificate_lifetime(), None);
    }

    #[test_case(|c: &mut PermitConfig| c.cluster.address = Some(" ".into()), "cluster.address"; "blank address")]
    #[test_case(|c: &mut PermitConfig| c.cluster.name = String::new(), "cluster.name"; "blank name")]
    #[test_case(|c: &mut PermitConfig| c.store.page_size = 0, "store.page_size"; "zero page size")]
    #[test_case(|c: &mut PermitConfig| c.issuer.poll_max_ms = 100, "issuer.poll_max_ms"; "max below initial")]
    #[test_case(|c: &mut PermitConfig| c.issuer.approval_timeout_secs = 0, "issuer.approval_timeout_secs"; "zero timeout")]
    fn validation_names_the_offending_field(change: fn(&mut PermitConfig), expected: &str) {
        let mut config = PermitConfig::default();
        change(&mut config);

        match config.validate() {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, expected),
            other => panic!("expected invalid {expected}, got {other:?}"),
        }
    }

    #[test]
    fn rendered_toml_round_trips() {
        let config = PermitConfig::default();
        let rendered = config.to_toml().unwrap();

        assert!(rendered.contains("approval = \"self\""));
        let parsed: PermitConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
