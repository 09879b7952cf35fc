//! Built-in access templates.
//!
//! Templates are ClusterRoles installed once per cluster. Namespaced
//! templates are bound per namespace with RoleBindings; cluster templates
//! are bound with ClusterRoleBindings.

use std::fmt::{self, Display};
use std::str::FromStr;

use permit_types::{LABEL_MANAGED_BY, MANAGED_BY, PolicyRule, Role, RoleRef, Scope};
use serde::{Deserialize, Serialize};

/// Prefix of templates meant to be bound inside namespaces.
pub const NAMESPACED_TEMPLATE_PREFIX: &str = "template-namespaced-resources";
/// Prefix of templates meant to be bound at cluster scope.
pub const CLUSTER_TEMPLATE_PREFIX: &str = "template-cluster-resources";

const READ: [&str; 3] = ["get", "list", "watch"];
const WRITE: [&str; 7] = ["get", "list", "watch", "create", "update", "patch", "delete"];

/// Template granted inside each selected namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceTemplate {
    /// Day-to-day work on workloads and their configuration.
    Developer,
    /// Everything inside the namespace.
    Operation,
}

impl NamespaceTemplate {
    pub const ALL: [NamespaceTemplate; 2] = [NamespaceTemplate::Developer, NamespaceTemplate::Operation];

    pub fn as_str(&self) -> &'static str {
        match self {
            NamespaceTemplate::Developer => "developer",
            NamespaceTemplate::Operation => "operation",
        }
    }

    pub fn role_name(&self) -> String {
        format!("{NAMESPACED_TEMPLATE_PREFIX}___{}", self.as_str())
    }

    pub fn role_ref(&self) -> RoleRef {
        RoleRef::cluster_role(self.role_name())
    }
}

impl Display for NamespaceTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NamespaceTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "developer" => Ok(NamespaceTemplate::Developer),
            "operation" => Ok(NamespaceTemplate::Operation),
            other => Err(format!(
                "unknown namespace template {other:?} (expected developer or operation)"
            )),
        }
    }
}

/// Access to cluster-scoped resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClusterAccess {
    #[default]
    None,
    Read,
    Write,
}

impl ClusterAccess {
    /// The template implementing this level, if any.
    pub fn template(&self) -> Option<ClusterTemplate> {
        match self {
            ClusterAccess::None => None,
            ClusterAccess::Read => Some(ClusterTemplate::ReadOnly),
            ClusterAccess::Write => Some(ClusterTemplate::Admin),
        }
    }
}

impl FromStr for ClusterAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ClusterAccess::None),
            "read" => Ok(ClusterAccess::Read),
            "write" => Ok(ClusterAccess::Write),
            other => Err(format!(
                "unknown cluster access {other:?} (expected none, read or write)"
            )),
        }
    }
}

/// Template bound at cluster scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterTemplate {
    ReadOnly,
    Admin,
}

impl ClusterTemplate {
    pub const ALL: [ClusterTemplate; 2] = [ClusterTemplate::ReadOnly, ClusterTemplate::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterTemplate::ReadOnly => "read-only",
            ClusterTemplate::Admin => "admin",
        }
    }

    pub fn role_name(&self) -> String {
        format!("{CLUSTER_TEMPLATE_PREFIX}___{}", self.as_str())
    }

    pub fn role_ref(&self) -> RoleRef {
        RoleRef::cluster_role(self.role_name())
    }
}

/// Which namespaces a plan grants its namespaced template in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NamespaceSelection {
    /// Every namespace that exists when the plan is applied.
    All,
    Only(Vec<String>),
}

/// Everything `provision_user` grants a new user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPlan {
    pub template: NamespaceTemplate,
    pub namespaces: NamespaceSelection,
    #[serde(default)]
    pub cluster_access: ClusterAccess,
}

impl AccessPlan {
    pub fn new(template: NamespaceTemplate, namespaces: NamespaceSelection) -> Self {
        Self {
            template,
            namespaces,
            cluster_access: ClusterAccess::None,
        }
    }

    pub fn with_cluster_access(mut self, access: ClusterAccess) -> Self {
        self.cluster_access = access;
        self
    }
}

/// Definitions of the built-in templates.
pub struct StandardTemplates;

impl StandardTemplates {
    /// Every template, ready to be created.
    pub fn all() -> Vec<Role> {
        NamespaceTemplate::ALL
            .iter()
            .map(|t| Self::namespaced(*t))
            .chain(ClusterTemplate::ALL.iter().map(|t| Self::cluster(*t)))
            .collect()
    }

    pub fn namespaced(template: NamespaceTemplate) -> Role {
        let rules = match template {
            NamespaceTemplate::Developer => vec![
                PolicyRule::new(
                    [""],
                    [
                        "pods",
                        "services",
                        "configmaps",
                        "persistentvolumeclaims",
                        "endpoints",
                        "serviceaccounts",
                    ],
                    WRITE,
                ),
                PolicyRule::new([""], ["pods/log", "pods/status", "events"], READ),
                PolicyRule::new([""], ["pods/exec", "pods/portforward"], ["create", "get"]),
                PolicyRule::new(
                    ["apps"],
                    ["deployments", "statefulsets", "daemonsets", "replicasets"],
                    WRITE,
                ),
                PolicyRule::new(["batch"], ["jobs", "cronjobs"], WRITE),
                PolicyRule::new(["networking.k8s.io"], ["ingresses"], WRITE),
                PolicyRule::new(["autoscaling"], ["horizontalpodautoscalers"], WRITE),
            ],
            NamespaceTemplate::Operation => vec![PolicyRule::new(["*"], ["*"], ["*"])],
        };
        template_role(template.role_name(), rules)
    }

    pub fn cluster(template: ClusterTemplate) -> Role {
        let resources = [
            "namespaces",
            "nodes",
            "persistentvolumes",
            "storageclasses",
            "customresourcedefinitions",
        ];
        let rules = match template {
            ClusterTemplate::ReadOnly => vec![
                PolicyRule::new(["", "storage.k8s.io", "apiextensions.k8s.io"], resources, READ),
            ],
            ClusterTemplate::Admin => vec![
                PolicyRule::new(["", "storage.k8s.io", "apiextensions.k8s.io"], resources, ["*"]),
            ],
        };
        template_role(template.role_name(), rules)
    }
}

fn template_role(name: String, rules: Vec<PolicyRule>) -> Role {
    Role::new(name, Scope::Cluster, rules).with_labels(
        [(LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string())].into(),
    )
}
