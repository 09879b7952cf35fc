//! "Who can" queries and rule matching.

use permit_types::{Binding, PolicyRule, Scope};
use serde::{Deserialize, Serialize};

const WILDCARD: &str = "*";

/// One API request, as the authorizer sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessQuery {
    pub verb: String,
    /// API group; `""` is the core group.
    pub api_group: String,
    pub resource: String,
    /// Specific object name, if the request targets one.
    pub name: Option<String>,
    /// Namespace of the request; `None` for cluster-scoped requests.
    pub namespace: Option<String>,
}

impl AccessQuery {
    pub fn new(
        verb: impl Into<String>,
        api_group: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            verb: verb.into(),
            api_group: api_group.into(),
            resource: resource.into(),
            name: None,
            namespace: None,
        }
    }

    pub fn in_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Whether `rule` allows this request.
    pub fn matches(&self, rule: &PolicyRule) -> bool {
        covers(&rule.verbs, &self.verb)
            && covers(&rule.api_groups, &self.api_group)
            && covers(&rule.resources, &self.resource)
            && (rule.resource_names.is_empty()
                || self
                    .name
                    .as_ref()
                    .is_some_and(|name| rule.resource_names.contains(name)))
    }

    /// Whether a binding's grants reach this request's namespace.
    ///
    /// Cluster-scope bindings reach everything; namespaced bindings only
    /// their own namespace.
    pub fn reached_by(&self, binding: &Binding) -> bool {
        match &binding.scope {
            Scope::Cluster => true,
            Scope::Namespace(ns) => self.namespace.as_deref() == Some(ns.as_str()),
        }
    }
}

fn covers(allowed: &[String], wanted: &str) -> bool {
    allowed.iter().any(|a| a == WILDCARD || a == wanted)
}
