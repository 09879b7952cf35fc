//! # permit-graph: who holds what
//!
//! A [`PermissionGraph`] joins users to the bindings that name them and
//! resolves each binding's role reference against the roles that exist.
//!
//! The graph is a pure function of one listing. It is built on demand and
//! dropped after the query; nothing here caches across calls. A binding
//! whose role does not resolve is a [`Resolution::Dangling`] entry, never
//! an error and never silently skipped.
//!
//! Only `User` subjects are identities. Groups and service accounts named
//! by the same bindings are carried along but never listed as users.

mod query;


use std::collections::{BTreeMap, BTreeSet};

use futures::try_join;
use permit_store::{ListScope, RbacStore, StoreResult, collect};
use permit_types::{Binding, BindingKey, Role, RoleKey, Scope};
use serde::Serialize;
use tracing::{debug, warn};

pub use query::AccessQuery;

/// How a binding's role reference resolves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Resolution {
    Resolved(Role),
    /// The referenced role does not exist. `target` is `None` when the
    /// reference cannot be valid at all (a `Role` bound at cluster scope).
    Dangling { target: Option<RoleKey> },
}

/// A binding together with what its role reference resolves to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BindingEntry {
    pub binding: Binding,
    pub resolution: Resolution,
}

impl BindingEntry {
    pub fn is_dangling(&self) -> bool {
        matches!(self.resolution, Resolution::Dangling { .. })
    }

    pub fn role(&self) -> Option<&Role> {
        match &self.resolution {
            Resolution::Resolved(role) => Some(role),
            Resolution::Dangling { .. } => None,
        }
    }
}

/// An effective grant: `role` applies to the user within `scope`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Grant {
    pub scope: Scope,
    pub binding: BindingKey,
    pub role: Role,
}

/// Users joined to their bindings and roles.
#[derive(Debug, Clone, Default)]
pub struct PermissionGraph {
    entries: Vec<BindingEntry>,
    by_user: BTreeMap<String, Vec<usize>>,
}

impl PermissionGraph {
    /// Builds the graph from a complete listing of roles and bindings.
    pub fn from_listing<R, B>(roles: R, bindings: B) -> Self
    where
        R: IntoIterator<Item = Role>,
        B: IntoIterator<Item = Binding>,
    {
        let roles: BTreeMap<RoleKey, Role> = roles.into_iter().map(|r| (r.key(), r)).collect();

        let mut entries: Vec<BindingEntry> = bindings
            .into_iter()
            .map(|binding| {
                let target = binding.target_role();
                let resolution = match target.as_ref().and_then(|key| roles.get(key)) {
                    Some(role) => Resolution::Resolved(role.clone()),
                    None => Resolution::Dangling { target },
                };
                BindingEntry {
                    binding,
                    resolution,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.binding.key().cmp(&b.binding.key()));

        let mut by_user: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, entry) in entries.iter().enumerate() {
            let users: BTreeSet<&str> = entry.binding.user_subjects().collect();
            for user in users {
                by_user.entry(user.to_string()).or_default().push(index);
            }
        }

        Self { entries, by_user }
    }

    /// Lists every role and binding from `store` and builds the graph.
    pub async fn load(store: &dyn RbacStore) -> StoreResult<Self> {
        let (cluster_roles, roles, cluster_bindings, bindings) = try_join!(
            collect(store.list_roles(ListScope::Cluster)),
            collect(store.list_roles(ListScope::AllNamespaces)),
            collect(store.list_bindings(ListScope::Cluster)),
            collect(store.list_bindings(ListScope::AllNamespaces)),
        )?;
        debug!(
            roles = cluster_roles.len() + roles.len(),
            bindings = cluster_bindings.len() + bindings.len(),
            "listed RBAC objects"
        );

        let graph = Self::from_listing(
            cluster_roles.into_iter().chain(roles),
            cluster_bindings.into_iter().chain(bindings),
        );
        for entry in graph.dangling() {
            warn!(
                binding = %entry.binding.key(),
                role = %entry.binding.role_ref,
                "binding references a role that does not exist"
            );
        }
        Ok(graph)
    }

    /// Distinct user names across all bindings, sorted.
    pub fn users(&self) -> impl Iterator<Item = &str> {
        self.by_user.keys().map(String::as_str)
    }

    pub fn contains_user(&self, user: &str) -> bool {
        self.by_user.contains_key(user)
    }

    /// Every binding, sorted by scope and name.
    pub fn entries(&self) -> &[BindingEntry] {
        &self.entries
    }

    /// Bindings naming `user`, resolved or dangling.
    pub fn bindings_for(&self, user: &str) -> Vec<&BindingEntry> {
        self.by_user
            .get(user)
            .map(|indices| indices.iter().map(|&i| &self.entries[i]).collect())
            .unwrap_or_default()
    }

    /// Resolved grants of `user`.
    pub fn grants_for(&self, user: &str) -> Vec<Grant> {
        self.bindings_for(user)
            .into_iter()
            .filter_map(|entry| {
                entry.role().map(|role| Grant {
                    scope: entry.binding.scope.clone(),
                    binding: entry.binding.key(),
                    role: role.clone(),
                })
            })
            .collect()
    }

    /// All bindings whose role does not resolve.
    pub fn dangling(&self) -> impl Iterator<Item = &BindingEntry> {
        self.entries.iter().filter(|e| e.is_dangling())
    }

    pub fn dangling_for(&self, user: &str) -> Vec<&BindingEntry> {
        self.bindings_for(user)
            .into_iter()
            .filter(|e| e.is_dangling())
            .collect()
    }

    /// Users allowed to perform `query`.
    pub fn who_can(&self, query: &AccessQuery) -> BTreeSet<&str> {
        self.entries
            .iter()
            .filter(|entry| query.reached_by(&entry.binding))
            .filter(|entry| {
                entry
                    .role()
                    .is_some_and(|role| role.rules.iter().any(|rule| query.matches(rule)))
            })
            .flat_map(|entry| entry.binding.user_subjects())
            .collect()
    }
}
