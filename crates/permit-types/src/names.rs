//! User identities and the deterministic object names derived from them.
//!
//! Every object the engine creates is named by a pure function of its
//! logical key, so a retried or concurrent request for the same key lands on
//! the same object name and the orchestration API's own create semantics
//! deduplicate it.

use std::collections::BTreeMap;
use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::rbac::{RoleKind, RoleRef, Scope};

/// Maximum length of a user name (also the Kubernetes label value limit).
pub const MAX_USER_NAME_LEN: usize = 63;

/// Label recording which user an object was generated for.
pub const LABEL_GENERATED_FOR_USER: &str = "generated_for_user";

/// Standard label recording the managing application.
pub const LABEL_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Value of [`LABEL_MANAGED_BY`] on objects created by this system.
pub const MANAGED_BY: &str = "permit";

/// Separator between the components of a generated object name.
pub const NAME_SEPARATOR: &str = "___";

/// Prefix of the CSR object name used for a user's issuance.
pub const CSR_NAME_PREFIX: &str = "permit-user";

/// Errors raised when validating names.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NameError {
    #[error("user name must not be empty")]
    Empty,

    #[error("user name is {len} characters long (maximum {MAX_USER_NAME_LEN})")]
    TooLong { len: usize },

    #[error("user name {name:?} contains invalid character {ch:?}")]
    InvalidCharacter { name: String, ch: char },

    #[error("user name {name:?} must start and end with a lowercase letter or digit")]
    InvalidBoundary { name: String },

    #[error("{kind} {name:?} cannot be bound at cluster scope")]
    InvalidScope { kind: RoleKind, name: String },

    #[error("object name must not be empty")]
    EmptyObjectName,

    #[error("object name {0:?} contains '/' or '%' or is a relative path segment")]
    InvalidObjectName(String),
}

/// Identity of an application user.
///
/// This is the common name (CN) of the user's client certificate and the
/// `User` subject name in bindings. Restricted to a charset that is valid in
/// a certificate subject, inside object names and as a label value. The
/// charset excludes `_` so a user name can never contain [`NAME_SEPARATOR`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UserName(String);

impl UserName {
    /// Validates and wraps a user name.
    ///
    /// # Examples
    ///
    /// ```
    /// use permit_types::UserName;
    ///
    /// assert!(UserName::new("alice").is_ok());
    /// assert!(UserName::new("jane.doe-2").is_ok());
    /// assert!(UserName::new("Alice").is_err());
    /// assert!(UserName::new("-alice").is_err());
    /// ```
    pub fn new(name: impl Into<String>) -> Result<Self, NameError> {
        let name = name.into();
        validate_user_name(&name)?;
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn validate_user_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::Empty);
    }
    if name.len() > MAX_USER_NAME_LEN {
        return Err(NameError::TooLong { len: name.len() });
    }
    if let Some(ch) = name
        .chars()
        .find(|c| !(c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '.')))
    {
        return Err(NameError::InvalidCharacter {
            name: name.to_string(),
            ch,
        });
    }

    let alnum = |c: char| c.is_ascii_lowercase() || c.is_ascii_digit();
    let starts = name.chars().next().is_some_and(alnum);
    let ends = name.chars().last().is_some_and(alnum);
    if !starts || !ends {
        return Err(NameError::InvalidBoundary {
            name: name.to_string(),
        });
    }

    Ok(())
}

/// Validates the name of an RBAC object (Role, ClusterRole, binding).
///
/// RBAC objects accept any path-segment name, which is why the generated
/// binding names may contain `:` and `___`.
pub fn validate_object_name(name: &str) -> Result<(), NameError> {
    if name.is_empty() {
        return Err(NameError::EmptyObjectName);
    }
    if name == "." || name == ".." || name.contains('/') || name.contains('%') {
        return Err(NameError::InvalidObjectName(name.to_string()));
    }
    Ok(())
}

impl Display for UserName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UserName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for UserName {
    type Error = NameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for UserName {
    type Error = NameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<UserName> for String {
    fn from(name: UserName) -> Self {
        name.0
    }
}

/// Name of the binding that grants `role` to `user` in `scope`.
///
/// | role kind   | scope        | name                    |
/// |-------------|--------------|-------------------------|
/// | ClusterRole | namespace ns | `user___role___ns`      |
/// | Role        | namespace ns | `user___role:role___ns` |
/// | ClusterRole | cluster      | `user___role`           |
///
/// A Role cannot be bound at cluster scope; callers validate that with
/// [`RoleRef::target`] first.
pub fn binding_name(user: &UserName, role: &RoleRef, scope: &Scope) -> String {
    let role_part = match role.kind {
        RoleKind::ClusterRole => role.name.clone(),
        RoleKind::Role => format!("role:{}", role.name),
    };
    match scope {
        Scope::Namespace(ns) => {
            format!("{user}{NAME_SEPARATOR}{role_part}{NAME_SEPARATOR}{ns}")
        }
        Scope::Cluster => format!("{user}{NAME_SEPARATOR}{role_part}"),
    }
}

/// Second name for the same grant, used when [`binding_name`] is already
/// taken by a binding for a different role.
///
/// Appends the first eight hex digits of a BLAKE3 hash over the role kind
/// and name. Two references whose [`binding_name`] collide (a Role `x` and a
/// ClusterRole named `role:x`) hash differently.
pub fn fallback_binding_name(user: &UserName, role: &RoleRef, scope: &Scope) -> String {
    let digest = blake3::hash(format!("{}/{}", role.kind, role.name).as_bytes()).to_hex();
    format!(
        "{}{NAME_SEPARATOR}{}",
        binding_name(user, role, scope),
        &digest.as_str()[..8]
    )
}

/// Name of the CSR object used to issue `user`'s client certificate.
pub fn csr_name(user: &UserName) -> String {
    format!("{CSR_NAME_PREFIX}{NAME_SEPARATOR}{user}")
}

/// Labels attached to every object created on behalf of `user`.
pub fn managed_labels(user: &UserName) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_GENERATED_FOR_USER.to_string(), user.to_string()),
        (LABEL_MANAGED_BY.to_string(), MANAGED_BY.to_string()),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use test_case::test_case;

    #[test_case("alice"; "plain")]
    #[test_case("a"; "single character")]
    #[test_case("jane.doe"; "dot")]
    #[test_case("ops-team-2"; "dashes")]
    #[test_case("0day"; "leading digit")]
    fn accepts_valid_user_names(name: &str) {
        assert!(UserName::new(name).is_ok(), "{name} should be valid");
    }

    #[test_case("", NameError::Empty; "empty")]
    #[test_case("Alice", NameError::InvalidCharacter { name: "Alice".into(), ch: 'A' }; "uppercase")]
    #[test_case("bob@example", NameError::InvalidCharacter { name: "bob@example".into(), ch: '@' }; "at sign")]
    #[test_case("team/x", NameError::InvalidCharacter { name: "team/x".into(), ch: '/' }; "slash")]
    #[test_case("a___b", NameError::InvalidCharacter { name: "a___b".into(), ch: '_' }; "separator")]
    #[test_case("-bob", NameError::InvalidBoundary { name: "-bob".into() }; "leading dash")]
    #[test_case("bob.", NameError::InvalidBoundary { name: "bob.".into() }; "trailing dot")]
    fn rejects_invalid_user_names(name: &str, expected: NameError) {
        assert_eq!(UserName::new(name).unwrap_err(), expected);
    }

    #[test]
    fn rejects_overlong_user_name() {
        let name = "a".repeat(MAX_USER_NAME_LEN + 1);
        assert_eq!(
            UserName::new(name).unwrap_err(),
            NameError::TooLong {
                len: MAX_USER_NAME_LEN + 1
            }
        );
    }

    #[test]
    fn user_name_deserialization_validates() {
        let ok: UserName = serde_json::from_str("\"alice\"").unwrap();
        assert_eq!(ok.as_str(), "alice");
        assert!(serde_json::from_str::<UserName>("\"Not Valid\"").is_err());
    }

    #[test]
    fn binding_names_follow_the_template_layout() {
        let user = UserName::new("alice").unwrap();
        let dev = Scope::namespace("dev");

        assert_eq!(
            binding_name(
                &user,
                &RoleRef::cluster_role("template-namespaced-resources___developer"),
                &dev
            ),
            "alice___template-namespaced-resources___developer___dev"
        );
        assert_eq!(
            binding_name(&user, &RoleRef::role("deployer"), &dev),
            "alice___role:deployer___dev"
        );
        assert_eq!(
            binding_name(&user, &RoleRef::cluster_role("viewer"), &Scope::Cluster),
            "alice___viewer"
        );
    }

    #[test]
    fn role_and_cluster_role_of_same_name_get_distinct_bindings() {
        let user = UserName::new("alice").unwrap();
        let scope = Scope::namespace("dev");
        assert_ne!(
            binding_name(&user, &RoleRef::role("viewer"), &scope),
            binding_name(&user, &RoleRef::cluster_role("viewer"), &scope)
        );
    }

    #[test]
    fn fallback_names_separate_colliding_references() {
        let user = UserName::new("alice").unwrap();
        let dev = Scope::namespace("dev");
        let role = RoleRef::role("x");
        let cluster_role = RoleRef::cluster_role("role:x");

        assert_eq!(
            binding_name(&user, &role, &dev),
            binding_name(&user, &cluster_role, &dev)
        );
        assert_ne!(
            fallback_binding_name(&user, &role, &dev),
            fallback_binding_name(&user, &cluster_role, &dev)
        );
        assert!(
            fallback_binding_name(&user, &role, &dev).starts_with("alice___role:x___dev___")
        );
        assert_eq!(
            fallback_binding_name(&user, &role, &dev),
            fallback_binding_name(&user, &role, &dev)
        );
    }

    #[test]
    fn csr_name_is_deterministic() {
        let user = UserName::new("alice").unwrap();
        assert_eq!(csr_name(&user), "permit-user___alice");
        assert_eq!(csr_name(&user), csr_name(&user.clone()));
    }

    #[test]
    fn object_names_reject_path_segments() {
        assert!(validate_object_name("system:viewer").is_ok());
        assert!(validate_object_name("").is_err());
        assert!(validate_object_name("..").is_err());
        assert!(validate_object_name("a/b").is_err());
    }

    fn user_name_strategy() -> impl Strategy<Value = UserName> {
        "[a-z0-9]([a-z0-9.-]{0,20}[a-z0-9])?".prop_map(|s| UserName::new(s).unwrap())
    }

    proptest! {
        #[test]
        fn generated_names_are_valid_objects(user in user_name_strategy(), role in "[a-z][a-z0-9-]{0,20}", ns in "[a-z][a-z0-9-]{0,20}") {
            let name = binding_name(&user, &RoleRef::cluster_role(role), &Scope::namespace(ns));
            prop_assert!(validate_object_name(&name).is_ok());
            prop_assert!(validate_object_name(&csr_name(&user)).is_ok());
        }

        #[test]
        fn distinct_users_never_share_a_binding_name(a in user_name_strategy(), b in user_name_strategy(), role in "[a-z][a-z0-9-]{0,20}") {
            prop_assume!(a != b);
            let role = RoleRef::cluster_role(role);
            prop_assert_ne!(
                binding_name(&a, &role, &Scope::Cluster),
                binding_name(&b, &role, &Scope::Cluster)
            );
        }
    }
}
