//! # permit-types: Core types for `permit`
//!
//! Shared vocabulary of the identity & permission orchestration engine:
//! - User identities and deterministic object names ([`UserName`], [`binding_name`], [`csr_name`])
//! - RBAC objects ([`Role`], [`Binding`], [`RoleRef`], [`Subject`], [`Scope`])
//! - Certificate signing requests ([`CsrObject`], [`CsrState`])
//! - Issued credentials ([`CredentialBundle`], [`ClusterInfo`])
//! - Object references for error context ([`ObjectRef`])
//!
//! Users are not stored objects. A user exists as the `User` subject of
//! bindings and as the common name of an issued client certificate.

mod bundle;
mod csr;
mod names;
mod object;
mod rbac;

pub use bundle::{ClusterInfo, CredentialBundle};
pub use csr::{
    CsrCondition, CsrConditionKind, CsrObject, CsrState, CsrStatus, KUBE_APISERVER_CLIENT_SIGNER,
    KeyUsage,
};
pub use names::{
    CSR_NAME_PREFIX, LABEL_GENERATED_FOR_USER, LABEL_MANAGED_BY, MANAGED_BY, MAX_USER_NAME_LEN,
    NAME_SEPARATOR, NameError, UserName, binding_name, csr_name, fallback_binding_name,
    managed_labels, validate_object_name,
};
pub use object::{ObjectKind, ObjectRef};
pub use rbac::{
    Binding, BindingKey, PolicyRule, RBAC_API_GROUP, Role, RoleKey, RoleKind, RoleRef, Scope,
    Subject, SubjectKind,
};
