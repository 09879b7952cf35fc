//! Conversions between `k8s-openapi` objects and the domain types.

use std::collections::BTreeMap;

use k8s_openapi::ByteString;
use k8s_openapi::api::certificates::v1 as certificates;
use k8s_openapi::api::rbac::v1 as rbac;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use permit_types::{
    Binding, CsrCondition, CsrConditionKind, CsrObject, CsrStatus, KeyUsage, ObjectRef,
    PolicyRule, RBAC_API_GROUP, Role, RoleKind, RoleRef, Scope, Subject, SubjectKind,
};

use crate::{StoreError, StoreResult};

fn meta(name: &str, scope: &Scope, labels: &BTreeMap<String, String>) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: scope.namespace_name().map(str::to_string),
        labels: (!labels.is_empty()).then(|| labels.clone()),
        ..ObjectMeta::default()
    }
}

fn name_of(meta: &ObjectMeta, object: &ObjectRef) -> StoreResult<String> {
    meta.name
        .clone()
        .ok_or_else(|| StoreError::invalid(object.clone(), "object has no name"))
}

fn scope_of(meta: &ObjectMeta) -> Scope {
    meta.namespace
        .clone()
        .map_or(Scope::Cluster, Scope::Namespace)
}

fn rule_to_kube(rule: &PolicyRule) -> rbac::PolicyRule {
    let opt = |v: &Vec<String>| (!v.is_empty()).then(|| v.clone());
    rbac::PolicyRule {
        api_groups: opt(&rule.api_groups),
        resources: opt(&rule.resources),
        verbs: rule.verbs.clone(),
        resource_names: opt(&rule.resource_names),
        non_resource_urls: opt(&rule.non_resource_urls),
    }
}

fn rule_from_kube(rule: rbac::PolicyRule) -> PolicyRule {
    PolicyRule {
        api_groups: rule.api_groups.unwrap_or_default(),
        resources: rule.resources.unwrap_or_default(),
        verbs: rule.verbs,
        resource_names: rule.resource_names.unwrap_or_default(),
        non_resource_urls: rule.non_resource_urls.unwrap_or_default(),
    }
}

pub(super) fn role_to_kube(role: &Role) -> rbac::Role {
    rbac::Role {
        metadata: meta(&role.name, &role.scope, &role.labels),
        rules: Some(role.rules.iter().map(rule_to_kube).collect()),
    }
}

pub(super) fn cluster_role_to_kube(role: &Role) -> rbac::ClusterRole {
    rbac::ClusterRole {
        metadata: meta(&role.name, &Scope::Cluster, &role.labels),
        rules: Some(role.rules.iter().map(rule_to_kube).collect()),
        aggregation_rule: None,
    }
}

fn role_from_parts(
    metadata: ObjectMeta,
    rules: Option<Vec<rbac::PolicyRule>>,
    scope: Scope,
    object: &ObjectRef,
) -> StoreResult<Role> {
    let name = name_of(&metadata, object)?;
    let rules = rules
        .unwrap_or_default()
        .into_iter()
        .map(rule_from_kube)
        .collect();
    Ok(Role::new(name, scope, rules).with_labels(metadata.labels.unwrap_or_default()))
}

pub(super) fn role_from_kube(role: rbac::Role, object: &ObjectRef) -> StoreResult<Role> {
    let scope = scope_of(&role.metadata);
    if scope.is_cluster() {
        return Err(StoreError::invalid(object.clone(), "Role without a namespace"));
    }
    role_from_parts(role.metadata, role.rules, scope, object)
}

pub(super) fn cluster_role_from_kube(
    role: rbac::ClusterRole,
    object: &ObjectRef,
) -> StoreResult<Role> {
    role_from_parts(role.metadata, role.rules, Scope::Cluster, object)
}

fn role_ref_to_kube(role_ref: &RoleRef) -> rbac::RoleRef {
    rbac::RoleRef {
        api_group: RBAC_API_GROUP.to_string(),
        kind: role_ref.kind.as_str().to_string(),
        name: role_ref.name.clone(),
    }
}

fn role_ref_from_kube(role_ref: rbac::RoleRef, object: &ObjectRef) -> StoreResult<RoleRef> {
    let kind = RoleKind::parse(&role_ref.kind).ok_or_else(|| {
        StoreError::invalid(
            object.clone(),
            format!("unknown roleRef kind {:?}", role_ref.kind),
        )
    })?;
    Ok(RoleRef {
        kind,
        name: role_ref.name,
    })
}

fn subject_to_kube(subject: &Subject) -> rbac::Subject {
    let api_group = match subject.kind {
        SubjectKind::User | SubjectKind::Group => Some(RBAC_API_GROUP.to_string()),
        SubjectKind::ServiceAccount => None,
    };
    rbac::Subject {
        api_group,
        kind: subject.kind.as_str().to_string(),
        name: subject.name.clone(),
        namespace: subject.namespace.clone(),
    }
}

/// Subjects of kinds this crate does not model are dropped; they can never
/// name a managed user.
fn subjects_from_kube(subjects: Option<Vec<rbac::Subject>>) -> Vec<Subject> {
    subjects
        .unwrap_or_default()
        .into_iter()
        .filter_map(|s| {
            Some(Subject {
                kind: SubjectKind::parse(&s.kind)?,
                name: s.name,
                namespace: s.namespace,
            })
        })
        .collect()
}

pub(super) fn role_binding_to_kube(binding: &Binding) -> rbac::RoleBinding {
    let mut metadata = meta(&binding.name, &binding.scope, &binding.labels);
    metadata.resource_version = binding.resource_version.clone();
    rbac::RoleBinding {
        metadata,
        role_ref: role_ref_to_kube(&binding.role_ref),
        subjects: Some(binding.subjects.iter().map(subject_to_kube).collect()),
    }
}

pub(super) fn cluster_role_binding_to_kube(binding: &Binding) -> rbac::ClusterRoleBinding {
    let mut metadata = meta(&binding.name, &Scope::Cluster, &binding.labels);
    metadata.resource_version = binding.resource_version.clone();
    rbac::ClusterRoleBinding {
        metadata,
        role_ref: role_ref_to_kube(&binding.role_ref),
        subjects: Some(binding.subjects.iter().map(subject_to_kube).collect()),
    }
}

fn binding_from_parts(
    metadata: ObjectMeta,
    role_ref: rbac::RoleRef,
    subjects: Option<Vec<rbac::Subject>>,
    scope: Scope,
    object: &ObjectRef,
) -> StoreResult<Binding> {
    let name = name_of(&metadata, object)?;
    let mut binding = Binding::new(
        name,
        scope,
        role_ref_from_kube(role_ref, object)?,
        subjects_from_kube(subjects),
    )
    .with_labels(metadata.labels.unwrap_or_default());
    binding.resource_version = metadata.resource_version;
    Ok(binding)
}

pub(super) fn role_binding_from_kube(
    binding: rbac::RoleBinding,
    object: &ObjectRef,
) -> StoreResult<Binding> {
    let scope = scope_of(&binding.metadata);
    if scope.is_cluster() {
        return Err(StoreError::invalid(
            object.clone(),
            "RoleBinding without a namespace",
        ));
    }
    binding_from_parts(
        binding.metadata,
        binding.role_ref,
        binding.subjects,
        scope,
        object,
    )
}

pub(super) fn cluster_role_binding_from_kube(
    binding: rbac::ClusterRoleBinding,
    object: &ObjectRef,
) -> StoreResult<Binding> {
    binding_from_parts(
        binding.metadata,
        binding.role_ref,
        binding.subjects,
        Scope::Cluster,
        object,
    )
}

pub(super) fn csr_to_kube(csr: &CsrObject) -> certificates::CertificateSigningRequest {
    certificates::CertificateSigningRequest {
        metadata: meta(&csr.name, &Scope::Cluster, &csr.labels),
        spec: certificates::CertificateSigningRequestSpec {
            request: ByteString(csr.request_pem.as_bytes().to_vec()),
            signer_name: csr.signer_name.clone(),
            usages: Some(csr.usages.iter().map(|u| u.as_str().to_string()).collect()),
            expiration_seconds: csr.expiration_seconds,
            ..Default::default()
        },
        status: None,
    }
}

fn text(bytes: ByteString, object: &ObjectRef, field: &str) -> StoreResult<String> {
    String::from_utf8(bytes.0)
        .map_err(|_| StoreError::invalid(object.clone(), format!("{field} is not UTF-8 PEM")))
}

pub(super) fn csr_from_kube(
    csr: certificates::CertificateSigningRequest,
    object: &ObjectRef,
) -> StoreResult<CsrObject> {
    let name = name_of(&csr.metadata, object)?;
    let usages = csr
        .spec
        .usages
        .unwrap_or_default()
        .iter()
        .filter_map(|u| KeyUsage::parse(u))
        .collect();

    let status = match csr.status {
        Some(status) => CsrStatus {
            conditions: status
                .conditions
                .unwrap_or_default()
                .into_iter()
                .filter(|c| c.status == "True")
                .filter_map(|c| {
                    Some(CsrCondition::new(
                        CsrConditionKind::parse(&c.type_)?,
                        c.reason.unwrap_or_default(),
                        c.message.unwrap_or_default(),
                    ))
                })
                .collect(),
            certificate_pem: status
                .certificate
                .map(|cert| text(cert, object, "status.certificate"))
                .transpose()?,
        },
        None => CsrStatus::default(),
    };

    Ok(CsrObject {
        name,
        request_pem: text(csr.spec.request, object, "spec.request")?,
        signer_name: csr.spec.signer_name,
        usages,
        expiration_seconds: csr.spec.expiration_seconds,
        labels: csr.metadata.labels.unwrap_or_default(),
        status,
    })
}

/// Appends an `Approved=True` condition to a fetched CSR.
pub(super) fn push_approval(
    csr: &mut certificates::CertificateSigningRequest,
    reason: &str,
    message: &str,
) {
    let status = csr.status.get_or_insert_with(Default::default);
    status
        .conditions
        .get_or_insert_with(Vec::new)
        .push(certificates::CertificateSigningRequestCondition {
            type_: CsrConditionKind::Approved.as_str().to_string(),
            status: "True".to_string(),
            reason: Some(reason.to_string()),
            message: Some(message.to_string()),
            ..Default::default()
        });
}

#[cfg(test)]
mod tests {
    use super::*;
    use permit_types::{ObjectKind, RoleKey};

    #[test]
    fn role_binding_round_trips_through_kube_types() {
        let binding = Binding::new(
            "alice___viewer___dev",
            Scope::namespace("dev"),
            RoleRef::cluster_role("viewer"),
            vec![
                Subject::user("alice"),
                Subject::service_account("dev", "ci"),
            ],
        );

        let kube = role_binding_to_kube(&binding);
        assert_eq!(kube.role_ref.api_group, RBAC_API_GROUP);
        assert_eq!(kube.metadata.namespace.as_deref(), Some("dev"));

        let object = ObjectRef::binding(&binding.key());
        let back = role_binding_from_kube(kube, &object).unwrap();
        assert!(back.same_definition(&binding));
    }

    #[test]
    fn unknown_subject_kinds_are_dropped() {
        let subjects = subjects_from_kube(Some(vec![
            rbac::Subject {
                kind: "User".into(),
                name: "alice".into(),
                ..Default::default()
            },
            rbac::Subject {
                kind: "Robot".into(),
                name: "r2".into(),
                ..Default::default()
            },
        ]));
        assert_eq!(subjects, vec![Subject::user("alice")]);
    }

    #[test]
    fn empty_rule_lists_map_to_absent_fields() {
        let role = Role::new(
            "viewer",
            Scope::Cluster,
            vec![PolicyRule::new([""], ["pods"], ["get"])],
        );
        let kube = cluster_role_to_kube(&role);
        let rule = &kube.rules.as_ref().unwrap()[0];
        assert!(rule.resource_names.is_none());
        assert!(rule.non_resource_urls.is_none());

        let object = ObjectRef::role(&RoleKey::new(Scope::Cluster, "viewer"));
        assert!(cluster_role_from_kube(kube, &object).unwrap().same_definition(&role));
    }

    #[test]
    fn csr_status_conditions_are_read_only_when_true() {
        let mut kube = csr_to_kube(&CsrObject::client_auth("c", "PEM", "signer"));
        kube.status = Some(certificates::CertificateSigningRequestStatus {
            conditions: Some(vec![certificates::CertificateSigningRequestCondition {
                type_: "Denied".into(),
                status: "False".into(),
                ..Default::default()
            }]),
            certificate: None,
        });
        push_approval(&mut kube, "SelfApproved", "ok");

        let object = ObjectRef::cluster(ObjectKind::CertificateSigningRequest, "c");
        let csr = csr_from_kube(kube, &object).unwrap();
        assert_eq!(csr.status.conditions.len(), 1);
        assert_eq!(csr.status.conditions[0].kind, CsrConditionKind::Approved);
        assert_eq!(csr.request_pem, "PEM");
    }
}
