//! Grant, revoke and binding listings.

use anyhow::{Result, bail};
use permit::{GrantOutcome, Resolution, RoleRef, Scope};

use super::Session;
use crate::style::colors::SemanticStyle;
use crate::style::{print_list, print_success};

/// Resolves `--role` / `--cluster-role` / `--namespace` into the role
/// reference and binding scope.
pub fn target(
    role: Option<String>,
    cluster_role: Option<String>,
    namespace: Option<String>,
) -> Result<(RoleRef, Scope)> {
    let scope = namespace.map_or(Scope::Cluster, Scope::Namespace);
    match (role, cluster_role) {
        (Some(_), _) if scope.is_cluster() => bail!("--role requires --namespace"),
        (Some(name), None) => Ok((RoleRef::role(name), scope)),
        (None, Some(name)) => Ok((RoleRef::cluster_role(name), scope)),
        (Some(_), Some(_)) => bail!("--role and --cluster-role are mutually exclusive"),
        (None, None) => bail!("one of --role or --cluster-role is required"),
    }
}

pub async fn grant(session: &Session, user: &str, role: &RoleRef, scope: &Scope) -> Result<()> {
    let engine = session.engine().await?;
    match engine.grant_role(user, role, scope).await? {
        GrantOutcome::Granted(key) => print_success(&format!(
            "Granted {} to {} via {}",
            role.code(),
            user.code(),
            key
        )),
        GrantOutcome::AlreadyGranted(key) => print_success(&format!(
            "{} already holds {} via {}",
            user.code(),
            role.code(),
            key
        )),
    }
    Ok(())
}

pub async fn revoke(session: &Session, user: &str, role: &RoleRef, scope: &Scope) -> Result<()> {
    let engine = session.engine().await?;
    let removal = engine.revoke_role(user, role, scope).await?;
    if removal.is_empty() {
        print_success(&format!(
            "{} did not hold {} in {scope}",
            user.code(),
            role.code()
        ));
    } else {
        print_success(&format!(
            "Revoked {} from {} in {scope}",
            role.code(),
            user.code()
        ));
    }
    Ok(())
}

/// Lists bindings, optionally only those naming `user`.
pub async fn bindings(session: &Session, user: Option<&str>) -> Result<()> {
    let engine = session.engine().await?;
    let entries = engine.list_bindings(user).await?;

    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|entry| {
            let binding = &entry.binding;
            let subjects: Vec<String> = binding
                .subjects
                .iter()
                .map(|s| format!("{}:{}", s.kind.as_str(), s.name))
                .collect();
            let status = match &entry.resolution {
                Resolution::Resolved(_) => "ok".to_string(),
                Resolution::Dangling { .. } => "dangling".warning(),
            };
            vec![
                binding.scope.namespace_name().unwrap_or("-").to_string(),
                binding.name.clone(),
                binding.role_ref.to_string(),
                subjects.join(", "),
                status,
            ]
        })
        .collect();
    print_list(
        &["NAMESPACE", "NAME", "ROLE", "SUBJECTS", "STATUS"],
        &rows,
        "binding",
        "No bindings found.",
    );
    Ok(())
}
