//! Role commands.

use anyhow::Result;
use permit::{CreateOutcome, PolicyRule, RoleFilter, RoleKey, Scope};

use super::Session;
use crate::style::colors::SemanticStyle;
use crate::style::{print_list, print_success};

/// Parses `GROUPS:RESOURCES:VERBS[:NAMES]`, each part a comma-separated
/// list. An empty GROUPS part is the core API group.
pub fn parse_rule(s: &str) -> Result<PolicyRule, String> {
    let parts: Vec<&str> = s.split(':').collect();
    if !(3..=4).contains(&parts.len()) {
        return Err(format!(
            "expected GROUPS:RESOURCES:VERBS[:NAMES], got '{s}'"
        ));
    }

    let list = |part: &str| -> Vec<String> {
        part.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(String::from)
            .collect()
    };
    let groups = if parts[0].trim().is_empty() {
        vec![String::new()]
    } else {
        list(parts[0])
    };
    let resources = list(parts[1]);
    let verbs = list(parts[2]);
    if resources.is_empty() {
        return Err(format!("rule '{s}' names no resources"));
    }
    if verbs.is_empty() {
        return Err(format!("rule '{s}' names no verbs"));
    }

    let rule = PolicyRule::new(groups, resources, verbs);
    Ok(match parts.get(3) {
        Some(names) => rule.with_resource_names(list(names)),
        None => rule,
    })
}

fn scope_of(namespace: Option<String>) -> Scope {
    namespace.map_or(Scope::Cluster, Scope::Namespace)
}

pub async fn create(
    session: &Session,
    name: &str,
    namespace: Option<String>,
    rules: Vec<PolicyRule>,
) -> Result<()> {
    let engine = session.engine().await?;
    let scope = scope_of(namespace);
    let key = RoleKey::new(scope.clone(), name);

    match engine.create_role(name, scope, rules).await? {
        CreateOutcome::Created => print_success(&format!("Created {}", key.code())),
        CreateOutcome::AlreadyExists => {
            print_success(&format!("{} already exists with these rules", key.code()));
        }
    }
    Ok(())
}

pub async fn delete(session: &Session, name: &str, namespace: Option<String>) -> Result<()> {
    let engine = session.engine().await?;
    let key = RoleKey::new(scope_of(namespace), name);
    engine.delete_role(&key).await?;
    print_success(&format!("Deleted {}", key.code()));
    Ok(())
}

pub async fn list(session: &Session, namespace: Option<String>, cluster: bool) -> Result<()> {
    let engine = session.engine().await?;
    let filter = match (namespace, cluster) {
        (Some(ns), _) => RoleFilter::Namespace(ns),
        (None, true) => RoleFilter::Cluster,
        (None, false) => RoleFilter::All,
    };
    let roles = engine.list_roles(&filter).await?;

    let rows: Vec<Vec<String>> = roles
        .iter()
        .map(|role| {
            vec![
                role.kind().to_string(),
                role.scope.namespace_name().unwrap_or("-").to_string(),
                role.name.clone(),
                role.rules.len().to_string(),
            ]
        })
        .collect();
    print_list(
        &["KIND", "NAMESPACE", "NAME", "RULES"],
        &rows,
        "role",
        "No roles found.",
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_core_group_rule() {
        let rule = parse_rule(":pods,services:get,list").unwrap();
        assert_eq!(rule.api_groups, vec![String::new()]);
        assert_eq!(rule.resources, vec!["pods", "services"]);
        assert_eq!(rule.verbs, vec!["get", "list"]);
        assert!(rule.resource_names.is_empty());
    }

    #[test]
    fn parses_resource_names() {
        let rule = parse_rule("apps:deployments:get:web,api").unwrap();
        assert_eq!(rule.api_groups, vec!["apps"]);
        assert_eq!(rule.resource_names, vec!["web", "api"]);
    }

    #[test]
    fn rejects_malformed_rules() {
        assert!(parse_rule("pods").is_err());
        assert!(parse_rule("apps:deployments").is_err());
        assert!(parse_rule("apps::get").is_err());
        assert!(parse_rule("apps:deployments:").is_err());
        assert!(parse_rule("a:b:c:d:e").is_err());
    }
}
