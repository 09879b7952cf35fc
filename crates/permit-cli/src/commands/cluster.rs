//! Cluster-wide commands: namespaces, templates and access queries.

use anyhow::Result;
use permit::{AccessQuery, CreateOutcome};

use super::Session;
use crate::style::colors::SemanticStyle;
use crate::style::{print_hint, print_list, print_success};

pub async fn namespaces(session: &Session) -> Result<()> {
    let engine = session.engine().await?;
    let rows: Vec<Vec<String>> = engine
        .list_namespaces()
        .await?
        .into_iter()
        .map(|ns| vec![ns])
        .collect();
    print_list(&["NAMESPACE"], &rows, "namespace", "No namespaces found.");
    Ok(())
}

/// Creates whichever built-in template ClusterRoles are missing.
pub async fn install_templates(session: &Session) -> Result<()> {
    let engine = session.engine().await?;
    for (key, outcome) in engine.install_templates().await? {
        match outcome {
            CreateOutcome::Created => print_success(&format!("Created {}", key.code())),
            CreateOutcome::AlreadyExists => {
                print_success(&format!("{} already installed", key.code()));
            }
        }
    }
    print_hint("Grant a template with 'permit user provision NAME --template developer ...'");
    Ok(())
}

pub async fn who_can(
    session: &Session,
    verb: &str,
    group: &str,
    resource: &str,
    name: Option<String>,
    namespace: Option<String>,
) -> Result<()> {
    let engine = session.engine().await?;
    let mut query = AccessQuery::new(verb, group, resource);
    if let Some(ns) = namespace {
        query = query.in_namespace(ns);
    }
    if let Some(name) = name {
        query = query.named(name);
    }

    let rows: Vec<Vec<String>> = engine
        .who_can(&query)
        .await?
        .into_iter()
        .map(|user| vec![user])
        .collect();
    print_list(&["USER"], &rows, "user", "No user can do that.");
    Ok(())
}
