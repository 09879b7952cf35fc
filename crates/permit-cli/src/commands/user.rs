//! User commands.

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use permit::{AccessPlan, CredentialBundle, Engine, GrantOutcome};

use super::{Session, interrupt_token};
use crate::style::colors::SemanticStyle;
use crate::style::{print_hint, print_labeled, print_list, print_success, print_warn};

/// Issues a certificate for a new user and writes its kubeconfig.
pub async fn create(
    session: &Session,
    name: &str,
    output: Option<&Path>,
    namespace: Option<&str>,
    timeout_secs: Option<u64>,
) -> Result<()> {
    let engine = session.engine().await?;
    let timeout = timeout_secs.map_or(engine.approval_timeout(), Duration::from_secs);

    let bundle = engine
        .create_user_within(name, timeout, &interrupt_token())
        .await?;
    write_kubeconfig(&engine, &bundle, namespace, output)?;

    print_hint(&format!(
        "User {} has no permissions yet; grant some with 'permit grant {name} ...'",
        name.code()
    ));
    Ok(())
}

/// Creates a user and grants an access template.
pub async fn provision(
    session: &Session,
    name: &str,
    plan: &AccessPlan,
    output: Option<&Path>,
) -> Result<()> {
    let engine = session.engine().await?;
    let provisioned = engine
        .provision_user(name, plan, &interrupt_token())
        .await?;

    let namespace = provisioned
        .grants
        .iter()
        .find_map(|grant| grant.binding().scope.namespace_name());
    write_kubeconfig(&engine, &provisioned.bundle, namespace, output)?;

    // stderr: stdout may be carrying the kubeconfig.
    for grant in &provisioned.grants {
        match grant {
            GrantOutcome::Granted(key) => print_hint(&format!("granted {key}")),
            GrantOutcome::AlreadyGranted(key) => print_hint(&format!("already granted {key}")),
        }
    }
    Ok(())
}

/// Removes a user from every binding.
pub async fn delete(session: &Session, name: &str) -> Result<()> {
    let engine = session.engine().await?;
    let removal = engine.delete_user(name).await?;

    if removal.is_empty() {
        print_success(&format!("No bindings named user {}", name.code()));
    } else {
        print_success(&format!(
            "Removed user {} from {} binding(s)",
            name.code(),
            removal.deleted.len() + removal.trimmed.len()
        ));
        for key in &removal.deleted {
            print_labeled("deleted", &key.to_string());
        }
        for key in &removal.trimmed {
            print_labeled("trimmed", &key.to_string());
        }
    }
    print_warn("Certificates already issued stay valid until they expire; they no longer grant access.");
    Ok(())
}

/// Lists users and their binding counts.
pub async fn list(session: &Session) -> Result<()> {
    let engine = session.engine().await?;
    let users = engine.list_users().await?;

    let rows: Vec<Vec<String>> = users
        .iter()
        .map(|user| {
            vec![
                user.name.clone(),
                user.bindings.to_string(),
                user.dangling.to_string(),
            ]
        })
        .collect();
    print_list(
        &["NAME", "BINDINGS", "DANGLING"],
        &rows,
        "user",
        "No users are bound to any role.",
    );
    Ok(())
}

fn write_kubeconfig(
    engine: &Engine,
    bundle: &CredentialBundle,
    namespace: Option<&str>,
    output: Option<&Path>,
) -> Result<()> {
    let document = engine.kubeconfig_for(bundle, namespace)?;

    match output {
        Some(path) => {
            let mut file = create_private(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            file.write_all(document.as_bytes())
                .with_context(|| format!("failed to write {}", path.display()))?;
            print_success(&format!(
                "Wrote kubeconfig for {} to {}",
                bundle.user.as_str().code(),
                path.display().code()
            ));
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(document.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

/// Opens `path` for writing, readable by the owner only.
fn create_private(path: &Path) -> std::io::Result<std::fs::File> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path)
}
