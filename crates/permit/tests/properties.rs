//! End-to-end behaviour of the engine against the in-memory cluster:
//! idempotence, convergence, conflict detection, dangling detection,
//! deletion cascade and bounded approval waits.

use std::time::Duration;

use permit::{
    ApprovalMode, Binding, CertificateApi, Engine, EngineError, GrantOutcome, IssuerConfig,
    MemoryCluster, PolicyRule, RbacStore, Resolution, RoleKey, RoleRef, Scope, Subject,
};
use permit_store::memory::{Operation, SignerBehavior};
use proptest::prelude::*;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

fn cluster() -> MemoryCluster {
    MemoryCluster::new("test").with_namespaces(["dev", "prod"])
}

fn engine(cluster: &MemoryCluster, approval: ApprovalMode) -> Engine {
    Engine::for_cluster(
        cluster.clone(),
        IssuerConfig {
            approval,
            poll_initial: Duration::from_millis(100),
            poll_max: Duration::from_millis(500),
            ..IssuerConfig::default()
        },
    )
}

fn rule_set_a() -> Vec<PolicyRule> {
    vec![PolicyRule::new([""], ["pods"], ["get", "list", "watch"])]
}

fn rule_set_b() -> Vec<PolicyRule> {
    vec![PolicyRule::new([""], ["secrets"], ["*"])]
}

// ============================================================================
// Idempotence
// ============================================================================

#[tokio::test]
async fn granting_twice_produces_one_binding() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);
    engine
        .create_role("viewer", Scope::Cluster, rule_set_a())
        .await
        .unwrap();
    let viewer = RoleRef::cluster_role("viewer");
    let dev = Scope::namespace("dev");

    let first = engine.grant_role("alice", &viewer, &dev).await.unwrap();
    let second = engine.grant_role("alice", &viewer, &dev).await.unwrap();

    assert!(matches!(first, GrantOutcome::Granted(_)));
    assert!(matches!(second, GrantOutcome::AlreadyGranted(_)));
    assert_eq!(first.binding(), second.binding());
    assert_eq!(cluster.bindings().len(), 1);
}

#[tokio::test]
async fn revoking_an_ungranted_role_is_a_no_op() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);

    let removal = engine
        .revoke_role("alice", &RoleRef::cluster_role("viewer"), &Scope::Cluster)
        .await
        .unwrap();

    assert!(removal.is_empty());
}

#[tokio::test]
async fn concurrent_identical_grants_converge() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);
    engine
        .create_role("viewer", Scope::Cluster, rule_set_a())
        .await
        .unwrap();
    let viewer = RoleRef::cluster_role("viewer");

    let (a, b) = tokio::join!(
        engine.grant_role("alice", &viewer, &Scope::Cluster),
        engine.grant_role("alice", &viewer, &Scope::Cluster),
    );

    assert_eq!(a.unwrap().binding(), b.unwrap().binding());
    assert_eq!(cluster.bindings().len(), 1);
}

// ============================================================================
// Convergence
// ============================================================================

#[tokio::test(start_paused = true)]
async fn create_user_retried_after_timeout_converges_on_one_csr() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::External);

    let err = engine
        .create_user_within("alice", Duration::from_secs(2), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::IssuanceTimedOut { .. }));
    assert!(err.is_retryable());
    assert_eq!(cluster.csrs().len(), 1);

    cluster.set_signer(SignerBehavior::AutoApprove { after_reads: 1 });
    let bundle = engine
        .create_user_within("alice", Duration::from_secs(10), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(bundle.user.as_str(), "alice");
    assert!(bundle.client_cert_pem.contains("BEGIN CERTIFICATE"));
    assert!(bundle.client_key_pem().contains("PRIVATE KEY"));
    assert!(cluster.csrs().is_empty(), "no CSR is left behind");
}

#[tokio::test(start_paused = true)]
async fn create_user_recovers_from_transient_submission_failure() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);
    cluster.fail_next(Operation::CreateCsr, 1);

    let err = engine
        .create_user("alice", &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(err.is_retryable());

    engine
        .create_user("alice", &CancellationToken::new())
        .await
        .unwrap();
    assert!(cluster.csrs().is_empty());
}

// ============================================================================
// Conflict detection
// ============================================================================

#[tokio::test]
async fn conflicting_role_definition_is_rejected_and_first_kept() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);
    engine
        .create_role("viewer", Scope::Cluster, rule_set_a())
        .await
        .unwrap();

    let err = engine
        .create_role("viewer", Scope::Cluster, rule_set_b())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict { .. }));

    let stored = cluster
        .get_role(&RoleKey::new(Scope::Cluster, "viewer"))
        .await
        .unwrap();
    assert_eq!(stored.rules, rule_set_a());
}

// ============================================================================
// Dangling detection
// ============================================================================

#[tokio::test]
async fn binding_to_deleted_role_is_reported_as_dangling() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);
    engine
        .create_role("r", Scope::namespace("dev"), rule_set_a())
        .await
        .unwrap();
    engine
        .grant_role("bob", &RoleRef::role("r"), &Scope::namespace("dev"))
        .await
        .unwrap();

    let key = RoleKey::new(Scope::namespace("dev"), "r");
    cluster.delete_role(&key).await.unwrap();

    let entries = engine.list_bindings(Some("bob")).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(
        entries[0].resolution,
        Resolution::Dangling { target: Some(key) }
    );
}

// ============================================================================
// Deletion cascade
// ============================================================================

#[tokio::test(start_paused = true)]
async fn delete_user_removes_every_binding_naming_them_and_nothing_else() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);
    engine
        .create_role("viewer", Scope::Cluster, rule_set_a())
        .await
        .unwrap();
    engine
        .create_role("editor", Scope::namespace("dev"), rule_set_b())
        .await
        .unwrap();

    engine
        .create_user("bob", &CancellationToken::new())
        .await
        .unwrap();
    let viewer = RoleRef::cluster_role("viewer");
    for (user, role, scope) in [
        ("bob", viewer.clone(), Scope::Cluster),
        ("bob", viewer.clone(), Scope::namespace("prod")),
        ("bob", RoleRef::role("editor"), Scope::namespace("dev")),
        ("alice", viewer.clone(), Scope::Cluster),
        ("alice", RoleRef::role("editor"), Scope::namespace("dev")),
    ] {
        engine.grant_role(user, &role, &scope).await.unwrap();
    }
    cluster
        .create_binding(&Binding::new(
            "shared",
            Scope::namespace("prod"),
            viewer.clone(),
            vec![Subject::user("bob"), Subject::user("carol")],
        ))
        .await
        .unwrap();
    let before: Vec<Binding> = cluster
        .bindings()
        .into_iter()
        .filter(|b| !b.grants_user("bob"))
        .collect();

    let removal = engine.delete_user("bob").await.unwrap();

    assert_eq!(removal.deleted.len(), 3);
    assert_eq!(removal.trimmed.len(), 1);
    let after = cluster.bindings();
    assert!(after.iter().all(|b| !b.grants_user("bob")));
    for binding in &before {
        assert!(
            after.iter().any(|b| b.same_definition(binding)),
            "{} was touched",
            binding.name
        );
    }
    let shared = after.iter().find(|b| b.name == "shared").unwrap();
    assert_eq!(shared.subjects, vec![Subject::user("carol")]);
    assert!(engine.list_bindings(Some("bob")).await.unwrap().is_empty());
}

#[tokio::test]
async fn delete_user_is_idempotent() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::SelfApprove);

    assert!(engine.delete_user("nobody").await.unwrap().is_empty());
    assert!(engine.delete_user("nobody").await.unwrap().is_empty());
}

// ============================================================================
// Timeout semantics
// ============================================================================

#[tokio::test(start_paused = true)]
async fn unapproved_request_times_out_close_to_the_bound() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::External);

    let started = Instant::now();
    let err = engine
        .create_user_within("alice", Duration::from_secs(2), &CancellationToken::new())
        .await
        .unwrap_err();
    let elapsed = started.elapsed();

    assert!(matches!(err, EngineError::IssuanceTimedOut { .. }));
    assert!(elapsed >= Duration::from_secs(2));
    assert!(elapsed < Duration::from_millis(2_100), "took {elapsed:?}");
    assert_eq!(cluster.csrs().len(), 1, "CSR is left for inspection");
}

#[tokio::test(start_paused = true)]
async fn cancellation_stops_the_wait() {
    let cluster = cluster();
    let engine = engine(&cluster, ApprovalMode::External);
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(700)).await;
        trigger.cancel();
    });

    let started = Instant::now();
    let err = engine
        .create_user_within("alice", Duration::from_secs(60), &cancel)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Cancelled { .. }));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[tokio::test]
async fn cluster_info_comes_from_the_certificate_api() {
    let cluster = cluster();
    let info = cluster.cluster_info().await.unwrap();
    assert_eq!(info.name, "test");
    assert!(info.ca_pem.contains("BEGIN CERTIFICATE"));
}

// ============================================================================
// Property-Based Tests
// ============================================================================

fn grant_strategy() -> impl Strategy<Value = (&'static str, &'static str, Option<&'static str>)> {
    (
        prop::sample::select(vec!["alice", "bob", "carol"]),
        prop::sample::select(vec!["viewer", "editor"]),
        prop::option::of(prop::sample::select(vec!["dev", "prod"])),
    )
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: after any sequence of grants and a delete, the deleted user
    /// holds no binding and every other user keeps exactly their grants
    #[test]
    fn prop_delete_user_only_affects_that_user(
        grants in prop::collection::vec(grant_strategy(), 0..16),
        victim in prop::sample::select(vec!["alice", "bob", "carol"]),
    ) {
        runtime().block_on(async {
            let cluster = cluster();
            let engine = engine(&cluster, ApprovalMode::SelfApprove);
            for role in ["viewer", "editor"] {
                engine.create_role(role, Scope::Cluster, rule_set_a()).await.unwrap();
            }
            for (user, role, ns) in &grants {
                let scope = ns.map_or(Scope::Cluster, Scope::namespace);
                engine
                    .grant_role(user, &RoleRef::cluster_role(*role), &scope)
                    .await
                    .unwrap();
            }
            let survivors: Vec<Binding> = cluster
                .bindings()
                .into_iter()
                .filter(|b| !b.grants_user(victim))
                .collect();

            engine.delete_user(victim).await.unwrap();

            let after = cluster.bindings();
            prop_assert!(after.iter().all(|b| !b.grants_user(victim)));
            prop_assert_eq!(after.len(), survivors.len());
            Ok(())
        })?;
    }

    /// Property: granting the same set twice writes nothing the second time
    #[test]
    fn prop_grants_are_idempotent(grants in prop::collection::vec(grant_strategy(), 0..16)) {
        runtime().block_on(async {
            let cluster = cluster();
            let engine = engine(&cluster, ApprovalMode::SelfApprove);
            for role in ["viewer", "editor"] {
                engine.create_role(role, Scope::Cluster, rule_set_a()).await.unwrap();
            }
            for _ in 0..2 {
                for (user, role, ns) in &grants {
                    let scope = ns.map_or(Scope::Cluster, Scope::namespace);
                    engine
                        .grant_role(user, &RoleRef::cluster_role(*role), &scope)
                        .await
                        .unwrap();
                }
            }

            let distinct: std::collections::BTreeSet<_> = grants.iter().collect();
            prop_assert_eq!(cluster.bindings().len(), distinct.len());
            Ok(())
        })?;
    }
}
