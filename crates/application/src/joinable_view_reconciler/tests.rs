use chrono::{Duration, Utc};
use grantkeeper_domain::{AccessAuditAction, PiiLevel};

use crate::test_support::{CENTRAL_PROJECT, GrantCall, Harness, OWNER_GROUP};

use super::JoinableViewReconciler;

fn reconciler(harness: &Harness) -> JoinableViewReconciler {
    JoinableViewReconciler::new(harness.repositories(), harness.backends(), CENTRAL_PROJECT)
}

#[tokio::test]
async fn owner_without_group_or_access_loses_view_access() {
    let harness = Harness::new().await;
    let dataset = harness.store.seed_pseudonymized_dataset().await;
    let view = harness
        .store
        .seed_joinable_view("alice@example.com", None, dataset.id)
        .await;
    let datasource = harness.store.primary_datasource(dataset.id).await;

    let report = reconciler(&harness)
        .reconcile(Utc::now())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.access_revoked, 1);
    assert_eq!(report.access_granted, 0);
    assert_eq!(
        harness.grants.calls().await,
        vec![GrantCall::Revoke(
            format!(
                "{CENTRAL_PROJECT}.{}.team-prod_{}",
                view.name, datasource.coordinates.table
            ),
            "user:alice@example.com".to_owned()
        )]
    );
}

#[tokio::test]
async fn owner_group_member_keeps_view_access() {
    let harness = Harness::new().await;
    let dataset = harness.store.seed_pseudonymized_dataset().await;
    harness
        .directory
        .add_member("alice@example.com", OWNER_GROUP)
        .await;
    harness
        .store
        .seed_joinable_view("alice@example.com", None, dataset.id)
        .await;

    let report = reconciler(&harness)
        .reconcile(Utc::now())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.access_granted, 1);
    assert!(matches!(
        harness.grants.calls().await.as_slice(),
        [GrantCall::Grant(_, subject)] if subject == "user:alice@example.com"
    ));
}

#[tokio::test]
async fn active_access_keeps_view_access_despite_malformed_rows() {
    let harness = Harness::new().await;
    let dataset = harness.store.seed_pseudonymized_dataset().await;
    harness
        .store
        .seed_access(dataset.id, "not-a-subject", None)
        .await;
    harness
        .store
        .seed_access(dataset.id, "user:Alice@Example.com", None)
        .await;
    harness
        .store
        .seed_joinable_view("alice@example.com", None, dataset.id)
        .await;

    let report = reconciler(&harness)
        .reconcile(Utc::now())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.access_granted, 1);
    assert_eq!(report.failures, 0);
}

#[tokio::test]
async fn expired_views_are_dropped_and_failures_isolated() {
    let harness = Harness::new().await;
    let dataset = harness.store.seed_pseudonymized_dataset().await;
    let yesterday = Some(Utc::now() - Duration::days(1));
    let alice_view = harness
        .store
        .seed_joinable_view("alice@example.com", yesterday, dataset.id)
        .await;
    let bob_view = harness
        .store
        .seed_joinable_view("bob@example.com", yesterday, dataset.id)
        .await;
    let live_view = harness
        .store
        .seed_joinable_view("carol@example.com", Some(Utc::now() + Duration::days(1)), dataset.id)
        .await;
    harness
        .warehouse
        .failing_datasets
        .lock()
        .await
        .insert(alice_view.name.clone());

    let report = reconciler(&harness)
        .reconcile(Utc::now())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.expired_views_deleted, 1);
    assert_eq!(report.failures, 1);
    assert!(harness.store.view(alice_view.id).await.deleted.is_none());
    assert!(harness.store.view(bob_view.id).await.deleted.is_some());
    assert!(harness.store.view(live_view.id).await.deleted.is_none());
    assert_eq!(
        harness.warehouse.deleted_datasets.lock().await.as_slice(),
        [bob_view.name.clone()]
    );
    assert!(
        harness
            .store
            .events()
            .await
            .iter()
            .any(|event| event.action == AccessAuditAction::JoinableViewDeleted)
    );
}

#[tokio::test]
async fn expired_view_that_survives_its_drop_is_not_regranted() {
    let harness = Harness::new().await;
    let dataset = harness.store.seed_pseudonymized_dataset().await;
    harness
        .directory
        .add_member("alice@example.com", OWNER_GROUP)
        .await;
    let view = harness
        .store
        .seed_joinable_view("alice@example.com", Some(Utc::now() - Duration::hours(1)), dataset.id)
        .await;
    harness
        .warehouse
        .failing_datasets
        .lock()
        .await
        .insert(view.name.clone());

    let report = reconciler(&harness)
        .reconcile(Utc::now())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.failures, 1);
    assert_eq!(report.access_granted, 0);
    assert_eq!(report.access_revoked, 0);
    assert!(harness.store.view(view.id).await.deleted.is_none());
    assert!(harness.grants.calls().await.is_empty());
}

#[tokio::test]
async fn orphaned_pseudo_views_are_dropped_with_their_joinable_views() {
    let harness = Harness::new().await;
    let pseudonymized = harness.store.seed_pseudonymized_dataset().await;
    let plain = harness.store.seed_dataset(PiiLevel::None).await;
    let view = harness
        .store
        .seed_joinable_view("alice@example.com", None, pseudonymized.id)
        .await;
    let pseudo_source = harness.store.primary_datasource(pseudonymized.id).await;
    let plain_source = harness.store.primary_datasource(plain.id).await;
    harness.store.remove_dataset(pseudonymized.id).await;
    harness.store.remove_dataset(plain.id).await;

    let report = reconciler(&harness)
        .reconcile(Utc::now())
        .await
        .unwrap_or_else(|_| unreachable!());

    assert_eq!(report.orphaned_sources_deleted, 1);
    assert_eq!(report.failures, 0);
    assert!(harness.store.datasource_deleted(pseudo_source.id).await);
    assert!(!harness.store.datasource_deleted(plain_source.id).await);
    assert_eq!(
        harness.warehouse.deleted_pseudo_views.lock().await.as_slice(),
        [pseudo_source.coordinates.to_string()]
    );
    assert_eq!(
        harness.warehouse.deleted_joinable_views.lock().await.as_slice(),
        [(view.name.clone(), pseudo_source.coordinates.to_string())]
    );
    assert!(harness.grants.calls().await.is_empty());
}
