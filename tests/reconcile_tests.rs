mod common;

use common::{
    CountingStore, FakeGateway, StoreWrites, reconciler, secret_key, seed_intent, seed_server,
    temp_store,
};
use dbprov::api::{FINALIZER_NAME, ObjectKey};
use dbprov::error::ValidationError;
use dbprov::policy::GENERATED_PASSWORD_LEN;
use dbprov::{ProvisionError, ReconcileOutcome, Reconciler};
use std::{sync::Arc, time::Duration};

#[tokio::test]
async fn first_reconcile_provisions_schema_credentials_and_status() {
    let (store, _db) = temp_store("reconcile-e2e").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;

    let outcome = reconciler(&store, &gateway).reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Provisioned {
            schema_created: true,
            credentials_created: true,
        }
    );

    // 1. Schema and grant exist on the server
    let (schemas, grants, target_host) =
        gateway.with(|s| (s.schemas.clone(), s.grants.clone(), s.targets[0].host.clone()));
    assert!(schemas.contains("x_y"));
    assert_eq!(target_host, "db.internal");
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].schema, "x_y");
    assert_eq!(grants[0].username, "x_y");
    assert_eq!(grants[0].password.len(), GENERATED_PASSWORD_LEN);

    // 2. Credential record under the defaulted secret name
    let record = store
        .get_credential(&ObjectKey::new("x", "y-database-details"))
        .await
        .unwrap()
        .expect("credential record created");
    assert_eq!(record.data.database_name, "x_y");
    assert_eq!(record.data.username, "x_y");
    assert_eq!(record.data.password, grants[0].password);
    assert_eq!(record.data.host, "db.internal");
    assert_eq!(record.owner(), Some("x/y"));

    // 3. Finalizer and success status on the intent
    let intent = store.get_intent(&key).await.unwrap().unwrap();
    assert_eq!(intent.metadata.finalizers, vec![FINALIZER_NAME.to_string()]);
    assert!(intent.status.created);
    assert!(intent.status.error.is_empty());
}

#[tokio::test]
async fn repeated_reconcile_is_idempotent() {
    let (store, _db) = temp_store("reconcile-idempotent").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "team-a", "orders", "main").await;
    let reconciler = reconciler(&store, &gateway);

    reconciler.reconcile(&key).await.unwrap();
    let record_before = store.get_credential(&secret_key(&key)).await.unwrap();
    let intent_before = store.get_intent(&key).await.unwrap();

    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Provisioned {
            schema_created: false,
            credentials_created: false,
        }
    );

    assert_eq!(store.get_credential(&secret_key(&key)).await.unwrap(), record_before);
    assert_eq!(store.get_intent(&key).await.unwrap(), intent_before);

    let (creates, grants) = gateway.with(|s| (s.creates, s.grants.clone()));
    assert_eq!(creates, 1, "schema must only be created once");
    assert_eq!(grants.len(), 2, "grant is reapplied on every pass");
    assert_eq!(grants[0], grants[1]);
}

#[tokio::test]
async fn reapplied_grant_restores_revoked_access() {
    let (store, _db) = temp_store("reconcile-regrant").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    let reconciler = reconciler(&store, &gateway);

    reconciler.reconcile(&key).await.unwrap();
    gateway.with(|s| s.grants.clear());

    reconciler.reconcile(&key).await.unwrap();
    let record = store.get_credential(&secret_key(&key)).await.unwrap().unwrap();
    let grants = gateway.with(|s| s.grants.clone());
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].password, record.data.password);
}

#[tokio::test]
async fn server_host_change_only_updates_credential_host() {
    let (store, _db) = temp_store("reconcile-host-change").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db-1.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    let reconciler = reconciler(&store, &gateway);

    reconciler.reconcile(&key).await.unwrap();
    let before = store.get_credential(&secret_key(&key)).await.unwrap().unwrap();

    seed_server(&store, "main", "db-2.internal").await;
    reconciler.reconcile(&key).await.unwrap();
    let after = store.get_credential(&secret_key(&key)).await.unwrap().unwrap();

    assert_eq!(after.data.host, "db-2.internal");
    assert_eq!(after.data.database_name, before.data.database_name);
    assert_eq!(after.data.username, before.data.username);
    assert_eq!(after.data.password, before.data.password);

    let last_target = gateway.with(|s| s.targets.last().cloned()).unwrap();
    assert_eq!(last_target.host, "db-2.internal");
}

#[tokio::test]
async fn overlong_schema_name_fails_before_touching_the_server() {
    let (store, _db) = temp_store("reconcile-too-long").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    // "x_" + 63 characters = 65
    let key = seed_intent(&store, "x", &"a".repeat(63), "main").await;

    let err = reconciler(&store, &gateway).reconcile(&key).await.unwrap_err();
    assert!(
        matches!(err, ProvisionError::Validation(ValidationError::TooLong { len: 65, .. })),
        "unexpected error: {err:?}"
    );

    assert_eq!(gateway.with(|s| s.connects), 0);
    assert!(store.get_credential(&secret_key(&key)).await.unwrap().is_none());

    let intent = store.get_intent(&key).await.unwrap().unwrap();
    assert!(intent.has_finalizer());
    assert!(!intent.status.created);
    assert!(intent.status.error.contains("too long"), "{}", intent.status.error);
}

#[tokio::test]
async fn schema_name_at_limit_is_provisioned() {
    let (store, _db) = temp_store("reconcile-at-limit").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    // "x_" + 62 characters = 64
    let key = seed_intent(&store, "x", &"a".repeat(62), "main").await;

    reconciler(&store, &gateway).reconcile(&key).await.unwrap();
    assert_eq!(gateway.with(|s| s.schemas.len()), 1);
}

#[tokio::test]
async fn invalid_characters_fail_before_touching_the_server() {
    let (store, _db) = temp_store("reconcile-invalid-chars").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "has space", "main").await;

    let err = reconciler(&store, &gateway).reconcile(&key).await.unwrap_err();
    assert!(matches!(
        err,
        ProvisionError::Validation(ValidationError::InvalidCharacters { .. })
    ));
    assert_eq!(gateway.with(|s| s.connects), 0);

    let intent = store.get_intent(&key).await.unwrap().unwrap();
    assert_eq!(intent.status.error, err.status_message());
}

#[tokio::test]
async fn missing_server_is_reported_and_nothing_is_provisioned() {
    let (store, _db) = temp_store("reconcile-missing-server").await;
    let gateway = FakeGateway::default();
    let key = seed_intent(&store, "x", "y", "nope").await;

    let err = reconciler(&store, &gateway).reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Lookup { .. }), "{err:?}");

    assert_eq!(gateway.with(|s| s.connects), 0);
    assert!(store.get_credential(&secret_key(&key)).await.unwrap().is_none());

    let intent = store.get_intent(&key).await.unwrap().unwrap();
    assert!(intent.has_finalizer());
    assert!(!intent.status.created);
    assert!(
        intent
            .status
            .error
            .contains("did not find server binding with given name"),
        "{}",
        intent.status.error
    );
}

#[tokio::test]
async fn failure_then_recovery_clears_status_error() {
    let (store, _db) = temp_store("reconcile-recovery").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    let reconciler = reconciler(&store, &gateway);

    gateway.with(|s| s.fail_connects = 1);
    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ProvisionError::Connection(_)));

    let failed = store.get_intent(&key).await.unwrap().unwrap();
    assert!(!failed.status.created);
    assert!(failed.status.error.contains("unable to connect"));

    reconciler.reconcile(&key).await.unwrap();
    let healed = store.get_intent(&key).await.unwrap().unwrap();
    assert!(healed.status.created);
    assert!(healed.status.error.is_empty());
}

#[tokio::test]
async fn grant_failure_keeps_created_schema_and_converges_on_retry() {
    let (store, _db) = temp_store("reconcile-grant-failure").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    let reconciler = reconciler(&store, &gateway);

    gateway.with(|s| s.fail_grant = true);
    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ProvisionError::SchemaOp(_)));
    assert!(gateway.with(|s| s.schemas.contains("x_y")));
    assert!(store.get_credential(&secret_key(&key)).await.unwrap().is_none());

    gateway.with(|s| s.fail_grant = false);
    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(
        outcome,
        ReconcileOutcome::Provisioned {
            schema_created: false,
            credentials_created: true,
        }
    );
}

#[tokio::test]
async fn deletion_drops_schema_and_releases_intent() {
    let (store, _db) = temp_store("reconcile-delete").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    let reconciler = reconciler(&store, &gateway);

    reconciler.reconcile(&key).await.unwrap();
    store.request_intent_deletion(&key).await.unwrap();

    let outcome = reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deleted);

    assert!(gateway.with(|s| s.schemas.is_empty()));
    assert_eq!(gateway.with(|s| s.drops), 1);
    assert!(store.get_intent(&key).await.unwrap().is_none());
    // Credential records are left alone on deletion.
    assert!(store.get_credential(&secret_key(&key)).await.unwrap().is_some());

    assert_eq!(reconciler.reconcile(&key).await.unwrap(), ReconcileOutcome::Absent);
}

#[tokio::test]
async fn failed_drop_keeps_finalizer_and_reports_error() {
    let (store, _db) = temp_store("reconcile-delete-failure").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    let reconciler = reconciler(&store, &gateway);

    reconciler.reconcile(&key).await.unwrap();
    store.request_intent_deletion(&key).await.unwrap();
    gateway.with(|s| s.fail_drop = true);

    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ProvisionError::SchemaOp(_)));

    let intent = store.get_intent(&key).await.unwrap().expect("intent kept");
    assert!(intent.has_finalizer());
    assert!(intent.is_deletion_requested());
    assert!(intent.status.error.contains("unable to delete database"));
    assert!(gateway.with(|s| s.schemas.contains("x_y")));

    // 2. Once the server cooperates the deletion completes.
    gateway.with(|s| s.fail_drop = false);
    assert_eq!(reconciler.reconcile(&key).await.unwrap(), ReconcileOutcome::Deleted);
    assert!(store.get_intent(&key).await.unwrap().is_none());
}

#[tokio::test]
async fn absent_intent_is_a_no_op() {
    let (store, _db) = temp_store("reconcile-absent").await;
    let gateway = FakeGateway::default();

    let outcome = reconciler(&store, &gateway)
        .reconcile(&ObjectKey::new("x", "missing"))
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Absent);
    assert_eq!(gateway.with(|s| s.connects), 0);
}

#[tokio::test]
async fn slow_server_hits_the_deadline() {
    let (store, _db) = temp_store("reconcile-deadline").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    gateway.with(|s| s.connect_delay = Some(Duration::from_millis(500)));

    let reconciler = Reconciler::from_store(
        store.clone(),
        Arc::new(gateway.clone()),
        Duration::from_millis(100),
    );
    let err = reconciler.reconcile(&key).await.unwrap_err();
    assert!(matches!(err, ProvisionError::DeadlineExceeded(_)), "{err:?}");

    assert!(gateway.with(|s| s.schemas.is_empty()));
    let intent = store.get_intent(&key).await.unwrap().unwrap();
    assert!(!intent.status.created);
    assert!(intent.status.error.contains("deadline"), "{}", intent.status.error);
}

#[tokio::test]
async fn overrun_without_yielding_stops_before_the_next_write() {
    let (store, _db) = temp_store("reconcile-overrun").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;

    let counting = CountingStore::new(&store).stalling_credential_get(Duration::from_millis(150));
    let err = counting
        .reconciler(&gateway, Duration::from_millis(100))
        .reconcile(&key)
        .await
        .unwrap_err();
    assert!(matches!(err, ProvisionError::DeadlineExceeded(_)), "{err:?}");

    assert_eq!(gateway.with(|s| s.connects), 0);
    assert!(gateway.with(|s| s.schemas.is_empty()));
    let writes = counting.writes();
    assert_eq!(writes.credential_creates, 0);
    assert_eq!(writes.credential_updates, 0);
    assert!(store.get_credential(&secret_key(&key)).await.unwrap().is_none());

    let intent = store.get_intent(&key).await.unwrap().unwrap();
    assert!(!intent.status.created);
    assert!(intent.status.error.contains("deadline"), "{}", intent.status.error);
}

#[tokio::test]
async fn deletion_pass_writes_no_status_or_credentials() {
    let (store, _db) = temp_store("reconcile-delete-writes").await;
    let gateway = FakeGateway::default();
    seed_server(&store, "main", "db.internal").await;
    let key = seed_intent(&store, "x", "y", "main").await;
    reconciler(&store, &gateway).reconcile(&key).await.unwrap();
    store.request_intent_deletion(&key).await.unwrap();

    let counting = CountingStore::new(&store);
    let outcome = counting
        .reconciler(&gateway, Duration::from_secs(5))
        .reconcile(&key)
        .await
        .unwrap();

    assert_eq!(outcome, ReconcileOutcome::Deleted);
    assert_eq!(
        counting.writes(),
        StoreWrites {
            intent_updates: 1,
            status_updates: 0,
            credential_creates: 0,
            credential_updates: 0,
        }
    );
    assert!(gateway.with(|s| s.schemas.is_empty()));
    assert!(store.get_intent(&key).await.unwrap().is_none());
}
