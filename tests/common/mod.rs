#![allow(dead_code)]

use async_trait::async_trait;
use dbprov::api::{
    CredentialRecord, DatabaseIntent, DatabaseIntentSpec, ObjectKey, ServerBinding, ServerBindingSpec,
};
use dbprov::error::{GatewayError, StoreError};
use dbprov::gateway::{DatabaseGateway, SchemaConnection, ServerTarget};
use dbprov::reconcile::Reconciler;
use dbprov::store::{CredentialStore, IntentStore, ServerStore, StoreHandle};
use std::{
    collections::BTreeSet,
    path::PathBuf,
    sync::{Arc, Mutex},
    time::{Duration, SystemTime, UNIX_EPOCH},
};

/// SQLite file removed (with its WAL/SHM siblings) on drop.
pub struct TempDb {
    path: PathBuf,
}

impl TempDb {
    pub fn new(tag: &str) -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before UNIX_EPOCH")
            .as_nanos();
        let mut path = std::env::temp_dir();
        path.push(format!("dbprov-{tag}-{}-{nanos}.sqlite", std::process::id()));
        Self { path }
    }

    pub fn url(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        let base = self.path.to_string_lossy().to_string();
        let _ = std::fs::remove_file(format!("{base}-wal"));
        let _ = std::fs::remove_file(format!("{base}-shm"));
        let _ = std::fs::remove_file(&self.path);
    }
}

pub async fn temp_store(tag: &str) -> (StoreHandle, TempDb) {
    let db = TempDb::new(tag);
    let store = dbprov::store::spawn(&db.url())
        .await
        .expect("spawn store actor");
    (store, db)
}

pub async fn seed_server(store: &StoreHandle, name: &str, host: &str) {
    store
        .put_server(ServerBinding {
            name: name.to_string(),
            spec: ServerBindingSpec {
                host: host.to_string(),
                port: 3306,
                username: "root".to_string(),
                password: "admin-secret".to_string(),
            },
        })
        .await
        .expect("put server");
}

/// Stores an intent the way the apply endpoint does (defaults applied).
pub async fn seed_intent(store: &StoreHandle, namespace: &str, name: &str, server: &str) -> ObjectKey {
    let mut intent = DatabaseIntent::new(
        namespace,
        name,
        DatabaseIntentSpec {
            server_name: server.to_string(),
            connection_secret_name: String::new(),
        },
    );
    intent.apply_defaults();
    store.put_intent(intent).await.expect("put intent").key()
}

pub fn secret_key(key: &ObjectKey) -> ObjectKey {
    ObjectKey::new(&key.namespace, format!("{}-database-details", key.name))
}

pub fn reconciler(store: &StoreHandle, gateway: &FakeGateway) -> Reconciler {
    Reconciler::from_store(store.clone(), Arc::new(gateway.clone()), Duration::from_secs(5))
}

/// Write counters kept by [`CountingStore`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreWrites {
    pub intent_updates: usize,
    pub status_updates: usize,
    pub credential_creates: usize,
    pub credential_updates: usize,
}

/// Passes every call through to the store actor while counting writes.
/// `stall_credential_get` blocks the calling thread once a credential lookup
/// has its answer, standing in for a step that overruns without yielding.
#[derive(Clone)]
pub struct CountingStore {
    inner: StoreHandle,
    writes: Arc<Mutex<StoreWrites>>,
    stall_credential_get: Option<Duration>,
}

impl CountingStore {
    pub fn new(inner: &StoreHandle) -> Self {
        Self {
            inner: inner.clone(),
            writes: Arc::default(),
            stall_credential_get: None,
        }
    }

    pub fn stalling_credential_get(mut self, stall: Duration) -> Self {
        self.stall_credential_get = Some(stall);
        self
    }

    pub fn writes(&self) -> StoreWrites {
        *self.writes.lock().unwrap()
    }

    pub fn reconciler(&self, gateway: &FakeGateway, deadline: Duration) -> Reconciler {
        let store = Arc::new(self.clone());
        Reconciler::new(
            store.clone(),
            store.clone(),
            store,
            Arc::new(gateway.clone()),
            deadline,
        )
    }

    fn count(&self, f: impl FnOnce(&mut StoreWrites)) {
        f(&mut self.writes.lock().unwrap());
    }
}

#[async_trait]
impl IntentStore for CountingStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DatabaseIntent>, StoreError> {
        IntentStore::get(&self.inner, key).await
    }

    async fn update(&self, intent: &DatabaseIntent) -> Result<(), StoreError> {
        self.count(|w| w.intent_updates += 1);
        IntentStore::update(&self.inner, intent).await
    }

    async fn update_status(&self, intent: &DatabaseIntent) -> Result<(), StoreError> {
        self.count(|w| w.status_updates += 1);
        IntentStore::update_status(&self.inner, intent).await
    }
}

#[async_trait]
impl ServerStore for CountingStore {
    async fn get(&self, name: &str) -> Result<Option<ServerBinding>, StoreError> {
        ServerStore::get(&self.inner, name).await
    }
}

#[async_trait]
impl CredentialStore for CountingStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<CredentialRecord>, StoreError> {
        let record = CredentialStore::get(&self.inner, key).await;
        if let Some(stall) = self.stall_credential_get {
            std::thread::sleep(stall);
        }
        record
    }

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.count(|w| w.credential_creates += 1);
        CredentialStore::create(&self.inner, record).await
    }

    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.count(|w| w.credential_updates += 1);
        CredentialStore::update(&self.inner, record).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Grant {
    pub schema: String,
    pub username: String,
    pub password: String,
}

/// In-memory stand-in for a MySQL server.
#[derive(Debug, Default)]
pub struct FakeServer {
    pub schemas: BTreeSet<String>,
    pub grants: Vec<Grant>,
    pub targets: Vec<ServerTarget>,
    pub connects: usize,
    pub creates: usize,
    pub drops: usize,
    pub active: usize,
    pub max_active: usize,
    pub fail_connects: usize,
    pub fail_create: bool,
    pub fail_grant: bool,
    pub fail_drop: bool,
    pub connect_delay: Option<Duration>,
}

#[derive(Clone, Default)]
pub struct FakeGateway {
    pub server: Arc<Mutex<FakeServer>>,
}

impl FakeGateway {
    pub fn with<R>(&self, f: impl FnOnce(&mut FakeServer) -> R) -> R {
        f(&mut self.server.lock().unwrap())
    }
}

fn protocol_error(what: &str) -> sqlx::Error {
    sqlx::Error::Protocol(format!("injected {what} failure"))
}

#[async_trait]
impl DatabaseGateway for FakeGateway {
    async fn connect(
        &self,
        target: &ServerTarget,
    ) -> Result<Box<dyn SchemaConnection>, GatewayError> {
        let delay = self.with(|s| {
            s.connects += 1;
            s.targets.push(target.clone());
            s.connect_delay
        });
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let refused = self.with(|s| {
            if s.fail_connects > 0 {
                s.fail_connects -= 1;
                true
            } else {
                s.active += 1;
                s.max_active = s.max_active.max(s.active);
                false
            }
        });
        if refused {
            return Err(GatewayError::Connect {
                address: target.address(),
                source: protocol_error("connect"),
            });
        }

        Ok(Box::new(FakeConnection {
            server: self.server.clone(),
        }))
    }
}

struct FakeConnection {
    server: Arc<Mutex<FakeServer>>,
}

impl FakeConnection {
    fn with<R>(&self, f: impl FnOnce(&mut FakeServer) -> R) -> R {
        f(&mut self.server.lock().unwrap())
    }
}

impl Drop for FakeConnection {
    fn drop(&mut self) {
        self.with(|s| s.active -= 1);
    }
}

#[async_trait]
impl SchemaConnection for FakeConnection {
    async fn exists(&mut self, schema: &str) -> bool {
        self.with(|s| s.schemas.contains(schema))
    }

    async fn create(&mut self, schema: &str) -> Result<(), GatewayError> {
        self.with(|s| {
            if s.fail_create || s.schemas.contains(schema) {
                return Err(GatewayError::Create {
                    schema: schema.to_string(),
                    source: protocol_error("create"),
                });
            }
            s.creates += 1;
            s.schemas.insert(schema.to_string());
            Ok(())
        })
    }

    async fn grant_all(
        &mut self,
        schema: &str,
        username: &str,
        password: &str,
    ) -> Result<(), GatewayError> {
        self.with(|s| {
            if s.fail_grant {
                return Err(GatewayError::Grant {
                    schema: schema.to_string(),
                    source: protocol_error("grant"),
                });
            }
            s.grants.push(Grant {
                schema: schema.to_string(),
                username: username.to_string(),
                password: password.to_string(),
            });
            Ok(())
        })
    }

    async fn drop_schema(&mut self, schema: &str) -> Result<(), GatewayError> {
        self.with(|s| {
            if s.fail_drop {
                return Err(GatewayError::Drop {
                    schema: schema.to_string(),
                    source: protocol_error("drop"),
                });
            }
            s.drops += 1;
            s.schemas.remove(schema);
            Ok(())
        })
    }

    async fn close(self: Box<Self>) {}
}

/// Polls `check` until it returns `true` or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
