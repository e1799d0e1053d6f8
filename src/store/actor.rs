use crate::error::StoreError;
use crate::store::models::{DbCredentialRow, DbIntentRow, DbServerRow, encode_finalizers};
use crate::store::schema::SQLITE_INIT;
use crate::store::{CredentialStore, IntentStore, ServerStore};
use async_trait::async_trait;
use chrono::Utc;
use dbprov_api::{CredentialRecord, DatabaseIntent, ObjectKey, ServerBinding};
use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use std::{str::FromStr, time::Duration};
use tracing::{debug, info};

/// Result of asking the store to delete an intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeletionRequest {
    /// No finalizers were present; the intent is gone.
    Erased,
    /// Deletion is recorded; the intent stays until its finalizer is removed.
    Pending,
}

#[derive(Debug)]
pub enum StoreMessage {
    GetIntent(ObjectKey, RpcReplyPort<Result<Option<DatabaseIntent>, StoreError>>),

    ListIntents(RpcReplyPort<Result<Vec<DatabaseIntent>, StoreError>>),

    /// List intents whose `serverName` matches.
    ListIntentsForServer(String, RpcReplyPort<Result<Vec<DatabaseIntent>, StoreError>>),

    /// Create an intent or replace its spec, keeping finalizers and status.
    PutIntent(DatabaseIntent, RpcReplyPort<Result<DatabaseIntent, StoreError>>),

    /// Write the finalizer list; the spec is only ever written by `PutIntent`.
    /// Erases the row once deletion is requested and no finalizer is left.
    UpdateIntent(DatabaseIntent, RpcReplyPort<Result<(), StoreError>>),

    UpdateIntentStatus(DatabaseIntent, RpcReplyPort<Result<(), StoreError>>),

    RequestIntentDeletion(ObjectKey, RpcReplyPort<Result<DeletionRequest, StoreError>>),

    GetServer(String, RpcReplyPort<Result<Option<ServerBinding>, StoreError>>),

    PutServer(ServerBinding, RpcReplyPort<Result<(), StoreError>>),

    GetCredential(ObjectKey, RpcReplyPort<Result<Option<CredentialRecord>, StoreError>>),

    CreateCredential(CredentialRecord, RpcReplyPort<Result<(), StoreError>>),

    UpdateCredential(CredentialRecord, RpcReplyPort<Result<(), StoreError>>),
}

/// Cloneable handle to the store actor; implements every store boundary.
#[derive(Clone)]
pub struct StoreHandle {
    actor: ActorRef<StoreMessage>,
}

fn rpc_error(op: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Ractor(format!("StoreActor {op} RPC failed: {e}"))
}

impl StoreHandle {
    pub async fn get_intent(&self, key: &ObjectKey) -> Result<Option<DatabaseIntent>, StoreError> {
        ractor::call!(self.actor, StoreMessage::GetIntent, key.clone())
            .map_err(|e| rpc_error("GetIntent", e))?
    }

    pub async fn list_intents(&self) -> Result<Vec<DatabaseIntent>, StoreError> {
        ractor::call!(self.actor, StoreMessage::ListIntents)
            .map_err(|e| rpc_error("ListIntents", e))?
    }

    pub async fn list_intents_for_server(
        &self,
        server_name: &str,
    ) -> Result<Vec<DatabaseIntent>, StoreError> {
        ractor::call!(
            self.actor,
            StoreMessage::ListIntentsForServer,
            server_name.to_string()
        )
        .map_err(|e| rpc_error("ListIntentsForServer", e))?
    }

    pub async fn put_intent(&self, intent: DatabaseIntent) -> Result<DatabaseIntent, StoreError> {
        ractor::call!(self.actor, StoreMessage::PutIntent, intent)
            .map_err(|e| rpc_error("PutIntent", e))?
    }

    pub async fn update_intent(&self, intent: DatabaseIntent) -> Result<(), StoreError> {
        ractor::call!(self.actor, StoreMessage::UpdateIntent, intent)
            .map_err(|e| rpc_error("UpdateIntent", e))?
    }

    pub async fn update_intent_status(&self, intent: DatabaseIntent) -> Result<(), StoreError> {
        ractor::call!(self.actor, StoreMessage::UpdateIntentStatus, intent)
            .map_err(|e| rpc_error("UpdateIntentStatus", e))?
    }

    pub async fn request_intent_deletion(
        &self,
        key: &ObjectKey,
    ) -> Result<DeletionRequest, StoreError> {
        ractor::call!(self.actor, StoreMessage::RequestIntentDeletion, key.clone())
            .map_err(|e| rpc_error("RequestIntentDeletion", e))?
    }

    pub async fn get_server(&self, name: &str) -> Result<Option<ServerBinding>, StoreError> {
        ractor::call!(self.actor, StoreMessage::GetServer, name.to_string())
            .map_err(|e| rpc_error("GetServer", e))?
    }

    pub async fn put_server(&self, server: ServerBinding) -> Result<(), StoreError> {
        ractor::call!(self.actor, StoreMessage::PutServer, server)
            .map_err(|e| rpc_error("PutServer", e))?
    }

    pub async fn get_credential(
        &self,
        key: &ObjectKey,
    ) -> Result<Option<CredentialRecord>, StoreError> {
        ractor::call!(self.actor, StoreMessage::GetCredential, key.clone())
            .map_err(|e| rpc_error("GetCredential", e))?
    }

    pub async fn create_credential(&self, record: CredentialRecord) -> Result<(), StoreError> {
        ractor::call!(self.actor, StoreMessage::CreateCredential, record)
            .map_err(|e| rpc_error("CreateCredential", e))?
    }

    pub async fn update_credential(&self, record: CredentialRecord) -> Result<(), StoreError> {
        ractor::call!(self.actor, StoreMessage::UpdateCredential, record)
            .map_err(|e| rpc_error("UpdateCredential", e))?
    }
}

#[async_trait]
impl IntentStore for StoreHandle {
    async fn get(&self, key: &ObjectKey) -> Result<Option<DatabaseIntent>, StoreError> {
        self.get_intent(key).await
    }

    async fn update(&self, intent: &DatabaseIntent) -> Result<(), StoreError> {
        self.update_intent(intent.clone()).await
    }

    async fn update_status(&self, intent: &DatabaseIntent) -> Result<(), StoreError> {
        self.update_intent_status(intent.clone()).await
    }
}

#[async_trait]
impl ServerStore for StoreHandle {
    async fn get(&self, name: &str) -> Result<Option<ServerBinding>, StoreError> {
        self.get_server(name).await
    }
}

#[async_trait]
impl CredentialStore for StoreHandle {
    async fn get(&self, key: &ObjectKey) -> Result<Option<CredentialRecord>, StoreError> {
        self.get_credential(key).await
    }

    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.create_credential(record.clone()).await
    }

    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError> {
        self.update_credential(record.clone()).await
    }
}

struct StoreActorState {
    pool: SqlitePool,
}

struct StoreActor;

#[ractor::async_trait]
impl Actor for StoreActor {
    type Msg = StoreMessage;
    type State = StoreActorState;
    type Arguments = String;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        database_url: Self::Arguments,
    ) -> Result<Self::State, ActorProcessingErr> {
        let connect_opts = SqliteConnectOptions::from_str(database_url.as_str())
            .map_err(|e| ActorProcessingErr::from(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5))
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .connect_with(connect_opts)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db connect failed: {e}")))?;

        apply_schema(&pool)
            .await
            .map_err(|e| ActorProcessingErr::from(format!("db schema init failed: {e}")))?;

        info!("StoreActor initialized");
        Ok(StoreActorState { pool })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> Result<(), ActorProcessingErr> {
        let pool = &state.pool;
        match message {
            StoreMessage::GetIntent(key, reply) => {
                let _ = reply.send(get_intent(pool, &key).await);
            }
            StoreMessage::ListIntents(reply) => {
                let _ = reply.send(list_intents(pool, None).await);
            }
            StoreMessage::ListIntentsForServer(server_name, reply) => {
                let _ = reply.send(list_intents(pool, Some(server_name.as_str())).await);
            }
            StoreMessage::PutIntent(intent, reply) => {
                let _ = reply.send(put_intent(pool, intent).await);
            }
            StoreMessage::UpdateIntent(intent, reply) => {
                let _ = reply.send(update_intent(pool, &intent).await);
            }
            StoreMessage::UpdateIntentStatus(intent, reply) => {
                let _ = reply.send(update_intent_status(pool, &intent).await);
            }
            StoreMessage::RequestIntentDeletion(key, reply) => {
                let _ = reply.send(request_intent_deletion(pool, &key).await);
            }
            StoreMessage::GetServer(name, reply) => {
                let _ = reply.send(get_server(pool, &name).await);
            }
            StoreMessage::PutServer(server, reply) => {
                let _ = reply.send(put_server(pool, server).await);
            }
            StoreMessage::GetCredential(key, reply) => {
                let _ = reply.send(get_credential(pool, &key).await);
            }
            StoreMessage::CreateCredential(record, reply) => {
                let _ = reply.send(create_credential(pool, record).await);
            }
            StoreMessage::UpdateCredential(record, reply) => {
                let _ = reply.send(update_credential(pool, record).await);
            }
        }
        Ok(())
    }
}

const INTENT_COLUMNS: &str = "namespace, name, server_name, connection_secret_name, finalizers, \
     deletion_requested_at, status_created, status_error, created_at, updated_at";

async fn fetch_intent_row(
    pool: &SqlitePool,
    key: &ObjectKey,
) -> Result<Option<DbIntentRow>, StoreError> {
    let sql = format!(
        "SELECT {INTENT_COLUMNS} FROM database_intents WHERE namespace = ? AND name = ?"
    );
    let row = sqlx::query_as::<_, DbIntentRow>(&sql)
        .bind(&key.namespace)
        .bind(&key.name)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

fn intent_not_found(key: &ObjectKey) -> StoreError {
    StoreError::NotFound {
        kind: "DatabaseIntent",
        key: key.to_string(),
    }
}

async fn get_intent(
    pool: &SqlitePool,
    key: &ObjectKey,
) -> Result<Option<DatabaseIntent>, StoreError> {
    fetch_intent_row(pool, key)
        .await?
        .map(DatabaseIntent::try_from)
        .transpose()
}

async fn list_intents(
    pool: &SqlitePool,
    server_name: Option<&str>,
) -> Result<Vec<DatabaseIntent>, StoreError> {
    let rows = match server_name {
        Some(server_name) => {
            let sql = format!(
                "SELECT {INTENT_COLUMNS} FROM database_intents WHERE server_name = ? ORDER BY namespace, name"
            );
            sqlx::query_as::<_, DbIntentRow>(&sql)
                .bind(server_name)
                .fetch_all(pool)
                .await?
        }
        None => {
            let sql =
                format!("SELECT {INTENT_COLUMNS} FROM database_intents ORDER BY namespace, name");
            sqlx::query_as::<_, DbIntentRow>(&sql).fetch_all(pool).await?
        }
    };

    rows.into_iter().map(DatabaseIntent::try_from).collect()
}

async fn put_intent(pool: &SqlitePool, intent: DatabaseIntent) -> Result<DatabaseIntent, StoreError> {
    let key = intent.key();
    let now = Utc::now();

    sqlx::query(
        r#"
    INSERT INTO database_intents (
        namespace, name, server_name, connection_secret_name, finalizers, status_created, status_error, created_at, updated_at
    )
    VALUES (?, ?, ?, ?, '[]', 0, '', ?, ?)
    ON CONFLICT(namespace, name) DO UPDATE SET
        server_name = excluded.server_name,
        connection_secret_name = excluded.connection_secret_name,
        updated_at = excluded.updated_at
    "#,
    )
    .bind(&key.namespace)
    .bind(&key.name)
    .bind(&intent.spec.server_name)
    .bind(&intent.spec.connection_secret_name)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;

    get_intent(pool, &key)
        .await?
        .ok_or_else(|| intent_not_found(&key))
}

async fn update_intent(pool: &SqlitePool, intent: &DatabaseIntent) -> Result<(), StoreError> {
    let key = intent.key();
    let current = fetch_intent_row(pool, &key)
        .await?
        .ok_or_else(|| intent_not_found(&key))?;

    // The deletion timestamp is owned by the store; only its stored value counts.
    if current.deletion_requested_at.is_some() && intent.metadata.finalizers.is_empty() {
        erase_intent(pool, &key).await?;
        debug!(intent = %key, "intent erased after last finalizer was removed");
        return Ok(());
    }

    sqlx::query(
        r#"
    UPDATE database_intents
    SET finalizers = ?, updated_at = ?
    WHERE namespace = ? AND name = ?
    "#,
    )
    .bind(encode_finalizers(&intent.metadata.finalizers)?)
    .bind(Utc::now())
    .bind(&key.namespace)
    .bind(&key.name)
    .execute(pool)
    .await?;

    Ok(())
}

async fn update_intent_status(pool: &SqlitePool, intent: &DatabaseIntent) -> Result<(), StoreError> {
    let key = intent.key();
    let result = sqlx::query(
        r#"
    UPDATE database_intents
    SET status_created = ?, status_error = ?, updated_at = ?
    WHERE namespace = ? AND name = ?
    "#,
    )
    .bind(intent.status.created)
    .bind(&intent.status.error)
    .bind(Utc::now())
    .bind(&key.namespace)
    .bind(&key.name)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(intent_not_found(&key));
    }
    Ok(())
}

async fn request_intent_deletion(
    pool: &SqlitePool,
    key: &ObjectKey,
) -> Result<DeletionRequest, StoreError> {
    let intent: DatabaseIntent = fetch_intent_row(pool, key)
        .await?
        .ok_or_else(|| intent_not_found(key))?
        .try_into()?;

    if intent.metadata.finalizers.is_empty() {
        erase_intent(pool, key).await?;
        return Ok(DeletionRequest::Erased);
    }

    if !intent.is_deletion_requested() {
        sqlx::query(
            "UPDATE database_intents SET deletion_requested_at = ?, updated_at = ? WHERE namespace = ? AND name = ?",
        )
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(&key.namespace)
        .bind(&key.name)
        .execute(pool)
        .await?;
    }
    Ok(DeletionRequest::Pending)
}

async fn erase_intent(pool: &SqlitePool, key: &ObjectKey) -> Result<(), StoreError> {
    sqlx::query("DELETE FROM database_intents WHERE namespace = ? AND name = ?")
        .bind(&key.namespace)
        .bind(&key.name)
        .execute(pool)
        .await?;
    Ok(())
}

async fn get_server(pool: &SqlitePool, name: &str) -> Result<Option<ServerBinding>, StoreError> {
    let row = sqlx::query_as::<_, DbServerRow>(
        r#"
    SELECT name, host, port, username, password, created_at, updated_at
    FROM server_bindings
    WHERE name = ?
    "#,
    )
    .bind(name)
    .fetch_optional(pool)
    .await?;

    row.map(ServerBinding::try_from).transpose()
}

async fn put_server(pool: &SqlitePool, server: ServerBinding) -> Result<(), StoreError> {
    let now = Utc::now();
    sqlx::query(
        r#"
    INSERT INTO server_bindings (name, host, port, username, password, created_at, updated_at)
    VALUES (?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(name) DO UPDATE SET
        host = excluded.host,
        port = excluded.port,
        username = excluded.username,
        password = excluded.password,
        updated_at = excluded.updated_at
    "#,
    )
    .bind(&server.name)
    .bind(&server.spec.host)
    .bind(i64::from(server.spec.port))
    .bind(&server.spec.username)
    .bind(&server.spec.password)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(())
}

async fn get_credential(
    pool: &SqlitePool,
    key: &ObjectKey,
) -> Result<Option<CredentialRecord>, StoreError> {
    let row = sqlx::query_as::<_, DbCredentialRow>(
        r#"
    SELECT namespace, name, owner, database_name, username, password, host, created_at, updated_at
    FROM credential_records
    WHERE namespace = ? AND name = ?
    "#,
    )
    .bind(&key.namespace)
    .bind(&key.name)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(CredentialRecord::from))
}

async fn create_credential(pool: &SqlitePool, record: CredentialRecord) -> Result<(), StoreError> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
    INSERT INTO credential_records (
        namespace, name, owner, database_name, username, password, host, created_at, updated_at
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
    "#,
    )
    .bind(&record.namespace)
    .bind(&record.name)
    .bind(record.owner())
    .bind(&record.data.database_name)
    .bind(&record.data.username)
    .bind(&record.data.password)
    .bind(&record.data.host)
    .bind(now)
    .bind(now)
    .execute(pool)
    .await;

    match result {
        Ok(_) => Ok(()),
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            Err(StoreError::AlreadyExists {
                kind: "CredentialRecord",
                key: record.key().to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

async fn update_credential(pool: &SqlitePool, record: CredentialRecord) -> Result<(), StoreError> {
    let result = sqlx::query(
        r#"
    UPDATE credential_records
    SET owner = ?, database_name = ?, username = ?, password = ?, host = ?, updated_at = ?
    WHERE namespace = ? AND name = ?
    "#,
    )
    .bind(record.owner())
    .bind(&record.data.database_name)
    .bind(&record.data.username)
    .bind(&record.data.password)
    .bind(&record.data.host)
    .bind(Utc::now())
    .bind(&record.namespace)
    .bind(&record.name)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(StoreError::NotFound {
            kind: "CredentialRecord",
            key: record.key().to_string(),
        });
    }
    Ok(())
}

/// Spawn the store actor and return a cloneable handle.
pub async fn spawn(database_url: &str) -> Result<StoreHandle, StoreError> {
    let (actor, _jh) = Actor::spawn(None, StoreActor, database_url.to_string())
        .await
        .map_err(|e| StoreError::Ractor(format!("StoreActor spawn failed: {e}")))?;

    Ok(StoreHandle { actor })
}

async fn apply_schema(pool: &SqlitePool) -> Result<(), StoreError> {
    for stmt in SQLITE_INIT.split(';') {
        let s = stmt.trim();
        if s.is_empty() {
            continue;
        }
        sqlx::query(s).execute(pool).await?;
    }
    Ok(())
}
