//! Reconciliation engine: converges one intent onto its MySQL server.

mod status;

pub use status::StatusReporter;

use dbprov_api::{
    CredentialData, CredentialRecord, DatabaseIntent, FINALIZER_NAME, ObjectKey, ServerBinding,
};
use std::{sync::Arc, time::Duration};
use tokio::time::Instant;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::error::{ProvisionError, StoreError};
use crate::gateway::{DatabaseGateway, SchemaConnection, ServerTarget};
use crate::policy;
use crate::store::{CredentialStore, IntentStore, ServerStore, StoreHandle};
use crate::utils::logging::debug_pretty_json;

/// What a successful reconciliation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The intent no longer exists; nothing to do.
    Absent,
    /// Schema, grant, credentials and status are in place.
    Provisioned {
        schema_created: bool,
        credentials_created: bool,
    },
    /// The schema was dropped and the finalizer released.
    Deleted,
}

pub struct Reconciler {
    intents: Arc<dyn IntentStore>,
    servers: Arc<dyn ServerStore>,
    credentials: Arc<dyn CredentialStore>,
    gateway: Arc<dyn DatabaseGateway>,
    status: StatusReporter,
    deadline: Duration,
}

/// Identifiers for one pass: reused from an existing record or freshly derived.
struct Provisioning {
    secret_key: ObjectKey,
    existing: Option<CredentialRecord>,
    schema_name: String,
    password: String,
}

impl Reconciler {
    pub fn new(
        intents: Arc<dyn IntentStore>,
        servers: Arc<dyn ServerStore>,
        credentials: Arc<dyn CredentialStore>,
        gateway: Arc<dyn DatabaseGateway>,
        deadline: Duration,
    ) -> Self {
        Self {
            status: StatusReporter::new(intents.clone()),
            intents,
            servers,
            credentials,
            gateway,
            deadline,
        }
    }

    /// Wires every store boundary to the same store actor.
    pub fn from_store(
        store: StoreHandle,
        gateway: Arc<dyn DatabaseGateway>,
        deadline: Duration,
    ) -> Self {
        let store = Arc::new(store);
        Self::new(store.clone(), store.clone(), store, gateway, deadline)
    }

    /// Converges the intent at `key`. Safe to call repeatedly; callers must not
    /// run two reconciliations of the same key concurrently.
    ///
    /// Runs under the configured deadline. On expiry the in-flight work, and
    /// with it the MySQL connection, is dropped before the failure is recorded.
    /// The deadline is also checked before connecting to the server and before
    /// every store write, so a pass that overran while not yielding stops there. A store
    /// write already handed to the store actor is atomic and may still commit;
    /// the next pass converges from whatever it left.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ProvisionError> {
        let span = info_span!(
            "reconcile",
            namespace = %key.namespace,
            name = %key.name,
            reconcile_id = %Uuid::new_v4(),
        );

        async move {
            let expires = Instant::now() + self.deadline;
            match tokio::time::timeout(self.deadline, self.converge(key, expires)).await {
                Ok(result) => result,
                Err(_) => {
                    let err = ProvisionError::DeadlineExceeded(self.deadline);
                    warn!(error = %err, "reconciliation abandoned");
                    self.report_abandoned(key, &err).await;
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn converge(
        &self,
        key: &ObjectKey,
        expires: Instant,
    ) -> Result<ReconcileOutcome, ProvisionError> {
        let Some(mut intent) = self
            .intents
            .get(key)
            .await
            .map_err(|e| ProvisionError::lookup("unable to fetch database intent", e))?
        else {
            debug!("database intent not found; treating as deleted");
            return Ok(ReconcileOutcome::Absent);
        };

        debug_pretty_json("found database intent", &intent);

        if intent.is_deletion_requested() && !intent.has_finalizer() {
            debug!("deletion requested and no finalizer left; nothing to release");
            return Ok(ReconcileOutcome::Absent);
        }

        if intent.add_finalizer() {
            info!(finalizer = FINALIZER_NAME, "adding finalizer to database intent");
            if let Err(err) = self.within_deadline(expires) {
                return Err(self.fail(&mut intent, err).await);
            }
            if let Err(e) = self.intents.update(&intent).await {
                return Err(self
                    .fail(&mut intent, ProvisionError::persistence("could not add finalizer", e))
                    .await);
            }
        }

        let server = match self.resolve_server(&intent).await {
            Ok(server) => server,
            Err(err) => return Err(self.fail(&mut intent, err).await),
        };
        info!(server = %server.name, "found server to host database");

        let plan = match self.resolve_credentials(&intent).await {
            Ok(plan) => plan,
            Err(err) => return Err(self.fail(&mut intent, err).await),
        };

        if let Err(e) = policy::validate_schema_name(&plan.schema_name) {
            return Err(self.fail(&mut intent, e.into()).await);
        }
        info!(database = %plan.schema_name, "determined database name");

        if let Err(err) = self.within_deadline(expires) {
            return Err(self.fail(&mut intent, err).await);
        }
        let target = ServerTarget::from(&server);
        let mut conn = match self.gateway.connect(&target).await {
            Ok(conn) => conn,
            Err(e) => return Err(self.fail(&mut intent, ProvisionError::Connection(e)).await),
        };
        info!(server = %target.address(), username = %target.username, "connected to mysql server");

        if intent.is_deletion_requested() {
            let dropped = drop_schema(conn.as_mut(), &plan.schema_name).await;
            conn.close().await;
            if let Err(err) = dropped {
                return Err(self.fail(&mut intent, err).await);
            }

            if let Err(err) = self.within_deadline(expires) {
                return Err(self.fail(&mut intent, err).await);
            }
            info!(finalizer = FINALIZER_NAME, "removing finalizer");
            intent.remove_finalizer();
            if let Err(e) = self.intents.update(&intent).await {
                return Err(self
                    .fail(&mut intent, ProvisionError::persistence("could not remove finalizer", e))
                    .await);
            }
            return Ok(ReconcileOutcome::Deleted);
        }

        let provisioned = provision_schema(conn.as_mut(), &plan.schema_name, &plan.password).await;
        conn.close().await;
        let schema_created = match provisioned {
            Ok(created) => created,
            Err(err) => return Err(self.fail(&mut intent, err).await),
        };

        if let Err(err) = self.within_deadline(expires) {
            return Err(self.fail(&mut intent, err).await);
        }
        let credentials_created = match self.upsert_credentials(&intent, &server, plan).await {
            Ok(created) => created,
            Err(err) => return Err(self.fail(&mut intent, err).await),
        };

        if let Err(err) = self.within_deadline(expires) {
            return Err(self.fail(&mut intent, err).await);
        }
        if let Err(e) = self.status.report(&mut intent, None).await {
            return Err(self
                .fail(&mut intent, ProvisionError::persistence("unable to update database status", e))
                .await);
        }

        info!(schema_created, credentials_created, "reconcile complete");
        Ok(ReconcileOutcome::Provisioned {
            schema_created,
            credentials_created,
        })
    }

    async fn resolve_server(&self, intent: &DatabaseIntent) -> Result<ServerBinding, ProvisionError> {
        let name = &intent.spec.server_name;
        match self.servers.get(name).await {
            Ok(Some(server)) => Ok(server),
            Ok(None) => Err(ProvisionError::lookup(
                "did not find server binding with given name",
                StoreError::NotFound {
                    kind: "ServerBinding",
                    key: name.clone(),
                },
            )),
            Err(e) => Err(ProvisionError::lookup("unable to fetch server binding", e)),
        }
    }

    /// Existing records pin the schema name and password; otherwise both are
    /// derived here and persisted later in [`Self::upsert_credentials`].
    async fn resolve_credentials(
        &self,
        intent: &DatabaseIntent,
    ) -> Result<Provisioning, ProvisionError> {
        let secret_key = ObjectKey::new(
            &intent.metadata.namespace,
            &intent.spec.connection_secret_name,
        );
        let existing = self
            .credentials
            .get(&secret_key)
            .await
            .map_err(|e| ProvisionError::lookup("unable to get connection details", e))?;

        match existing {
            Some(record) => {
                debug!(secret = %secret_key, "got existing connection details");
                let owner = intent.owner_tag();
                if record.owner() != Some(owner.as_str()) {
                    warn!(
                        secret = %secret_key,
                        recorded_owner = record.owner().unwrap_or("<none>"),
                        "connection details carry a different owner tag"
                    );
                }
                Ok(Provisioning {
                    schema_name: record.data.database_name.clone(),
                    password: record.data.password.clone(),
                    existing: Some(record),
                    secret_key,
                })
            }
            None => {
                info!(secret = %secret_key, "no existing connection details; generating new password");
                Ok(Provisioning {
                    schema_name: policy::derive_schema_name(
                        &intent.metadata.namespace,
                        &intent.metadata.name,
                    ),
                    password: policy::generate_password(),
                    existing: None,
                    secret_key,
                })
            }
        }
    }

    /// Returns `true` if a new record was created.
    async fn upsert_credentials(
        &self,
        intent: &DatabaseIntent,
        server: &ServerBinding,
        plan: Provisioning,
    ) -> Result<bool, ProvisionError> {
        match plan.existing {
            None => {
                let record = CredentialRecord::new(
                    plan.secret_key,
                    intent.owner_tag(),
                    CredentialData {
                        database_name: plan.schema_name.clone(),
                        username: plan.schema_name,
                        password: plan.password,
                        host: server.spec.host.clone(),
                    },
                );
                self.credentials.create(&record).await.map_err(|e| {
                    ProvisionError::persistence("unable to create connection details", e)
                })?;
                Ok(true)
            }
            Some(mut record) => {
                record.data.host = server.spec.host.clone();
                self.credentials.update(&record).await.map_err(|e| {
                    ProvisionError::persistence("unable to update connection details", e)
                })?;
                Ok(false)
            }
        }
    }

    fn within_deadline(&self, expires: Instant) -> Result<(), ProvisionError> {
        if Instant::now() >= expires {
            warn!(deadline = ?self.deadline, "deadline passed before next write");
            return Err(ProvisionError::DeadlineExceeded(self.deadline));
        }
        Ok(())
    }

    /// Records `err` on the intent (best effort) and hands it back for propagation.
    async fn fail(&self, intent: &mut DatabaseIntent, err: ProvisionError) -> ProvisionError {
        error!(kind = err.kind(), error = %err, "reconciliation failed");
        if let Err(status_err) = self.status.report(intent, Some(&err)).await {
            warn!(error = %status_err, "unable to record failure on database status");
        }
        err
    }

    async fn report_abandoned(&self, key: &ObjectKey, err: &ProvisionError) {
        match self.intents.get(key).await {
            Ok(Some(mut intent)) => {
                if let Err(status_err) = self.status.report(&mut intent, Some(err)).await {
                    warn!(error = %status_err, "unable to record deadline on database status");
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "unable to re-fetch database intent after deadline"),
        }
    }
}

/// Returns `true` if the schema had to be created. Grants are reapplied every time.
async fn provision_schema(
    conn: &mut dyn SchemaConnection,
    schema: &str,
    password: &str,
) -> Result<bool, ProvisionError> {
    let created = if conn.exists(schema).await {
        info!(database = schema, "database already exists");
        false
    } else {
        conn.create(schema).await.map_err(ProvisionError::SchemaOp)?;
        info!(database = schema, "created database");
        true
    };

    conn.grant_all(schema, schema, password)
        .await
        .map_err(ProvisionError::SchemaOp)?;
    info!(database = schema, "set grant");
    Ok(created)
}

async fn drop_schema(conn: &mut dyn SchemaConnection, schema: &str) -> Result<(), ProvisionError> {
    info!(database = schema, "database intent deleted; dropping database");
    conn.drop_schema(schema)
        .await
        .map_err(ProvisionError::SchemaOp)?;
    info!(database = schema, "deleted database");
    Ok(())
}
