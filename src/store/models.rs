use chrono::{DateTime, Utc};
use dbprov_api::{
    CredentialData, CredentialRecord, DatabaseIntent, DatabaseIntentSpec, DatabaseIntentStatus,
    IntentMeta, ObjectKey, ServerBinding, ServerBindingSpec,
};
use sqlx::FromRow;
use std::collections::BTreeMap;

use crate::error::StoreError;

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbIntentRow {
    pub namespace: String,
    pub name: String,
    pub server_name: String,
    pub connection_secret_name: String,
    pub finalizers: String,
    pub deletion_requested_at: Option<DateTime<Utc>>,
    pub status_created: bool,
    pub status_error: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbIntentRow> for DatabaseIntent {
    type Error = StoreError;

    fn try_from(row: DbIntentRow) -> Result<Self, Self::Error> {
        let finalizers: Vec<String> =
            serde_json::from_str(&row.finalizers).map_err(|e| StoreError::Corrupt {
                kind: "DatabaseIntent",
                message: format!("{}/{} finalizers: {e}", row.namespace, row.name),
            })?;

        Ok(DatabaseIntent {
            metadata: IntentMeta {
                namespace: row.namespace,
                name: row.name,
                finalizers,
                deletion_timestamp: row.deletion_requested_at,
            },
            spec: DatabaseIntentSpec {
                server_name: row.server_name,
                connection_secret_name: row.connection_secret_name,
            },
            status: DatabaseIntentStatus {
                created: row.status_created,
                error: row.status_error,
            },
        })
    }
}

pub(crate) fn encode_finalizers(finalizers: &[String]) -> Result<String, StoreError> {
    serde_json::to_string(finalizers).map_err(|e| StoreError::Corrupt {
        kind: "DatabaseIntent",
        message: format!("finalizers: {e}"),
    })
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbServerRow {
    pub name: String,
    pub host: String,
    pub port: i64,
    pub username: String,
    pub password: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DbServerRow> for ServerBinding {
    type Error = StoreError;

    fn try_from(row: DbServerRow) -> Result<Self, Self::Error> {
        let port = u16::try_from(row.port).map_err(|_| StoreError::Corrupt {
            kind: "ServerBinding",
            message: format!("{} has invalid port {}", row.name, row.port),
        })?;

        Ok(ServerBinding {
            name: row.name,
            spec: ServerBindingSpec {
                host: row.host,
                port,
                username: row.username,
                password: row.password,
            },
        })
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct DbCredentialRow {
    pub namespace: String,
    pub name: String,
    pub owner: Option<String>,
    pub database_name: String,
    pub username: String,
    pub password: String,
    pub host: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbCredentialRow> for CredentialRecord {
    fn from(row: DbCredentialRow) -> Self {
        let data = CredentialData {
            database_name: row.database_name,
            username: row.username,
            password: row.password,
            host: row.host,
        };
        match row.owner {
            Some(owner) => CredentialRecord::new(ObjectKey::new(row.namespace, row.name), owner, data),
            None => CredentialRecord {
                namespace: row.namespace,
                name: row.name,
                annotations: BTreeMap::new(),
                data,
            },
        }
    }
}
