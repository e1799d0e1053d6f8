use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FINALIZER_NAME, ObjectKey};

/// Server name used when an intent does not name one.
pub const DEFAULT_SERVER_NAME: &str = "default";

/// Suffix appended to the intent name to form the default secret name.
pub const CONNECTION_SECRET_SUFFIX: &str = "-database-details";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct IntentMeta {
    pub namespace: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub finalizers: Vec<String>,
    /// Set by the store when deletion has been requested; never set by the controller.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deletion_timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseIntentSpec {
    #[serde(default)]
    pub server_name: String,
    #[serde(default)]
    pub connection_secret_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseIntentStatus {
    #[serde(default)]
    pub created: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
}

/// Desired state for one logical database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DatabaseIntent {
    pub metadata: IntentMeta,
    #[serde(default)]
    pub spec: DatabaseIntentSpec,
    #[serde(default)]
    pub status: DatabaseIntentStatus,
}

impl DatabaseIntent {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>, spec: DatabaseIntentSpec) -> Self {
        Self {
            metadata: IntentMeta {
                namespace: namespace.into(),
                name: name.into(),
                ..Default::default()
            },
            spec,
            status: DatabaseIntentStatus::default(),
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.metadata.namespace, &self.metadata.name)
    }

    /// Owner tag written onto credential records: `<namespace>/<name>`.
    pub fn owner_tag(&self) -> String {
        self.key().to_string()
    }

    pub fn is_deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    pub fn has_finalizer(&self) -> bool {
        self.metadata.finalizers.iter().any(|f| f == FINALIZER_NAME)
    }

    /// Returns `true` if the finalizer was not present and has been added.
    pub fn add_finalizer(&mut self) -> bool {
        if self.has_finalizer() {
            return false;
        }
        self.metadata.finalizers.push(FINALIZER_NAME.to_string());
        true
    }

    /// Returns `true` if the finalizer was present and has been removed.
    pub fn remove_finalizer(&mut self) -> bool {
        let before = self.metadata.finalizers.len();
        self.metadata.finalizers.retain(|f| f != FINALIZER_NAME);
        before != self.metadata.finalizers.len()
    }

    /// Admission-time defaulting.
    ///
    /// Fills `serverName` and `connectionSecretName` when empty and resets
    /// `status.created`.
    pub fn apply_defaults(&mut self) {
        if self.spec.server_name.is_empty() {
            self.spec.server_name = DEFAULT_SERVER_NAME.to_string();
        }
        if self.spec.connection_secret_name.is_empty() {
            self.spec.connection_secret_name =
                format!("{}{}", self.metadata.name, CONNECTION_SECRET_SUFFIX);
        }
        self.status.created = false;
    }
}
