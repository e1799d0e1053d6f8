use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{OWNER_ANNOTATION_KEY, ObjectKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CredentialData {
    pub database_name: String,
    pub username: String,
    pub password: String,
    pub host: String,
}

/// Connection details generated for one intent, stored under its
/// `connectionSecretName`.
///
/// `database_name`, `username` and `password` never change after creation;
/// only `host` follows the current server binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CredentialRecord {
    pub namespace: String,
    pub name: String,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,
    pub data: CredentialData,
}

impl CredentialRecord {
    pub fn new(key: ObjectKey, owner: String, data: CredentialData) -> Self {
        let mut annotations = BTreeMap::new();
        annotations.insert(OWNER_ANNOTATION_KEY.to_string(), owner);
        Self {
            namespace: key.namespace,
            name: key.name,
            annotations,
            data,
        }
    }

    pub fn key(&self) -> ObjectKey {
        ObjectKey::new(&self.namespace, &self.name)
    }

    pub fn owner(&self) -> Option<&str> {
        self.annotations.get(OWNER_ANNOTATION_KEY).map(String::as_str)
    }
}
