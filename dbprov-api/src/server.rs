use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerBindingSpec {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Cluster-scoped admin coordinates for a MySQL server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ServerBinding {
    pub name: String,
    pub spec: ServerBindingSpec,
}

impl ServerBinding {
    /// Copy safe to hand out over the API: the admin password is blanked.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.spec.password.is_empty() {
            copy.spec.password = "<redacted>".to_string();
        }
        copy
    }
}
