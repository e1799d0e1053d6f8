//! Declarative resource types shared by the controller and its HTTP surface.
//!
//! - [`intent`]: `DatabaseIntent`, the desired state for one logical database
//! - [`server`]: `ServerBinding`, admin coordinates of a target MySQL server
//! - [`credential`]: `CredentialRecord`, the generated connection details

pub mod credential;
pub mod intent;
pub mod server;

pub use credential::{CredentialData, CredentialRecord};
pub use intent::{DatabaseIntent, DatabaseIntentSpec, DatabaseIntentStatus, IntentMeta};
pub use server::{ServerBinding, ServerBindingSpec};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Finalizer placed on every intent until its schema has been dropped.
pub const FINALIZER_NAME: &str = "databases.k8s.io/finalizer";

/// Annotation on a credential record naming the owning intent (`<namespace>/<name>`).
pub const OWNER_ANNOTATION_KEY: &str = "databases.k8s.io/owner";

/// Namespaced identity of an intent or credential record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}
