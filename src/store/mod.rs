//! State store: the intent, server-binding and credential boundaries.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite)
//! - `actor.rs`: the actor owning the pool, and its cloneable handle
//!
//! The reconciler only sees the traits below, so tests and alternative
//! backends can stand in for the SQLite actor.

pub mod actor;
pub mod models;
pub mod schema;

pub use actor::{DeletionRequest, StoreHandle, spawn};
pub use schema::SQLITE_INIT;

use async_trait::async_trait;
use dbprov_api::{CredentialRecord, DatabaseIntent, ObjectKey, ServerBinding};

use crate::error::StoreError;

#[async_trait]
pub trait IntentStore: Send + Sync {
    /// `Ok(None)` when the intent does not exist (or has been erased).
    async fn get(&self, key: &ObjectKey) -> Result<Option<DatabaseIntent>, StoreError>;

    /// Writes the finalizer list; last write wins. The spec is left as stored,
    /// so a copy read before a concurrent re-apply cannot revert it.
    ///
    /// An intent whose deletion has been requested and that carries no
    /// finalizers is erased by this call.
    async fn update(&self, intent: &DatabaseIntent) -> Result<(), StoreError>;

    /// Writes the status subresource only.
    async fn update_status(&self, intent: &DatabaseIntent) -> Result<(), StoreError>;
}

#[async_trait]
pub trait ServerStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<Option<ServerBinding>, StoreError>;
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Option<CredentialRecord>, StoreError>;

    /// Fails with [`StoreError::AlreadyExists`] if a record is already stored under the key.
    async fn create(&self, record: &CredentialRecord) -> Result<(), StoreError>;

    async fn update(&self, record: &CredentialRecord) -> Result<(), StoreError>;
}
