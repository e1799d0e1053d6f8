//! Declarative MySQL database provisioning controller.
//!
//! A `DatabaseIntent` names a server binding and a connection-secret name; the
//! controller converges the target MySQL server to match it: creating the
//! schema, granting a generated user access, persisting the credentials, and
//! dropping the schema when the intent is deleted.

pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod policy;
pub mod reconcile;
pub mod server;
pub mod store;
mod utils;

pub use dbprov_api as api;
pub use error::{ProvisionError, StoreError};
pub use reconcile::{ReconcileOutcome, Reconciler};
