use std::time::Duration;
use thiserror::Error as ThisError;

use super::{GatewayError, StoreError};

/// A derived schema name that the name policy rejects.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
pub enum ValidationError {
    #[error("database name must not be empty")]
    Empty,

    #[error("database name {name:?} contains invalid characters")]
    InvalidCharacters { name: String },

    #[error("database name {name:?} is too long ({len} > {max} characters)")]
    TooLong { name: String, len: usize, max: usize },
}

/// Outcome of a failed reconciliation.
///
/// The driver retries every variant the same way; the variants only drive
/// logging and the message written to `status.error`.
#[derive(Debug, ThisError)]
pub enum ProvisionError {
    #[error("{context}: {source}")]
    Lookup {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("unable to connect to MySQL server: {0}")]
    Connection(#[source] GatewayError),

    #[error("{0}")]
    SchemaOp(#[source] GatewayError),

    #[error("{context}: {source}")]
    Persistence {
        context: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("reconciliation exceeded its deadline of {0:?}")]
    DeadlineExceeded(Duration),
}

impl ProvisionError {
    pub(crate) fn lookup(context: &'static str, source: StoreError) -> Self {
        ProvisionError::Lookup { context, source }
    }

    pub(crate) fn persistence(context: &'static str, source: StoreError) -> Self {
        ProvisionError::Persistence { context, source }
    }

    /// Short class name used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            ProvisionError::Lookup { .. } => "lookup",
            ProvisionError::Validation(_) => "validation",
            ProvisionError::Connection(_) => "connection",
            ProvisionError::SchemaOp(_) => "schema_op",
            ProvisionError::Persistence { .. } => "persistence",
            ProvisionError::DeadlineExceeded(_) => "deadline",
        }
    }

    /// Human-readable message recorded on the intent's `status.error`.
    pub fn status_message(&self) -> String {
        self.to_string()
    }
}
