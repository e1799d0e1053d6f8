use std::time::Duration;
use thiserror::Error as ThisError;

/// Failures talking to a target MySQL server.
#[derive(Debug, ThisError)]
pub enum GatewayError {
    #[error("connect to {address} failed: {source}")]
    Connect {
        address: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("connect to {address} timed out after {timeout:?}")]
    ConnectTimeout { address: String, timeout: Duration },

    #[error("unable to create database {schema}: {source}")]
    Create {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unable to grant access to database {schema}: {source}")]
    Grant {
        schema: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("unable to delete database {schema}: {source}")]
    Drop {
        schema: String,
        #[source]
        source: sqlx::Error,
    },
}
