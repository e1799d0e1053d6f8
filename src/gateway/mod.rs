//! Database gateway: the statements issued against a target MySQL server.

mod mysql;

pub use mysql::MySqlGateway;

use async_trait::async_trait;
use dbprov_api::ServerBinding;
use std::fmt;

use crate::error::GatewayError;

/// Admin coordinates used to open one connection.
#[derive(Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ServerTarget {
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl From<&ServerBinding> for ServerTarget {
    fn from(server: &ServerBinding) -> Self {
        Self {
            host: server.spec.host.clone(),
            port: server.spec.port,
            username: server.spec.username.clone(),
            password: server.spec.password.clone(),
        }
    }
}

impl fmt::Debug for ServerTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerTarget")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[async_trait]
pub trait DatabaseGateway: Send + Sync {
    async fn connect(&self, target: &ServerTarget)
    -> Result<Box<dyn SchemaConnection>, GatewayError>;
}

/// One authenticated admin connection. Dropping it closes the connection.
#[async_trait]
pub trait SchemaConnection: Send {
    /// Catalog lookup. A failed query is reported as "does not exist".
    async fn exists(&mut self, schema: &str) -> bool;

    async fn create(&mut self, schema: &str) -> Result<(), GatewayError>;

    /// Grants all privileges on `schema` to `username@'%'` identified by `password`.
    async fn grant_all(
        &mut self,
        schema: &str,
        username: &str,
        password: &str,
    ) -> Result<(), GatewayError>;

    async fn drop_schema(&mut self, schema: &str) -> Result<(), GatewayError>;

    async fn close(self: Box<Self>);
}

/// Backtick-quotes a MySQL identifier, doubling embedded backticks.
pub fn quote_identifier(ident: &str) -> String {
    format!("`{}`", ident.replace('`', "``"))
}
