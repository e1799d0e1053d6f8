use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::{ConnectOptions, Connection};
use std::time::Duration;
use tracing::{debug, warn};

use super::{DatabaseGateway, SchemaConnection, ServerTarget, quote_identifier};
use crate::config::GatewayConfig;
use crate::error::GatewayError;

/// Gateway backed by the sqlx MySQL driver; one connection per reconciliation.
#[derive(Debug, Clone)]
pub struct MySqlGateway {
    connect_timeout: Duration,
}

impl MySqlGateway {
    pub fn new(cfg: &GatewayConfig) -> Self {
        Self {
            connect_timeout: cfg.connect_timeout(),
        }
    }
}

#[async_trait]
impl DatabaseGateway for MySqlGateway {
    async fn connect(
        &self,
        target: &ServerTarget,
    ) -> Result<Box<dyn SchemaConnection>, GatewayError> {
        let address = target.address();
        let opts = MySqlConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .username(&target.username)
            .password(&target.password);

        let conn = tokio::time::timeout(self.connect_timeout, opts.connect())
            .await
            .map_err(|_| GatewayError::ConnectTimeout {
                address: address.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|source| GatewayError::Connect {
                address: address.clone(),
                source,
            })?;

        debug!(server = %address, username = %target.username, "connected to mysql server");
        Ok(Box::new(MySqlSchemaConnection { conn }))
    }
}

struct MySqlSchemaConnection {
    conn: MySqlConnection,
}

impl MySqlSchemaConnection {
    /// Runs `<verb> USER ... IDENTIFIED BY <password>` with the password quoted
    /// server-side. Account statements take no placeholders, so the text is
    /// assembled into a session variable and run through `PREPARE`.
    async fn apply_account(
        &mut self,
        verb: AccountVerb,
        username: &str,
        password: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(STAGE_ACCOUNT_SQL)
            .bind(account_sql_prefix(verb, username))
            .bind(password)
            .execute(&mut self.conn)
            .await?;

        let ran = async {
            for sql in RUN_ACCOUNT_SQL {
                sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(sql)).await?;
            }
            Ok::<(), sqlx::Error>(())
        }
        .await;

        // The staged text carries the password; never leave it in the session.
        let cleared = sqlx::Executor::execute(&mut self.conn, sqlx::raw_sql(CLEAR_ACCOUNT_SQL)).await;
        ran?;
        cleared?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AccountVerb {
    Create,
    Alter,
}

const STAGE_ACCOUNT_SQL: &str = "SET @dbprov_account_stmt = CONCAT(?, QUOTE(?))";

const RUN_ACCOUNT_SQL: [&str; 3] = [
    "PREPARE dbprov_account_stmt FROM @dbprov_account_stmt",
    "EXECUTE dbprov_account_stmt",
    "DEALLOCATE PREPARE dbprov_account_stmt",
];

const CLEAR_ACCOUNT_SQL: &str = "SET @dbprov_account_stmt = NULL";

fn create_database_sql(schema: &str) -> String {
    format!("CREATE DATABASE {}", quote_identifier(schema))
}

fn drop_database_sql(schema: &str) -> String {
    format!("DROP DATABASE IF EXISTS {}", quote_identifier(schema))
}

/// Account statement up to (not including) the quoted password.
fn account_sql_prefix(verb: AccountVerb, username: &str) -> String {
    let verb = match verb {
        AccountVerb::Create => "CREATE USER IF NOT EXISTS",
        AccountVerb::Alter => "ALTER USER",
    };
    format!("{verb} {}@'%' IDENTIFIED BY ", quote_identifier(username))
}

fn grant_sql(schema: &str, username: &str) -> String {
    format!(
        "GRANT ALL ON {}.* TO {}@'%'",
        quote_identifier(schema),
        quote_identifier(username)
    )
}

#[async_trait]
impl SchemaConnection for MySqlSchemaConnection {
    async fn exists(&mut self, schema: &str) -> bool {
        let found = sqlx::query_scalar::<_, String>(
            "SELECT schema_name FROM information_schema.schemata WHERE schema_name = ?",
        )
        .bind(schema)
        .fetch_optional(&mut self.conn)
        .await;

        match found {
            Ok(row) => row.is_some(),
            Err(e) => {
                warn!(database = schema, error = %e, "error querying for existing database");
                false
            }
        }
    }

    async fn create(&mut self, schema: &str) -> Result<(), GatewayError> {
        sqlx::query(&create_database_sql(schema))
            .execute(&mut self.conn)
            .await
            .map_err(|source| GatewayError::Create {
                schema: schema.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn grant_all(
        &mut self,
        schema: &str,
        username: &str,
        password: &str,
    ) -> Result<(), GatewayError> {
        let granted = async {
            self.apply_account(AccountVerb::Create, username, password).await?;
            self.apply_account(AccountVerb::Alter, username, password).await?;
            sqlx::query(&grant_sql(schema, username))
                .execute(&mut self.conn)
                .await?;
            Ok::<(), sqlx::Error>(())
        }
        .await;

        granted.map_err(|source| GatewayError::Grant {
            schema: schema.to_string(),
            source,
        })
    }

    async fn drop_schema(&mut self, schema: &str) -> Result<(), GatewayError> {
        sqlx::query(&drop_database_sql(schema))
            .execute(&mut self.conn)
            .await
            .map_err(|source| GatewayError::Drop {
                schema: schema.to_string(),
                source,
            })?;
        Ok(())
    }

    async fn close(self: Box<Self>) {
        if let Err(e) = self.conn.close().await {
            debug!(error = %e, "mysql connection close failed");
        }
    }
}
