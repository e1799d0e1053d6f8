//! SQL DDL for the controller's state store (SQLite).

/// SQLite schema includes:
/// - `database_intents` (one row per (namespace, name) intent)
/// - `server_bindings` (cluster-scoped, one row per server name)
/// - `credential_records` (one row per (namespace, name) secret)
pub const SQLITE_INIT: &str = r#"
-- ---------------------------------------------------------------------------
-- Declared database intents
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS database_intents (
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    server_name TEXT NOT NULL,
    connection_secret_name TEXT NOT NULL,
    finalizers TEXT NOT NULL DEFAULT '[]', -- JSON array
    deletion_requested_at TEXT NULL, -- RFC3339
    status_created INTEGER NOT NULL DEFAULT 0,
    status_error TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    PRIMARY KEY (namespace, name)
);

CREATE INDEX IF NOT EXISTS idx_database_intents_server ON database_intents(server_name);

-- ---------------------------------------------------------------------------
-- Server bindings (admin coordinates)
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS server_bindings (
    name TEXT PRIMARY KEY NOT NULL,
    host TEXT NOT NULL,
    port INTEGER NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL -- RFC3339
);

-- ---------------------------------------------------------------------------
-- Generated connection details
-- ---------------------------------------------------------------------------
CREATE TABLE IF NOT EXISTS credential_records (
    namespace TEXT NOT NULL,
    name TEXT NOT NULL,
    owner TEXT NULL,
    database_name TEXT NOT NULL,
    username TEXT NOT NULL,
    password TEXT NOT NULL,
    host TEXT NOT NULL,
    created_at TEXT NOT NULL, -- RFC3339
    updated_at TEXT NOT NULL, -- RFC3339
    PRIMARY KEY (namespace, name)
);
"#;
