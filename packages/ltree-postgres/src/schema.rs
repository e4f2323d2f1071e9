use postgres::Client;
use tracing::info;

use ltree_core::{Result, StoreConfig};

use crate::store::postgres_error;

const SCHEMA_LOCK_KEY: i64 = 0x6c74726565; // "ltree"

fn schema_sql(config: &StoreConfig) -> String {
    let StoreConfig {
        table,
        id_column,
        path_column,
    } = config;
    // Uniqueness is checked at statement end, so one UPDATE may swap two subtrees.
    format!(
        r#"
CREATE EXTENSION IF NOT EXISTS ltree;

CREATE TABLE IF NOT EXISTS {table} (
  {id_column} BIGSERIAL PRIMARY KEY,
  {path_column} ltree NOT NULL,
  CONSTRAINT {table}_{path_column}_key UNIQUE ({path_column}) DEFERRABLE INITIALLY IMMEDIATE
);

CREATE INDEX IF NOT EXISTS {table}_{path_column}_gist
  ON {table} USING GIST ({path_column});
"#
    )
}

/// Create the `ltree` extension and the path table described by `config` if missing.
pub fn ensure_schema(client: &mut Client, config: &StoreConfig) -> Result<()> {
    config.validate()?;
    // Concurrent `CREATE ... IF NOT EXISTS` can still collide in the catalog; serialize it.
    client
        .query_one("SELECT pg_advisory_lock($1)", &[&SCHEMA_LOCK_KEY])
        .map_err(postgres_error)?;

    let res = client
        .batch_execute(&schema_sql(config))
        .map_err(postgres_error);

    // Best-effort unlock. Locks are also released when the connection is dropped.
    let _ = client.query_one("SELECT pg_advisory_unlock($1)", &[&SCHEMA_LOCK_KEY]);

    res?;
    info!(table = %config.table, "postgres path table ready");
    Ok(())
}

pub fn reset_for_tests(client: &mut Client, config: &StoreConfig) -> Result<()> {
    config.validate()?;
    client
        .batch_execute(&format!("TRUNCATE {} RESTART IDENTITY", config.table))
        .map_err(postgres_error)
}

pub fn drop_for_tests(client: &mut Client, config: &StoreConfig) -> Result<()> {
    config.validate()?;
    client
        .batch_execute(&format!("DROP TABLE IF EXISTS {}", config.table))
        .map_err(postgres_error)
}
