use std::time::Duration;

use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, ErrorCode, TransactionBehavior};
use tracing::{debug, info};

use ltree_core::{
    Error, Path, PathStore, PathTransaction, Predicate, PrefixRewrite, Result, Row, StoreConfig,
    TransactionalStore, MAX_DEPTH,
};

use crate::functions::register_functions;

/// Marker prepended to rewritten paths while a batch is staged. Sorts after every label byte.
const STAGING_MARK: char = '~';

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Unique-constraint hits and lock contention mean another writer got there first.
pub(crate) fn sqlite_error(err: rusqlite::Error) -> Error {
    match &err {
        rusqlite::Error::SqliteFailure(code, _)
            if matches!(
                code.code,
                ErrorCode::ConstraintViolation | ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ) =>
        {
            Error::ConcurrentModification(err.to_string())
        }
        _ => Error::storage(err),
    }
}

/// SQLite-backed path store. Paths live as dotted text in one table with a unique index, so
/// prefix ranges and ordering come straight from the index.
pub struct SqliteStore {
    conn: Connection,
    config: StoreConfig,
}

impl SqliteStore {
    pub fn new_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(sqlite_error)?;
        Self::from_connection(conn, StoreConfig::default())
    }

    pub fn new(path: impl AsRef<std::path::Path>) -> Result<Self> {
        Self::open_with_config(path, StoreConfig::default())
    }

    pub fn open_with_config(path: impl AsRef<std::path::Path>, config: StoreConfig) -> Result<Self> {
        let conn = Connection::open(path).map_err(sqlite_error)?;
        Self::from_connection(conn, config)
    }

    /// Wrap an open connection: registers the `ltree_*` functions and creates the table.
    pub fn from_connection(conn: Connection, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        conn.busy_timeout(BUSY_TIMEOUT).map_err(sqlite_error)?;
        register_functions(&conn).map_err(sqlite_error)?;
        let store = Self { conn, config };
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    fn ensure_schema(&self) -> Result<()> {
        let StoreConfig {
            table,
            id_column,
            path_column,
        } = &self.config;
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    {id_column} INTEGER PRIMARY KEY,
                    {path_column} TEXT NOT NULL UNIQUE
                );"
            ))
            .map_err(sqlite_error)?;
        info!(table = %table, "sqlite path table ready");
        Ok(())
    }
}

/// Render `predicate` as a WHERE clause over `column`, pushing positional parameters in order.
fn render(predicate: &Predicate, column: &str, params: &mut Vec<Value>) -> String {
    match predicate {
        Predicate::Nothing => "0".to_string(),
        Predicate::Equals(path) => {
            params.push(Value::Text(path.to_string()));
            format!("{column} = ?")
        }
        Predicate::HasPrefix(prefix) if prefix.is_empty() => "1".to_string(),
        Predicate::HasPrefix(prefix) => {
            // 'P.' < every descendant of P < 'P/' since '/' follows '.' in byte order.
            let text = prefix.to_string();
            params.push(Value::Text(format!("{text}.")));
            params.push(Value::Text(format!("{text}/")));
            params.push(Value::Text(text));
            format!("(({column} > ? AND {column} < ?) OR {column} = ?)")
        }
        Predicate::IsPrefixOf(path) => {
            if path.is_empty() {
                return "0".to_string();
            }
            for depth in 1..=path.depth() {
                params.push(Value::Text(path.slice(0, depth).to_string()));
            }
            format!("{column} IN ({})", vec!["?"; path.depth()].join(", "))
        }
        Predicate::Depth(cmp, depth) => {
            params.push(Value::Integer(*depth as i64));
            format!("ltree_nlevel({column}) {} ?", cmp.symbol())
        }
        Predicate::Matches(query) => {
            params.push(Value::Text(query.to_string()));
            format!("ltree_matches({column}, ?)")
        }
        Predicate::Search(query) => {
            params.push(Value::Text(query.to_string()));
            format!("ltree_search({column}, ?)")
        }
        Predicate::And(all) => join(all, " AND ", "1", column, params),
        Predicate::Or(any) => join(any, " OR ", "0", column, params),
        Predicate::Not(inner) => format!("(NOT {})", render(inner, column, params)),
    }
}

fn join(
    parts: &[Predicate],
    op: &str,
    identity: &str,
    column: &str,
    params: &mut Vec<Value>,
) -> String {
    if parts.is_empty() {
        return identity.to_string();
    }
    let rendered: Vec<String> = parts.iter().map(|p| render(p, column, params)).collect();
    format!("({})", rendered.join(op))
}

fn fetch(conn: &Connection, config: &StoreConfig, predicate: &Predicate) -> Result<Vec<Row>> {
    let mut params = Vec::new();
    let filter = render(predicate, &config.path_column, &mut params);
    let sql = format!(
        "SELECT {id}, {path} FROM {table} WHERE {filter} ORDER BY {path}",
        id = config.id_column,
        path = config.path_column,
        table = config.table,
    );
    let mut stmt = conn.prepare_cached(&sql).map_err(sqlite_error)?;
    let rows = stmt
        .query_map(params_from_iter(params.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })
        .map_err(sqlite_error)?;

    let mut out = Vec::new();
    for row in rows {
        let (id, text) = row.map_err(sqlite_error)?;
        out.push(Row {
            id,
            path: Path::parse(&text)?,
        });
    }
    Ok(out)
}

impl PathStore for SqliteStore {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        fetch(&self.conn, &self.config, predicate)
    }
}

impl TransactionalStore for SqliteStore {
    type Transaction<'a> = SqliteTransaction<'a>;

    fn begin(&mut self) -> Result<SqliteTransaction<'_>> {
        // IMMEDIATE takes the write lock at BEGIN; readers never upgrade mid-transaction.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(sqlite_error)?;
        Ok(SqliteTransaction {
            tx,
            config: &self.config,
        })
    }
}

/// Write transaction on a [`SqliteStore`]. Rolls back when dropped uncommitted.
pub struct SqliteTransaction<'a> {
    tx: rusqlite::Transaction<'a>,
    config: &'a StoreConfig,
}

impl PathStore for SqliteTransaction<'_> {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        fetch(&self.tx, self.config, predicate)
    }
}

impl PathTransaction for SqliteTransaction<'_> {
    fn insert(&mut self, path: &Path) -> Result<Row> {
        if path.is_empty() {
            return Err(Error::storage_msg("cannot store the empty path"));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES (?1)",
            self.config.table, self.config.path_column
        );
        self.tx
            .prepare_cached(&sql)
            .and_then(|mut stmt| stmt.execute([path.to_string()]))
            .map_err(sqlite_error)?;
        Ok(Row {
            id: self.tx.last_insert_rowid(),
            path: path.clone(),
        })
    }

    fn update_paths(&mut self, rewrites: &[PrefixRewrite]) -> Result<u64> {
        if rewrites.is_empty() {
            return Ok(0);
        }
        let StoreConfig {
            table,
            id_column,
            path_column,
        } = self.config;
        let mut batch = Vec::with_capacity(rewrites.len() * 3);
        for rewrite in rewrites {
            batch.push(Value::Text(rewrite.from.to_string()));
            batch.push(Value::Text(rewrite.to.to_string()));
            batch.push(Value::Integer(
                rewrite.to.depth() as i64 - rewrite.from.depth() as i64,
            ));
        }
        // Every covered row paired with the deepest source containing it.
        let ranked = format!(
            "WITH batch(src, dst, grow) AS (VALUES {values}),
             ranked AS (
                 SELECT r.{id_column} AS row_id, r.{path_column} AS old, b.src, b.dst, b.grow,
                        row_number() OVER (
                            PARTITION BY r.{id_column} ORDER BY length(b.src) DESC
                        ) AS pick
                 FROM {table} AS r JOIN batch AS b
                   ON b.src = '' OR r.{path_column} = b.src
                      OR (r.{path_column} > b.src || '.' AND r.{path_column} < b.src || '/')
             )",
            values = vec!["(?, ?, ?)"; rewrites.len()].join(", "),
        );

        // Any failure below rolls back to here and leaves the transaction as it was.
        let savepoint = self
            .tx
            .savepoint_with_name("ltree_rewrite")
            .map_err(sqlite_error)?;

        let (deepest, shallowest): (Option<i64>, Option<i64>) = savepoint
            .query_row(
                &format!(
                    "{ranked}
                     SELECT max(ltree_nlevel(old) + grow), min(ltree_nlevel(old) + grow)
                     FROM ranked WHERE pick = 1"
                ),
                params_from_iter(batch.iter()),
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(sqlite_error)?;
        if let Some(depth) = deepest.filter(|d| *d > MAX_DEPTH as i64) {
            return Err(Error::PathTooLong(depth as usize));
        }
        if shallowest == Some(0) {
            return Err(Error::storage_msg("cannot store the empty path"));
        }

        // New paths are staged behind the marker so that swaps inside one batch never collide
        // with a row that has not moved yet.
        let changed = savepoint
            .execute(
                &format!(
                    "{ranked}
                     UPDATE {table} SET {path_column} = '{STAGING_MARK}' || CASE
                         WHEN ranked.src = '' THEN
                             iif(ranked.dst = '', ranked.old, ranked.dst || '.' || ranked.old)
                         WHEN ranked.old = ranked.src THEN ranked.dst
                         WHEN ranked.dst = '' THEN substr(ranked.old, length(ranked.src) + 2)
                         ELSE ranked.dst || substr(ranked.old, length(ranked.src) + 1)
                     END
                     FROM ranked
                     WHERE ranked.pick = 1 AND {table}.{id_column} = ranked.row_id"
                ),
                params_from_iter(batch.iter()),
            )
            .map_err(sqlite_error)?;
        savepoint
            .execute(
                &format!(
                    "UPDATE {table} SET {path_column} = substr({path_column}, 2)
                     WHERE {path_column} >= ?1"
                ),
                [STAGING_MARK.to_string()],
            )
            .map_err(sqlite_error)?;
        savepoint.commit().map_err(sqlite_error)?;

        debug!(rewrites = rewrites.len(), changed, "rewrote path prefixes");
        Ok(changed as u64)
    }

    fn delete_matching(&mut self, predicate: &Predicate) -> Result<u64> {
        let mut params = Vec::new();
        let filter = render(predicate, &self.config.path_column, &mut params);
        let deleted = self
            .tx
            .execute(
                &format!("DELETE FROM {} WHERE {filter}", self.config.table),
                params_from_iter(params.iter()),
            )
            .map_err(sqlite_error)?;
        Ok(deleted as u64)
    }

    fn commit(self) -> Result<()> {
        self.tx.commit().map_err(sqlite_error)
    }
}
