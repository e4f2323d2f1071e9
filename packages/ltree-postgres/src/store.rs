use postgres::error::SqlState;
use postgres::types::ToSql;
use postgres::{Client, NoTls};
use tracing::debug;

use ltree_core::{
    Error, Path, PathStore, PathTransaction, Predicate, PrefixRewrite, Result, Row, StoreConfig,
    TransactionalStore,
};

use crate::schema::ensure_schema;

/// Unique violations, serialization failures and deadlocks mean another writer got there first.
pub(crate) fn postgres_error(err: postgres::Error) -> Error {
    let conflict = err.code().is_some_and(|code| {
        *code == SqlState::UNIQUE_VIOLATION
            || *code == SqlState::T_R_SERIALIZATION_FAILURE
            || *code == SqlState::T_R_DEADLOCK_DETECTED
    });
    if conflict {
        let message = err
            .as_db_error()
            .map(|db| db.message().to_string())
            .unwrap_or_else(|| err.to_string());
        Error::ConcurrentModification(message)
    } else {
        Error::storage(err)
    }
}

type Param = Box<dyn ToSql + Sync>;

/// Positional parameters collected while rendering a predicate.
#[derive(Default)]
struct Params(Vec<Param>);

impl Params {
    /// Push `value` and return its `$n` placeholder.
    fn push(&mut self, value: impl ToSql + Sync + 'static) -> String {
        self.0.push(Box::new(value));
        format!("${}", self.0.len())
    }

    fn refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.0.iter().map(|p| p.as_ref()).collect()
    }
}

fn render(predicate: &Predicate, column: &str, params: &mut Params) -> String {
    match predicate {
        Predicate::Nothing => "FALSE".to_string(),
        Predicate::Equals(path) => {
            format!("{column} = {}::text::ltree", params.push(path.to_string()))
        }
        Predicate::HasPrefix(prefix) if prefix.is_empty() => "TRUE".to_string(),
        Predicate::HasPrefix(prefix) => {
            format!("{column} <@ {}::text::ltree", params.push(prefix.to_string()))
        }
        Predicate::IsPrefixOf(path) => {
            format!("{column} @> {}::text::ltree", params.push(path.to_string()))
        }
        Predicate::Depth(cmp, depth) => format!(
            "nlevel({column}) {} {}::int8",
            cmp.symbol(),
            params.push(*depth as i64)
        ),
        Predicate::Matches(query) => {
            format!("{column} ~ {}::text::lquery", params.push(query.to_string()))
        }
        Predicate::Search(query) => {
            format!("{column} @ {}::text::ltxtquery", params.push(query.to_string()))
        }
        Predicate::And(all) => join(all, " AND ", "TRUE", column, params),
        Predicate::Or(any) => join(any, " OR ", "FALSE", column, params),
        Predicate::Not(inner) => format!("(NOT {})", render(inner, column, params)),
    }
}

fn join(
    parts: &[Predicate],
    op: &str,
    identity: &str,
    column: &str,
    params: &mut Params,
) -> String {
    if parts.is_empty() {
        return identity.to_string();
    }
    let rendered: Vec<String> = parts.iter().map(|p| render(p, column, params)).collect();
    format!("({})", rendered.join(op))
}

fn fetch(client: &mut Client, config: &StoreConfig, predicate: &Predicate) -> Result<Vec<Row>> {
    let mut params = Params::default();
    let filter = render(predicate, &config.path_column, &mut params);
    let sql = format!(
        "SELECT {id}, {path}::text FROM {table} WHERE {filter} ORDER BY {path}",
        id = config.id_column,
        path = config.path_column,
        table = config.table,
    );
    let rows = client.query(&sql, &params.refs()).map_err(postgres_error)?;
    rows.iter()
        .map(|row| {
            let id: i64 = row.try_get(0).map_err(postgres_error)?;
            let text: &str = row.try_get(1).map_err(postgres_error)?;
            Ok(Row {
                id,
                path: Path::parse(text)?,
            })
        })
        .collect()
}

/// PostgreSQL-backed path store over one connection.
pub struct PostgresStore {
    client: Client,
    config: StoreConfig,
}

impl PostgresStore {
    pub fn connect(url: &str, config: StoreConfig) -> Result<Self> {
        let client = Client::connect(url, NoTls).map_err(postgres_error)?;
        Self::new(client, config)
    }

    /// Wrap a connected client, creating the extension and table if needed.
    pub fn new(mut client: Client, config: StoreConfig) -> Result<Self> {
        ensure_schema(&mut client, &config)?;
        Ok(Self { client, config })
    }

    pub fn client_mut(&mut self) -> &mut Client {
        &mut self.client
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn into_client(self) -> Client {
        self.client
    }
}

impl PathStore for PostgresStore {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        fetch(&mut self.client, &self.config, predicate)
    }
}

impl TransactionalStore for PostgresStore {
    type Transaction<'a> = PostgresTransaction<'a>;

    fn begin(&mut self) -> Result<PostgresTransaction<'_>> {
        self.client
            .batch_execute("BEGIN ISOLATION LEVEL SERIALIZABLE")
            .map_err(postgres_error)?;
        Ok(PostgresTransaction {
            client: &mut self.client,
            config: &self.config,
            open: true,
        })
    }
}

/// Serializable transaction on a [`PostgresStore`]. Rolls back when dropped uncommitted.
pub struct PostgresTransaction<'a> {
    client: &'a mut Client,
    config: &'a StoreConfig,
    open: bool,
}

impl PathStore for PostgresTransaction<'_> {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        fetch(self.client, self.config, predicate)
    }
}

impl PathTransaction for PostgresTransaction<'_> {
    fn insert(&mut self, path: &Path) -> Result<Row> {
        if path.is_empty() {
            return Err(Error::storage_msg("cannot store the empty path"));
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ($1::text::ltree) RETURNING {}",
            self.config.table, self.config.path_column, self.config.id_column
        );
        let row = self
            .client
            .query_one(&sql, &[&path.to_string()])
            .map_err(postgres_error)?;
        Ok(Row {
            id: row.try_get(0).map_err(postgres_error)?,
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
        let sources: Vec<String> = rewrites.iter().map(|r| r.from.to_string()).collect();
        let targets: Vec<String> = rewrites.iter().map(|r| r.to.to_string()).collect();
        // Each row takes the deepest covering source; the whole batch is one statement.
        let sql = format!(
            "UPDATE {table} AS n
             SET {path_column} = CASE
                 WHEN nlevel(n.{path_column}) = nlevel(m.src::ltree) THEN m.dst::ltree
                 ELSE m.dst::ltree || subpath(n.{path_column}, nlevel(m.src::ltree))
             END
             FROM (
                 SELECT DISTINCT ON (r.{id_column}) r.{id_column} AS row_id, s.src, s.dst
                 FROM {table} r
                 JOIN unnest($1::text[], $2::text[]) AS s(src, dst)
                   ON r.{path_column} <@ s.src::ltree
                 ORDER BY r.{id_column}, nlevel(s.src::ltree) DESC
             ) AS m
             WHERE n.{id_column} = m.row_id"
        );
        // A failed statement aborts the whole transaction unless it runs inside a savepoint.
        self.client
            .batch_execute("SAVEPOINT ltree_rewrite")
            .map_err(postgres_error)?;
        let changed = match self.client.execute(&sql, &[&sources, &targets]) {
            Ok(changed) => changed,
            Err(err) => {
                self.client
                    .batch_execute(
                        "ROLLBACK TO SAVEPOINT ltree_rewrite; RELEASE SAVEPOINT ltree_rewrite",
                    )
                    .map_err(postgres_error)?;
                return Err(postgres_error(err));
            }
        };
        self.client
            .batch_execute("RELEASE SAVEPOINT ltree_rewrite")
            .map_err(postgres_error)?;
        debug!(rewrites = rewrites.len(), changed, "rewrote path prefixes");
        Ok(changed)
    }

    fn delete_matching(&mut self, predicate: &Predicate) -> Result<u64> {
        let mut params = Params::default();
        let filter = render(predicate, &self.config.path_column, &mut params);
        self.client
            .execute(
                &format!("DELETE FROM {} WHERE {filter}", self.config.table),
                &params.refs(),
            )
            .map_err(postgres_error)
    }

    fn commit(mut self) -> Result<()> {
        self.open = false;
        self.client.batch_execute("COMMIT").map_err(postgres_error)
    }
}

impl Drop for PostgresTransaction<'_> {
    fn drop(&mut self) {
        if self.open {
            let _ = self.client.batch_execute("ROLLBACK");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ltree_core::{Comparison, Lookup, Lquery};

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn sql(predicate: &Predicate) -> (String, usize) {
        let mut params = Params::default();
        let rendered = render(predicate, "path", &mut params);
        (rendered, params.0.len())
    }

    #[test]
    fn lookups_render_to_ltree_operators() {
        let child_of = Lookup::ChildOf(p("Top")).translate().unwrap();
        assert_eq!(
            sql(&child_of),
            (
                "(path <@ $1::text::ltree AND nlevel(path) = $2::int8)".to_string(),
                2
            )
        );

        let contains = Lookup::Contains(vec![p("a.b"), p("c")]).translate().unwrap();
        assert_eq!(
            sql(&contains),
            (
                "(path @> $1::text::ltree OR path @> $2::text::ltree)".to_string(),
                2
            )
        );

        let pattern = Predicate::Not(Box::new(Predicate::Matches(
            Lquery::parse("*.Astronomy.*").unwrap(),
        )));
        assert_eq!(
            sql(&pattern),
            ("(NOT path ~ $1::text::lquery)".to_string(), 1)
        );
    }

    #[test]
    fn trivial_predicates_need_no_parameters() {
        assert_eq!(sql(&Predicate::Nothing), ("FALSE".to_string(), 0));
        assert_eq!(sql(&Predicate::And(vec![])), ("TRUE".to_string(), 0));
        assert_eq!(sql(&Predicate::Or(vec![])), ("FALSE".to_string(), 0));
        assert_eq!(
            sql(&Predicate::HasPrefix(Path::empty())),
            ("TRUE".to_string(), 0)
        );
        assert_eq!(
            sql(&Predicate::Depth(Comparison::Le, 3)),
            ("nlevel(path) <= $1::int8".to_string(), 1)
        );
    }
}
