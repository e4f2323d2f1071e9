use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::lookup::{PrefixRange, Predicate, Projected, Projection};
use crate::path::Path;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Store key of a node row.
pub type RowId = i64;

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Row {
    pub id: RowId,
    pub path: Path,
}

/// Replace the prefix `from` with `to` on every row in the subtree of `from`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PrefixRewrite {
    pub from: Path,
    pub to: Path,
}

impl PrefixRewrite {
    pub fn new(from: Path, to: Path) -> Self {
        Self { from, to }
    }

    /// New path for `path` under a batch of rewrites: the longest `from` containing `path`
    /// wins. `None` when no rewrite covers the path.
    pub fn apply_longest(rewrites: &[PrefixRewrite], path: &Path) -> Option<Result<Path>> {
        rewrites
            .iter()
            .filter(|r| path.is_contained_by(&r.from))
            .max_by_key(|r| r.from.depth())
            .and_then(|r| path.rebase(&r.from, &r.to))
    }
}

/// Read side of a path store. Results are ordered by path.
pub trait PathStore {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>>;

    fn fetch_by_exact(&mut self, path: &Path) -> Result<Option<Row>> {
        Ok(self
            .fetch_matching(&Predicate::Equals(path.clone()))?
            .into_iter()
            .next())
    }

    fn fetch_by_prefix_range(&mut self, range: &PrefixRange) -> Result<Vec<Row>> {
        self.fetch_matching(&range.to_predicate())
    }

    /// Matching rows together with a value projected from each path.
    fn project(
        &mut self,
        predicate: &Predicate,
        projection: &Projection,
    ) -> Result<Vec<(Row, Projected)>> {
        self.fetch_matching(predicate)?
            .into_iter()
            .map(|row| {
                let value = projection.apply(&row.path)?;
                Ok((row, value))
            })
            .collect()
    }
}

/// Writes staged inside a transaction. Dropping without [`commit`](Self::commit) rolls back.
pub trait PathTransaction: PathStore {
    /// Insert a row; an occupied path is [`Error::ConcurrentModification`].
    fn insert(&mut self, path: &Path) -> Result<Row>;

    /// Apply all rewrites at once, each row taking the longest matching `from`. Returns the
    /// number of rows whose path changed. Rewrites that would leave two rows on one path fail
    /// with [`Error::ConcurrentModification`].
    fn update_paths(&mut self, rewrites: &[PrefixRewrite]) -> Result<u64>;

    fn delete_matching(&mut self, predicate: &Predicate) -> Result<u64>;

    fn commit(self) -> Result<()>;
}

/// A store that can open transactions.
pub trait TransactionalStore: PathStore {
    type Transaction<'a>: PathTransaction
    where
        Self: 'a;

    fn begin(&mut self) -> Result<Self::Transaction<'_>>;
}

impl<S: PathStore + ?Sized> PathStore for &mut S {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        (**self).fetch_matching(predicate)
    }

    fn fetch_by_exact(&mut self, path: &Path) -> Result<Option<Row>> {
        (**self).fetch_by_exact(path)
    }

    fn fetch_by_prefix_range(&mut self, range: &PrefixRange) -> Result<Vec<Row>> {
        (**self).fetch_by_prefix_range(range)
    }
}

/// In-memory store keyed by path, for tests and embedding.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    rows: BTreeMap<Path, RowId>,
    next_id: RowId,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All paths in order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.rows.keys()
    }

    fn row(path: &Path, id: RowId) -> Row {
        Row {
            id,
            path: path.clone(),
        }
    }
}

impl PathStore for MemoryStore {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        Ok(self
            .rows
            .iter()
            .filter(|(path, _)| predicate.eval(path))
            .map(|(path, id)| Self::row(path, *id))
            .collect())
    }

    fn fetch_by_exact(&mut self, path: &Path) -> Result<Option<Row>> {
        Ok(self.rows.get(path).map(|id| Self::row(path, *id)))
    }

    fn fetch_by_prefix_range(&mut self, range: &PrefixRange) -> Result<Vec<Row>> {
        // A subtree is contiguous in path order, starting at its prefix.
        Ok(self
            .rows
            .range(range.prefix.clone()..)
            .take_while(|(path, _)| path.is_contained_by(&range.prefix))
            .filter(|(path, _)| range.contains(path))
            .map(|(path, id)| Self::row(path, *id))
            .collect())
    }
}

impl TransactionalStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&mut self) -> Result<MemoryTransaction<'_>> {
        let staged = self.clone();
        Ok(MemoryTransaction {
            target: self,
            staged,
        })
    }
}

/// Copy-on-begin transaction: edits go to a staged copy that replaces the store on commit.
pub struct MemoryTransaction<'a> {
    target: &'a mut MemoryStore,
    staged: MemoryStore,
}

impl PathStore for MemoryTransaction<'_> {
    fn fetch_matching(&mut self, predicate: &Predicate) -> Result<Vec<Row>> {
        self.staged.fetch_matching(predicate)
    }

    fn fetch_by_exact(&mut self, path: &Path) -> Result<Option<Row>> {
        self.staged.fetch_by_exact(path)
    }

    fn fetch_by_prefix_range(&mut self, range: &PrefixRange) -> Result<Vec<Row>> {
        self.staged.fetch_by_prefix_range(range)
    }
}

impl PathTransaction for MemoryTransaction<'_> {
    fn insert(&mut self, path: &Path) -> Result<Row> {
        if path.is_empty() {
            return Err(Error::storage_msg("cannot store the empty path"));
        }
        if self.staged.rows.contains_key(path) {
            return Err(Error::ConcurrentModification(format!(
                "path '{path}' is already taken"
            )));
        }
        self.staged.next_id += 1;
        let id = self.staged.next_id;
        self.staged.rows.insert(path.clone(), id);
        Ok(MemoryStore::row(path, id))
    }

    fn update_paths(&mut self, rewrites: &[PrefixRewrite]) -> Result<u64> {
        let mut rows = BTreeMap::new();
        let mut changed = 0;
        for (path, id) in &self.staged.rows {
            let path = match PrefixRewrite::apply_longest(rewrites, path) {
                Some(rewritten) => {
                    changed += 1;
                    rewritten?
                }
                None => path.clone(),
            };
            if rows.insert(path.clone(), *id).is_some() {
                return Err(Error::ConcurrentModification(format!(
                    "rewrite leaves two rows at '{path}'"
                )));
            }
        }
        self.staged.rows = rows;
        Ok(changed)
    }

    fn delete_matching(&mut self, predicate: &Predicate) -> Result<u64> {
        let before = self.staged.rows.len();
        self.staged.rows.retain(|path, _| !predicate.eval(path));
        Ok((before - self.staged.rows.len()) as u64)
    }

    fn commit(self) -> Result<()> {
        *self.target = self.staged;
        Ok(())
    }
}
