//! Applies placements to a store: inserts, subtree moves and deletes, one transaction each.

use tracing::debug;

use crate::config::TreeConfig;
use crate::error::{Error, Result};
use crate::labeler::Labeler;
use crate::lookup::{Lookup, PrefixRange, Predicate, Projected, Projection};
use crate::path::Path;
use crate::position::{resolve, Placement, Position};
use crate::traits::{PathStore, PathTransaction, PrefixRewrite, Row, TransactionalStore};

/// What to do with the descendants of a deleted node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OnDelete {
    /// Refuse while descendants exist.
    Protect,
    /// Remove the whole subtree.
    Cascade,
}

/// A node to create together with its children, carrying caller data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeSpec<T> {
    pub data: T,
    pub children: Vec<TreeSpec<T>>,
}

impl<T> TreeSpec<T> {
    pub fn new(data: T, children: Vec<TreeSpec<T>>) -> Self {
        Self { data, children }
    }

    pub fn leaf(data: T) -> Self {
        Self::new(data, Vec::new())
    }
}

/// A tree of materialized paths kept consistent on top of a [`TransactionalStore`].
///
/// Every mutation resolves its position inside its own transaction and commits or rolls back
/// as a whole. Conflicts are reported, never retried.
pub struct PathTree<S> {
    store: S,
    labeler: Labeler,
}

impl<S: TransactionalStore> PathTree<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            labeler: Labeler::default(),
        }
    }

    pub fn with_config(store: S, config: &TreeConfig) -> Result<Self> {
        Ok(Self {
            store,
            labeler: Labeler::new(config)?,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_inner(self) -> S {
        self.store
    }

    pub fn labeler(&self) -> &Labeler {
        &self.labeler
    }

    /// Resolve without writing; pass the result to [`insert_planned`](Self::insert_planned) or
    /// [`move_planned`](Self::move_planned) to apply it only if it still holds.
    pub fn plan(
        &mut self,
        position: &Position,
        moving: Option<&Path>,
        count: usize,
    ) -> Result<Placement> {
        resolve(&mut self.store, &self.labeler, position, moving, count)
    }

    pub fn insert(&mut self, position: &Position) -> Result<Row> {
        let mut rows = self.insert_many(position, 1)?;
        rows.pop()
            .ok_or_else(|| Error::storage_msg("insert produced no row"))
    }

    /// Insert `count` adjacent nodes at `position`.
    pub fn insert_many(&mut self, position: &Position, count: usize) -> Result<Vec<Row>> {
        self.apply(position, None, count, None).map(|(_, rows)| rows)
    }

    /// Insert at a previously computed placement; [`Error::ConcurrentModification`] if the
    /// tree changed so that the placement no longer resolves the same way.
    pub fn insert_planned(&mut self, placement: &Placement) -> Result<Vec<Row>> {
        let count = placement.destinations.len();
        self.apply(&placement.position, None, count, Some(placement))
            .map(|(_, rows)| rows)
    }

    /// Insert nested nodes; the roots go to `position`, children get evenly spread labels.
    /// Returns rows in pre-order paired with their data.
    pub fn insert_tree<T>(
        &mut self,
        position: &Position,
        trees: Vec<TreeSpec<T>>,
    ) -> Result<Vec<(Row, T)>> {
        let labeler = &self.labeler;
        let mut tx = self.store.begin()?;
        let placement = resolve(&mut tx, labeler, position, None, trees.len())?;
        apply_shifts(&mut tx, &placement, None)?;
        let mut out = Vec::new();
        for (path, tree) in placement.destinations.into_iter().zip(trees) {
            insert_subtree(&mut tx, labeler, path, tree, &mut out)?;
        }
        tx.commit()?;
        debug!(rows = out.len(), "inserted tree");
        Ok(out)
    }

    /// Move the node at `path` and its subtree to `position`. Returns the node's new path.
    pub fn move_node(&mut self, path: &Path, position: &Position) -> Result<Path> {
        self.moved(path, position, None)
    }

    pub fn move_planned(&mut self, path: &Path, placement: &Placement) -> Result<Path> {
        self.moved(path, &placement.position, Some(placement))
    }

    fn moved(
        &mut self,
        path: &Path,
        position: &Position,
        expected: Option<&Placement>,
    ) -> Result<Path> {
        let (placement, _) = self.apply(position, Some(path), 1, expected)?;
        placement
            .destinations
            .into_iter()
            .next()
            .ok_or_else(|| Error::storage_msg("move resolved no destination"))
    }

    /// Delete the node at `path`. Returns the number of rows removed.
    pub fn delete(&mut self, path: &Path, on_delete: OnDelete) -> Result<u64> {
        let mut tx = self.store.begin()?;
        if tx.fetch_by_exact(path)?.is_none() {
            return Err(Error::TargetNotFound(path.clone()));
        }
        if on_delete == OnDelete::Protect
            && !tx
                .fetch_by_prefix_range(&PrefixRange::descendants(path))?
                .is_empty()
        {
            return Err(Error::HasDescendants(path.clone()));
        }
        let removed = tx.delete_matching(&Predicate::HasPrefix(path.clone()))?;
        tx.commit()?;
        debug!(path = %path, removed, ?on_delete, "deleted subtree");
        Ok(removed)
    }

    pub fn query(&mut self, lookup: &Lookup) -> Result<Vec<Row>> {
        let predicate = lookup.translate()?;
        self.store.fetch_matching(&predicate)
    }

    pub fn project(
        &mut self,
        lookup: &Lookup,
        projection: &Projection,
    ) -> Result<Vec<(Row, Projected)>> {
        let predicate = lookup.translate()?;
        self.store.project(&predicate, projection)
    }

    fn apply(
        &mut self,
        position: &Position,
        moving: Option<&Path>,
        count: usize,
        expected: Option<&Placement>,
    ) -> Result<(Placement, Vec<Row>)> {
        let mut tx = self.store.begin()?;
        let placement = resolve(&mut tx, &self.labeler, position, moving, count)?;
        if let Some(expected) = expected {
            if expected != &placement {
                return Err(Error::ConcurrentModification(format!(
                    "placement for {position:?} changed since it was planned"
                )));
            }
        }
        apply_shifts(&mut tx, &placement, moving)?;
        let mut rows = Vec::new();
        if moving.is_none() {
            for destination in &placement.destinations {
                rows.push(tx.insert(destination)?);
            }
        }
        tx.commit()?;
        match moving {
            Some(from) => debug!(
                from = %from,
                to = ?placement.destination().map(ToString::to_string),
                "moved subtree"
            ),
            None => debug!(inserted = rows.len(), "inserted nodes"),
        }
        Ok((placement, rows))
    }
}

/// One `update_paths` call for the sibling shifts plus the moved subtree, if any.
fn apply_shifts<T>(tx: &mut T, placement: &Placement, moving: Option<&Path>) -> Result<u64>
where
    T: PathTransaction,
{
    let mut rewrites: Vec<PrefixRewrite> =
        placement.shifts.iter().map(PrefixRewrite::from).collect();
    if let (Some(from), Some(to)) = (moving, placement.destination()) {
        if from != to {
            rewrites.push(PrefixRewrite::new(from.clone(), to.clone()));
        }
    }
    if rewrites.is_empty() {
        return Ok(0);
    }
    tx.update_paths(&rewrites)
}

fn insert_subtree<T, D>(
    tx: &mut T,
    labeler: &Labeler,
    path: Path,
    tree: TreeSpec<D>,
    out: &mut Vec<(Row, D)>,
) -> Result<()>
where
    T: PathTransaction,
{
    let row = tx.insert(&path)?;
    let labels = labeler.spread(tree.children.len())?;
    out.push((row, tree.data));
    for (label, child) in labels.into_iter().zip(tree.children) {
        insert_subtree(tx, labeler, path.child(label)?, child, out)?;
    }
    Ok(())
}
