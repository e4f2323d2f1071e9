//! Turns a symbolic position ("first child of X") into concrete destination paths.

use tracing::{debug, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::label::Label;
use crate::labeler::Labeler;
use crate::lookup::PrefixRange;
use crate::path::Path;
use crate::traits::{PathStore, PrefixRewrite};

/// Where a node goes, relative to an existing node identified by its current path.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Position {
    /// After the last root.
    Root,
    FirstChildOf(Path),
    LastChildOf(Path),
    LeftSiblingOf(Path),
    RightSiblingOf(Path),
}

impl Position {
    fn target(&self) -> Option<&Path> {
        match self {
            Position::Root => None,
            Position::FirstChildOf(t)
            | Position::LastChildOf(t)
            | Position::LeftSiblingOf(t)
            | Position::RightSiblingOf(t) => Some(t),
        }
    }
}

/// An existing sibling that has to be relabelled to make room.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Shift {
    pub from: Path,
    pub to: Path,
}

impl From<&Shift> for PrefixRewrite {
    fn from(shift: &Shift) -> Self {
        PrefixRewrite::new(shift.from.clone(), shift.to.clone())
    }
}

/// Outcome of resolving a [`Position`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Placement {
    pub position: Position,
    /// One free, adjacent path per requested slot, in sibling order.
    pub destinations: Vec<Path>,
    /// Siblings to relabel, ordered by current path. Empty unless the gap ran out.
    pub shifts: Vec<Shift>,
}

impl Placement {
    pub fn destination(&self) -> Option<&Path> {
        self.destinations.first()
    }

    /// First and last sibling that moves, as a closed interval.
    pub fn shift_range(&self) -> Option<(&Path, &Path)> {
        Some((&self.shifts.first()?.from, &self.shifts.last()?.from))
    }
}

/// Resolve `position` into `count` destination slots.
///
/// `moving` is the current path of a node being moved; it is ignored as a sibling and the
/// target may not lie in its subtree.
pub fn resolve<S>(
    store: &mut S,
    labeler: &Labeler,
    position: &Position,
    moving: Option<&Path>,
    count: usize,
) -> Result<Placement>
where
    S: PathStore + ?Sized,
{
    if let Some(target) = position.target() {
        if store.fetch_by_exact(target)?.is_none() {
            return Err(Error::TargetNotFound(target.clone()));
        }
        if let Some(moving) = moving {
            if target.is_contained_by(moving) {
                return Err(Error::PositionConflict(format!(
                    "cannot place '{moving}' relative to '{target}' inside its own subtree"
                )));
            }
        }
    }
    if let Some(moving) = moving {
        if store.fetch_by_exact(moving)?.is_none() {
            return Err(Error::TargetNotFound(moving.clone()));
        }
    }

    let parent = match position {
        Position::Root => Path::empty(),
        Position::FirstChildOf(t) | Position::LastChildOf(t) => t.clone(),
        Position::LeftSiblingOf(t) | Position::RightSiblingOf(t) => t.parent()?,
    };
    let siblings: Vec<Path> = store
        .fetch_by_prefix_range(&PrefixRange::children(&parent))?
        .into_iter()
        .map(|row| row.path)
        .filter(|path| Some(path) != moving)
        .collect();
    let index = match position {
        Position::Root | Position::LastChildOf(_) => siblings.len(),
        Position::FirstChildOf(_) => 0,
        Position::LeftSiblingOf(t) => sibling_index(&siblings, t)?,
        Position::RightSiblingOf(t) => sibling_index(&siblings, t)? + 1,
    };

    let labels: Vec<&Label> = siblings.iter().filter_map(Path::last).collect();
    let placement = match allocate(labeler, &labels, index, count) {
        Some(fresh) => Placement {
            position: position.clone(),
            destinations: children(&parent, fresh)?,
            shifts: Vec::new(),
        },
        None => {
            warn!(
                parent = %parent,
                siblings = siblings.len(),
                "no label gap left, renumbering siblings"
            );
            renumber(labeler, position, &parent, &siblings, index, count)?
        }
    };

    for destination in &placement.destinations {
        let occupied = store.fetch_by_exact(destination)?;
        let vacating = placement.shifts.iter().any(|s| &s.from == destination)
            || moving.is_some_and(|m| m == destination);
        if occupied.is_some() && !vacating {
            return Err(Error::PositionConflict(format!(
                "destination '{destination}' is occupied"
            )));
        }
    }
    debug!(
        position = ?position,
        destination = ?placement.destination().map(ToString::to_string),
        slots = count,
        shifts = placement.shifts.len(),
        "resolved placement"
    );
    Ok(placement)
}

fn sibling_index(siblings: &[Path], target: &Path) -> Result<usize> {
    siblings
        .binary_search(target)
        .map_err(|_| Error::TargetNotFound(target.clone()))
}

/// `count` labels sorting between `labels[index - 1]` and `labels[index]`.
fn allocate(
    labeler: &Labeler,
    labels: &[&Label],
    index: usize,
    count: usize,
) -> Option<Vec<Label>> {
    let right = labels.get(index).copied();
    let mut left = index.checked_sub(1).and_then(|i| labels.get(i)).copied().cloned();
    let mut fresh = Vec::with_capacity(count);
    for _ in 0..count {
        let label = labeler.between(left.as_ref(), right)?;
        left = Some(label.clone());
        fresh.push(label);
    }
    Some(fresh)
}

/// Spread the siblings and the new slots evenly over the label space.
fn renumber(
    labeler: &Labeler,
    position: &Position,
    parent: &Path,
    siblings: &[Path],
    index: usize,
    count: usize,
) -> Result<Placement> {
    let mut spread = labeler.spread(siblings.len() + count)?.into_iter();
    let mut shifts = Vec::new();
    let mut destinations = Vec::with_capacity(count);
    for (i, sibling) in siblings.iter().enumerate() {
        if i == index {
            destinations = children(parent, spread.by_ref().take(count).collect())?;
        }
        let Some(label) = spread.next() else {
            break;
        };
        let to = parent.child(label)?;
        if &to != sibling {
            shifts.push(Shift {
                from: sibling.clone(),
                to,
            });
        }
    }
    if index == siblings.len() {
        destinations = children(parent, spread.collect())?;
    }
    Ok(Placement {
        position: position.clone(),
        destinations,
        shifts,
    })
}

fn children(parent: &Path, labels: Vec<Label>) -> Result<Vec<Path>> {
    labels.into_iter().map(|l| parent.child(l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TreeConfig;
    use crate::traits::{MemoryStore, PathTransaction, TransactionalStore};

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn seeded(paths: &[&str]) -> MemoryStore {
        let mut store = MemoryStore::new();
        let mut tx = store.begin().unwrap();
        for path in paths {
            tx.insert(&p(path)).unwrap();
        }
        tx.commit().unwrap();
        store
    }

    #[test]
    fn first_child_sorts_before_existing_children() {
        let mut store = seeded(&["Top", "Top.Science", "Top.Hobbies"]);
        let placement = resolve(
            &mut store,
            &Labeler::default(),
            &Position::FirstChildOf(p("Top")),
            None,
            1,
        )
        .unwrap();
        let dest = placement.destination().unwrap();
        assert!(dest.is_descendant_of(&p("Top")));
        assert!(dest < &p("Top.Hobbies"));
        assert!(placement.shifts.is_empty());
        assert!(placement.shift_range().is_none());
    }

    #[test]
    fn sibling_positions_are_anchored() {
        let mut store = seeded(&["r", "r.b", "r.d"]);
        let labeler = Labeler::default();
        let left = resolve(&mut store, &labeler, &Position::LeftSiblingOf(p("r.d")), None, 1)
            .unwrap();
        let dest = left.destination().unwrap();
        assert!(&p("r.b") < dest && dest < &p("r.d"));

        let right = resolve(&mut store, &labeler, &Position::RightSiblingOf(p("r.d")), None, 2)
            .unwrap();
        assert_eq!(right.destinations.len(), 2);
        assert!(p("r.d") < right.destinations[0]);
        assert!(right.destinations[0] < right.destinations[1]);

        let root = resolve(&mut store, &labeler, &Position::Root, None, 1).unwrap();
        assert!(root.destination().unwrap() > &p("r"));
        assert_eq!(root.destination().unwrap().depth(), 1);
    }

    #[test]
    fn missing_targets_and_self_placement() {
        let mut store = seeded(&["a", "a.b"]);
        let labeler = Labeler::default();
        assert!(matches!(
            resolve(&mut store, &labeler, &Position::LastChildOf(p("x")), None, 1),
            Err(Error::TargetNotFound(_))
        ));
        assert!(matches!(
            resolve(&mut store, &labeler, &Position::LastChildOf(p("a.b")), Some(&p("a")), 1),
            Err(Error::PositionConflict(_))
        ));
        assert!(matches!(
            resolve(&mut store, &labeler, &Position::RightSiblingOf(p("a")), Some(&p("a")), 1),
            Err(Error::PositionConflict(_))
        ));
        assert!(matches!(
            resolve(&mut store, &labeler, &Position::Root, Some(&p("zz")), 1),
            Err(Error::TargetNotFound(_))
        ));
    }

    #[test]
    fn exhausted_gap_renumbers_siblings() {
        let labeler = Labeler::new(&TreeConfig {
            label_width: 1,
            gap: 1,
        })
        .unwrap();
        let codec = labeler.codec();
        let a = codec.encode(10).unwrap();
        let b = codec.encode(11).unwrap();
        let mut store = seeded(&["r"]);
        let mut tx = store.begin().unwrap();
        for label in [&a, &b] {
            tx.insert(&p("r").child(label.clone()).unwrap()).unwrap();
        }
        tx.commit().unwrap();

        let right_of_a = Position::RightSiblingOf(p("r").child(a).unwrap());
        let placement = resolve(&mut store, &labeler, &right_of_a, None, 1).unwrap();
        assert!(!placement.shifts.is_empty());
        let (first, last) = placement.shift_range().unwrap();
        assert!(first <= last);

        let mut finals: Vec<Path> = placement.shifts.iter().map(|s| s.to.clone()).collect();
        finals.extend(placement.destinations.iter().cloned());
        finals.sort();
        finals.dedup();
        assert_eq!(finals.len(), placement.shifts.len() + 1);
    }

    #[test]
    fn moving_node_is_not_its_own_sibling() {
        let mut store = seeded(&["r", "r.a", "r.b"]);
        let placement = resolve(
            &mut store,
            &Labeler::default(),
            &Position::LastChildOf(p("r")),
            Some(&p("r.b")),
            1,
        )
        .unwrap();
        assert!(placement.destination().unwrap() > &p("r.a"));
    }
}
