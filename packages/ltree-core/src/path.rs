use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::label::Label;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Most labels a path may hold.
pub const MAX_DEPTH: usize = 65535;

/// An ordered sequence of labels from the root to a node.
///
/// Ordering is lexicographic over labels, and labels compare bytewise, so it matches the
/// bytewise order of the dotted text form (`.` sorts below every label character). The empty
/// path is a valid value (root-level parent, parse of `""`) but stores never hold it.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Path(Vec<Label>);

impl Path {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    /// Parse the dotted text form, e.g. `Top.Science.Astronomy`.
    pub fn parse(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Ok(Self::empty());
        }
        let count = text.bytes().filter(|b| *b == b'.').count() + 1;
        if count > MAX_DEPTH {
            return Err(Error::PathTooLong(count));
        }
        text.split('.')
            .map(Label::new)
            .collect::<Result<Vec<_>>>()
            .map(Self)
    }

    /// Build a path from labels that are already separated.
    pub fn from_labels<I, S>(labels: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let labels = labels
            .into_iter()
            .map(Label::new)
            .collect::<Result<Vec<_>>>()?;
        Self::checked(labels)
    }

    fn checked(labels: Vec<Label>) -> Result<Self> {
        if labels.len() > MAX_DEPTH {
            return Err(Error::PathTooLong(labels.len()));
        }
        Ok(Self(labels))
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn labels(&self) -> &[Label] {
        &self.0
    }

    pub fn last(&self) -> Option<&Label> {
        self.0.last()
    }

    /// Label at `index`; negative indices count from the end.
    pub fn label_at(&self, index: isize) -> Result<&Label> {
        let depth = self.depth();
        let resolved = if index < 0 {
            depth.checked_sub(index.unsigned_abs())
        } else {
            Some(index as usize)
        };
        resolved
            .and_then(|i| self.0.get(i))
            .ok_or(Error::IndexOutOfRange { index, depth })
    }

    /// Labels `start..end`, clamped to the path like `subltree`.
    pub fn slice(&self, start: usize, end: usize) -> Path {
        let end = end.min(self.depth());
        let start = start.min(end);
        Self(self.0[start..end].to_vec())
    }

    /// `subpath` semantics: a negative `offset` starts that far from the end, a negative `len`
    /// leaves that many labels off the end, `None` runs to the end. Out-of-range values clamp.
    pub fn subpath(&self, offset: isize, len: Option<isize>) -> Path {
        let depth = self.depth() as isize;
        let start = if offset < 0 { depth + offset } else { offset }.clamp(0, depth);
        let end = match len {
            None => depth,
            Some(l) if l < 0 => depth + l,
            Some(l) => start + l,
        }
        .clamp(start, depth);
        self.slice(start as usize, end as usize)
    }

    /// Path without its last label.
    pub fn parent(&self) -> Result<Path> {
        if self.is_empty() {
            return Err(Error::NoParent);
        }
        Ok(self.slice(0, self.depth() - 1))
    }

    pub fn child(&self, label: Label) -> Result<Path> {
        let mut labels = self.0.clone();
        labels.push(label);
        Self::checked(labels)
    }

    /// `self || other`.
    pub fn concat(&self, other: &Path) -> Result<Path> {
        let mut labels = Vec::with_capacity(self.depth() + other.depth());
        labels.extend_from_slice(&self.0);
        labels.extend_from_slice(&other.0);
        Self::checked(labels)
    }

    fn is_prefix_of(&self, other: &Path) -> bool {
        other.0.starts_with(&self.0)
    }

    /// Strict: `self` is a proper prefix of `other`.
    pub fn is_ancestor_of(&self, other: &Path) -> bool {
        self.depth() < other.depth() && self.is_prefix_of(other)
    }

    /// Strict: `other` is a proper prefix of `self`.
    pub fn is_descendant_of(&self, other: &Path) -> bool {
        other.is_ancestor_of(self)
    }

    /// Non-strict: `self` is a prefix of `other` or equal to it (`@>`).
    pub fn contains(&self, other: &Path) -> bool {
        self.is_prefix_of(other)
    }

    /// Non-strict: `other` is a prefix of `self` or equal to it (`<@`).
    pub fn is_contained_by(&self, other: &Path) -> bool {
        other.is_prefix_of(self)
    }

    pub fn is_sibling_of(&self, other: &Path) -> bool {
        !self.is_empty()
            && self.depth() == other.depth()
            && self.0[..self.depth() - 1] == other.0[..other.depth() - 1]
    }

    /// Position of the first occurrence of `sub` inside `self`, like ltree `index()`.
    pub fn find(&self, sub: &Path) -> Option<usize> {
        if sub.is_empty() {
            return Some(0);
        }
        self.0.windows(sub.depth()).position(|w| w == sub.labels())
    }

    /// Longest common ancestor of all `paths`; strictly shorter than each of them.
    pub fn lca<'a, I>(paths: I) -> Option<Path>
    where
        I: IntoIterator<Item = &'a Path>,
    {
        let mut iter = paths.into_iter();
        let first = iter.next()?;
        let mut len = first.depth();
        let mut shortest = first.depth();
        for path in iter {
            shortest = shortest.min(path.depth());
            len = first
                .0
                .iter()
                .zip(path.0.iter())
                .take(len)
                .take_while(|(a, b)| a == b)
                .count();
        }
        if shortest == 0 {
            return None;
        }
        Some(first.slice(0, len.min(shortest - 1)))
    }

    /// Replace the `old_prefix` of this path with `new_prefix`, keeping the suffix.
    pub fn rebase(&self, old_prefix: &Path, new_prefix: &Path) -> Option<Result<Path>> {
        if !self.is_contained_by(old_prefix) {
            return None;
        }
        let mut labels = Vec::with_capacity(new_prefix.depth() + self.depth() - old_prefix.depth());
        labels.extend_from_slice(&new_prefix.0);
        labels.extend_from_slice(&self.0[old_prefix.depth()..]);
        Some(Self::checked(labels))
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, label) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            f.write_str(label.as_str())?;
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Path::parse(s)
    }
}

impl TryFrom<String> for Path {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Path::parse(&value)
    }
}

impl From<Path> for String {
    fn from(path: Path) -> Self {
        path.to_string()
    }
}

impl From<Label> for Path {
    fn from(label: Label) -> Self {
        Self(vec![label])
    }
}
