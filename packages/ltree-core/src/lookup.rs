//! Hierarchy relationships and the store-level predicates they translate to.
//!
//! A [`Lookup`] is what callers ask for ("children of `Top`"); a [`Predicate`] is the small
//! vocabulary every store can evaluate natively (equality, prefix tests, depth, pattern
//! matches). Stores never see relationship names.

use std::fmt;

use crate::error::{Error, Result};
use crate::label::Label;
use crate::lquery::Lquery;
use crate::ltxtquery::Ltxtquery;
use crate::path::Path;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Comparison {
    Eq,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn holds(self, left: usize, right: usize) -> bool {
        match self {
            Comparison::Eq => left == right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
        }
    }

    /// SQL operator.
    pub fn symbol(self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }

    fn from_suffix(suffix: Option<&str>) -> Option<Self> {
        Some(match suffix {
            None | Some("exact") => Comparison::Eq,
            Some("lt") => Comparison::Lt,
            Some("lte") => Comparison::Le,
            Some("gt") => Comparison::Gt,
            Some("gte") => Comparison::Ge,
            Some(_) => return None,
        })
    }
}

/// Store-native filter over a row's path.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Predicate {
    /// Matches no row.
    Nothing,
    Equals(Path),
    /// Row path has the operand as prefix, itself included (`<@`).
    HasPrefix(Path),
    /// Row path is a prefix of the operand, itself included (`@>`).
    IsPrefixOf(Path),
    Depth(Comparison, usize),
    Matches(Lquery),
    Search(Ltxtquery),
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn eval(&self, path: &Path) -> bool {
        match self {
            Predicate::Nothing => false,
            Predicate::Equals(p) => path == p,
            Predicate::HasPrefix(p) => path.is_contained_by(p),
            Predicate::IsPrefixOf(p) => path.contains(p),
            Predicate::Depth(cmp, n) => cmp.holds(path.depth(), *n),
            Predicate::Matches(q) => q.matches(path),
            Predicate::Search(q) => q.evaluate(path),
            Predicate::And(all) => all.iter().all(|p| p.eval(path)),
            Predicate::Or(any) => any.iter().any(|p| p.eval(path)),
            Predicate::Not(inner) => !inner.eval(path),
        }
    }
}

/// A relationship and its operand.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Lookup {
    Exact(Path),
    /// Strict ancestors of the operand.
    AncestorOf(Path),
    /// Strict descendants of the operand.
    DescendantOf(Path),
    /// Rows that are a prefix of (or equal to) any operand.
    Contains(Vec<Path>),
    /// Rows under (or equal to) any operand.
    ContainedBy(Vec<Path>),
    ChildOf(Path),
    ParentOf(Path),
    /// Rows sharing the operand's parent, the operand included.
    SiblingOf(Path),
    Matches(Lquery),
    Search(Ltxtquery),
    Depth(Comparison, usize),
}

impl Lookup {
    /// Resolve a lookup by name, e.g. `("child_of", "Top")` or `("depth__lt", "3")`.
    ///
    /// Set-valued lookups (`contains`, `contained_by`) take a comma-separated operand list.
    pub fn from_name(name: &str, operand: &str) -> Result<Self> {
        let path = || Path::parse(operand);
        let paths = || -> Result<Vec<Path>> {
            if operand.is_empty() {
                return Ok(Vec::new());
            }
            operand.split(',').map(|p| Path::parse(p.trim())).collect()
        };
        Ok(match name {
            "exact" => Lookup::Exact(path()?),
            "ancestor_of" => Lookup::AncestorOf(path()?),
            "descendant_of" => Lookup::DescendantOf(path()?),
            "contains" => Lookup::Contains(paths()?),
            "contained_by" => Lookup::ContainedBy(paths()?),
            "child_of" => Lookup::ChildOf(path()?),
            "parent_of" => Lookup::ParentOf(path()?),
            "sibling_of" => Lookup::SiblingOf(path()?),
            "matches" => Lookup::Matches(Lquery::parse(operand)?),
            "search" => Lookup::Search(Ltxtquery::parse(operand)?),
            _ => {
                let (head, suffix) = match name.split_once("__") {
                    Some((head, suffix)) => (head, Some(suffix)),
                    None => (name, None),
                };
                let cmp = Comparison::from_suffix(suffix)
                    .filter(|_| head == "depth")
                    .ok_or_else(|| Error::UnknownLookup(name.to_string()))?;
                let depth = operand.trim().parse::<usize>().map_err(|_| {
                    Error::UnknownLookup(format!("{name} needs a depth, got '{operand}'"))
                })?;
                Lookup::Depth(cmp, depth)
            }
        })
    }

    pub fn translate(&self) -> Result<Predicate> {
        Ok(match self {
            Lookup::Exact(p) => Predicate::Equals(p.clone()),
            Lookup::AncestorOf(p) => Predicate::And(vec![
                Predicate::IsPrefixOf(p.clone()),
                Predicate::Depth(Comparison::Lt, p.depth()),
            ]),
            Lookup::DescendantOf(p) => Predicate::And(vec![
                Predicate::HasPrefix(p.clone()),
                Predicate::Depth(Comparison::Gt, p.depth()),
            ]),
            Lookup::Contains(ps) => any(ps.iter().cloned().map(Predicate::IsPrefixOf).collect()),
            Lookup::ContainedBy(ps) => any(ps.iter().cloned().map(Predicate::HasPrefix).collect()),
            Lookup::ChildOf(p) => Predicate::And(vec![
                Predicate::HasPrefix(p.clone()),
                Predicate::Depth(Comparison::Eq, p.depth() + 1),
            ]),
            Lookup::ParentOf(p) => {
                let parent = p.parent()?;
                if parent.is_empty() {
                    Predicate::Nothing
                } else {
                    Predicate::Equals(parent)
                }
            }
            Lookup::SiblingOf(p) => {
                let parent = p.parent()?;
                let depth = Predicate::Depth(Comparison::Eq, p.depth());
                if parent.is_empty() {
                    depth
                } else {
                    Predicate::And(vec![Predicate::HasPrefix(parent), depth])
                }
            }
            Lookup::Matches(q) => Predicate::Matches(q.clone()),
            Lookup::Search(q) => Predicate::Search(q.clone()),
            Lookup::Depth(cmp, n) => Predicate::Depth(*cmp, *n),
        })
    }
}

fn any(mut predicates: Vec<Predicate>) -> Predicate {
    match predicates.len() {
        0 => Predicate::Nothing,
        1 => predicates.remove(0),
        _ => Predicate::Or(predicates),
    }
}

/// Value derived from a path rather than a filter on it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Projection {
    Depth,
    Index(isize),
    /// Half-open label range, clamped like `subltree`. Negative bounds count from the end.
    Slice(isize, isize),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Projected {
    Depth(usize),
    Label(Label),
    Path(Path),
}

impl Projection {
    /// `"depth"`, an index such as `"0"` or `"-1"`, or a slice such as `"0_2"` or `"-2_-1"`.
    pub fn from_name(name: &str) -> Result<Self> {
        if name == "depth" {
            return Ok(Projection::Depth);
        }
        if let Some((start, end)) = name.split_once('_') {
            if let (Ok(start), Ok(end)) = (start.parse(), end.parse()) {
                return Ok(Projection::Slice(start, end));
            }
        } else if let Ok(index) = name.parse() {
            return Ok(Projection::Index(index));
        }
        Err(Error::UnknownLookup(name.to_string()))
    }

    pub fn apply(&self, path: &Path) -> Result<Projected> {
        Ok(match self {
            Projection::Depth => Projected::Depth(path.depth()),
            Projection::Index(i) => Projected::Label(path.label_at(*i)?.clone()),
            Projection::Slice(start, end) => {
                let depth = path.depth() as isize;
                let bound = |i: isize| {
                    let i = if i < 0 { depth + i } else { i };
                    i.clamp(0, depth) as usize
                };
                Projected::Path(path.slice(bound(*start), bound(*end)))
            }
        })
    }
}

impl fmt::Display for Projected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Projected::Depth(d) => write!(f, "{d}"),
            Projected::Label(l) => write!(f, "{l}"),
            Projected::Path(p) => write!(f, "{p}"),
        }
    }
}

/// Rows under `prefix` (inclusive) whose depth lies in `min_depth..=max_depth`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PrefixRange {
    pub prefix: Path,
    pub min_depth: usize,
    pub max_depth: Option<usize>,
}

impl PrefixRange {
    /// `prefix` and everything below it.
    pub fn subtree(prefix: &Path) -> Self {
        Self {
            prefix: prefix.clone(),
            min_depth: prefix.depth(),
            max_depth: None,
        }
    }

    pub fn descendants(prefix: &Path) -> Self {
        Self {
            min_depth: prefix.depth() + 1,
            ..Self::subtree(prefix)
        }
    }

    /// Direct children; with the empty prefix these are the roots.
    pub fn children(prefix: &Path) -> Self {
        Self {
            prefix: prefix.clone(),
            min_depth: prefix.depth() + 1,
            max_depth: Some(prefix.depth() + 1),
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        path.is_contained_by(&self.prefix)
            && path.depth() >= self.min_depth
            && self.max_depth.map_or(true, |max| path.depth() <= max)
    }

    pub fn to_predicate(&self) -> Predicate {
        let mut all = Vec::new();
        if !self.prefix.is_empty() {
            all.push(Predicate::HasPrefix(self.prefix.clone()));
        }
        if self.min_depth > 0 {
            all.push(Predicate::Depth(Comparison::Ge, self.min_depth));
        }
        if let Some(max) = self.max_depth {
            all.push(Predicate::Depth(Comparison::Le, max));
        }
        Predicate::And(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(text: &str) -> Path {
        Path::parse(text).unwrap()
    }

    fn select(lookup: &Lookup, paths: &[&str]) -> Vec<String> {
        let predicate = lookup.translate().unwrap();
        paths
            .iter()
            .map(|t| p(t))
            .filter(|path| predicate.eval(path))
            .map(|path| path.to_string())
            .collect()
    }

    const TREE: &[&str] = &[
        "Top",
        "Top.Science",
        "Top.Science.Astronomy",
        "Top.Hobbies",
        "Topic",
        "Other",
    ];

    #[test]
    fn relationship_table() {
        assert_eq!(
            select(&Lookup::AncestorOf(p("Top.Science.Astronomy")), TREE),
            ["Top", "Top.Science"]
        );
        assert_eq!(
            select(&Lookup::DescendantOf(p("Top")), TREE),
            ["Top.Science", "Top.Science.Astronomy", "Top.Hobbies"]
        );
        assert_eq!(
            select(&Lookup::ChildOf(p("Top")), TREE),
            ["Top.Science", "Top.Hobbies"]
        );
        assert_eq!(select(&Lookup::ParentOf(p("Top.Science")), TREE), ["Top"]);
        assert!(select(&Lookup::ParentOf(p("Top")), TREE).is_empty());
        assert_eq!(
            select(&Lookup::SiblingOf(p("Top.Science")), TREE),
            ["Top.Science", "Top.Hobbies"]
        );
        assert_eq!(
            select(&Lookup::SiblingOf(p("Top")), TREE),
            ["Top", "Topic", "Other"]
        );
        assert_eq!(
            select(&Lookup::Contains(vec![p("Top.Science.Astronomy")]), TREE),
            ["Top", "Top.Science", "Top.Science.Astronomy"]
        );
        assert_eq!(
            select(&Lookup::ContainedBy(vec![p("Top.Science"), p("Other")]), TREE),
            ["Top.Science", "Top.Science.Astronomy", "Other"]
        );
        assert!(select(&Lookup::ContainedBy(vec![]), TREE).is_empty());
        assert_eq!(
            select(&Lookup::Depth(Comparison::Ge, 2), TREE),
            ["Top.Science", "Top.Science.Astronomy", "Top.Hobbies"]
        );
    }

    #[test]
    fn parentless_operands_fail() {
        let empty = Path::empty();
        assert!(matches!(
            Lookup::ParentOf(empty.clone()).translate(),
            Err(Error::NoParent)
        ));
        assert!(matches!(
            Lookup::SiblingOf(empty).translate(),
            Err(Error::NoParent)
        ));
    }

    #[test]
    fn lookups_by_name() {
        assert_eq!(
            Lookup::from_name("child_of", "Top").unwrap(),
            Lookup::ChildOf(p("Top"))
        );
        assert_eq!(
            Lookup::from_name("contained_by", "a.b, c").unwrap(),
            Lookup::ContainedBy(vec![p("a.b"), p("c")])
        );
        assert_eq!(
            Lookup::from_name("depth__lte", "2").unwrap(),
            Lookup::Depth(Comparison::Le, 2)
        );
        assert_eq!(
            Lookup::from_name("depth", "2").unwrap(),
            Lookup::Depth(Comparison::Eq, 2)
        );
        assert!(matches!(
            Lookup::from_name("cousin_of", "a"),
            Err(Error::UnknownLookup(_))
        ));
        assert!(matches!(
            Lookup::from_name("depth__near", "2"),
            Err(Error::UnknownLookup(_))
        ));
        assert!(matches!(
            Lookup::from_name("matches", "a..b"),
            Err(Error::InvalidPatternSyntax(_))
        ));
        assert!(matches!(
            Lookup::from_name("child_of", "a-b"),
            Err(Error::InvalidLabelSyntax(_))
        ));
    }

    #[test]
    fn projections() {
        let path = p("Top.Science.Astronomy");
        assert_eq!(
            Projection::from_name("depth").unwrap().apply(&path).unwrap(),
            Projected::Depth(3)
        );
        assert_eq!(
            Projection::from_name("-1").unwrap().apply(&path).unwrap().to_string(),
            "Astronomy"
        );
        assert_eq!(
            Projection::from_name("0_2").unwrap().apply(&path).unwrap(),
            Projected::Path(p("Top.Science"))
        );
        assert!(matches!(
            Projection::from_name("5").unwrap().apply(&path),
            Err(Error::IndexOutOfRange { .. })
        ));
        assert!(Projection::from_name("x_y").is_err());
    }

    #[test]
    fn slice_bounds_count_from_the_end() {
        let path = p("Top.Science.Astronomy");
        let slice = |name: &str| {
            Projection::from_name(name)
                .unwrap()
                .apply(&path)
                .unwrap()
                .to_string()
        };
        assert_eq!(
            Projection::from_name("-2_-1").unwrap(),
            Projection::Slice(-2, -1)
        );
        assert_eq!(slice("-2_-1"), "Science");
        assert_eq!(slice("1_-1"), "Science");
        assert_eq!(slice("-2_3"), "Science.Astronomy");
        assert_eq!(slice("-10_1"), "Top");
        assert_eq!(slice("-1_-2"), "");
        assert_eq!(slice("0_10"), "Top.Science.Astronomy");
    }

    #[test]
    fn prefix_ranges() {
        let top = p("Top");
        let children = PrefixRange::children(&top);
        assert!(children.contains(&p("Top.Science")));
        assert!(!children.contains(&p("Top")));
        assert!(!children.contains(&p("Top.Science.Astronomy")));
        assert!(!children.contains(&p("Topic.x")));
        let roots = PrefixRange::children(&Path::empty());
        assert!(roots.contains(&p("Topic")));
        assert!(!roots.contains(&p("Top.Science")));
        for path in TREE {
            let path = p(path);
            for range in [
                PrefixRange::subtree(&top),
                PrefixRange::descendants(&top),
                children.clone(),
                roots.clone(),
            ] {
                assert_eq!(range.contains(&path), range.to_predicate().eval(&path));
            }
        }
    }
}
