#![forbid(unsafe_code)]
//! Core of a materialized-path tree: every node stores the dotted path of labels from its root,
//! and ancestor / descendant / sibling relationships are answered by comparing paths.
//! This crate stays independent of concrete storage engines; SQLite, PostgreSQL or memory
//! stores plug in through the traits in [`traits`].

pub mod config;
pub mod error;
pub mod executor;
pub mod label;
pub mod labeler;
pub mod lookup;
pub mod lquery;
pub mod ltxtquery;
pub mod path;
pub mod position;
pub mod traits;

pub use config::{StoreConfig, TreeConfig};
pub use error::{Error, Result};
pub use executor::{OnDelete, PathTree, TreeSpec};
pub use label::{Label, LABEL_ALPHABET, MAX_LABEL_LEN};
pub use labeler::{Labeler, PaddedCodec};
pub use lookup::{Comparison, Lookup, Predicate, PrefixRange, Projected, Projection};
pub use lquery::{LabelPattern, Lquery, Segment};
pub use ltxtquery::{Ltxtquery, MAX_NESTING};
pub use path::{Path, MAX_DEPTH};
pub use position::{resolve, Placement, Position, Shift};
pub use traits::{
    MemoryStore, MemoryTransaction, PathStore, PathTransaction, PrefixRewrite, Row, RowId,
    TransactionalStore,
};
