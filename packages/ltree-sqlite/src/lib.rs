#![forbid(unsafe_code)]
//! SQLite store for `ltree-core`.
//!
//! Paths are kept as dotted text under a unique index. Text order equals path order, so subtree
//! scans are index range scans, and `ltree_nlevel` / `ltree_subltree` / `ltree_matches` /
//! `ltree_search` SQL functions cover the rest of the predicate language.

mod functions;
mod store;

pub use functions::{nlevel, register_functions};
pub use store::{SqliteStore, SqliteTransaction};
