#![forbid(unsafe_code)]
//! PostgreSQL store for `ltree-core`.
//!
//! Paths are stored in a native `ltree` column with a GiST index, so every predicate is pushed
//! down to the extension's own operators (`<@`, `@>`, `~`, `@`). Tree semantics stay in
//! `ltree-core`; this crate only renders them as SQL.

mod schema;
mod store;

pub use schema::{drop_for_tests, ensure_schema, reset_for_tests};
pub use store::{PostgresStore, PostgresTransaction};
