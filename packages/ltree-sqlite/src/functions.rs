//! `ltree_*` scalar functions so path predicates can be evaluated inside SQLite.
//!
//! Patterns are compiled once per statement: SQLite keeps the parsed value as auxiliary data
//! on the pattern argument for as long as that argument stays constant.

use std::sync::Arc;

use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, Error as SqlError};

use ltree_core::{Error, Lquery, Ltxtquery, Path};

fn user_error(err: Error) -> SqlError {
    SqlError::UserFunctionError(Box::new(err))
}

/// Text argument `idx`, or `None` for SQL NULL.
fn optional_text<'a>(ctx: &'a Context<'_>, idx: usize) -> rusqlite::Result<Option<&'a str>> {
    match ctx.get_raw(idx) {
        ValueRef::Null => Ok(None),
        value => value
            .as_str()
            .map(Some)
            .map_err(|e| SqlError::UserFunctionError(Box::new(e))),
    }
}

/// Label count of a dotted path without parsing it.
pub fn nlevel(text: &str) -> i64 {
    if text.is_empty() {
        0
    } else {
        text.bytes().filter(|b| *b == b'.').count() as i64 + 1
    }
}

fn pattern_text(value: ValueRef<'_>) -> Option<&str> {
    value.as_str().ok()
}

/// Register `ltree_nlevel`, `ltree_subltree`, `ltree_matches` and `ltree_search` on `conn`.
pub fn register_functions(conn: &Connection) -> rusqlite::Result<()> {
    let flags = FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC;

    conn.create_scalar_function("ltree_nlevel", 1, flags, |ctx| {
        Ok(optional_text(ctx, 0)?.map(nlevel))
    })?;

    conn.create_scalar_function("ltree_subltree", 3, flags, |ctx| {
        let Some(text) = optional_text(ctx, 0)? else {
            return Ok(None);
        };
        let start: i64 = ctx.get(1)?;
        let end: i64 = ctx.get(2)?;
        let path = Path::parse(text).map_err(user_error)?;
        let slice = path.slice(start.max(0) as usize, end.max(0) as usize);
        Ok(Some(slice.to_string()))
    })?;

    conn.create_scalar_function("ltree_matches", 2, flags, |ctx| {
        let pattern: Arc<Lquery> = ctx.get_or_create_aux(1, |value| {
            pattern_text(value)
                .ok_or_else(|| Error::InvalidPatternSyntax("pattern must be text".into()))
                .and_then(Lquery::parse)
        })?;
        let Some(text) = optional_text(ctx, 0)? else {
            return Ok(None);
        };
        let path = Path::parse(text).map_err(user_error)?;
        Ok(Some(pattern.matches(&path)))
    })?;

    conn.create_scalar_function("ltree_search", 2, flags, |ctx| {
        let query: Arc<Ltxtquery> = ctx.get_or_create_aux(1, |value| {
            pattern_text(value)
                .ok_or_else(|| Error::InvalidQuerySyntax("query must be text".into()))
                .and_then(Ltxtquery::parse)
        })?;
        let Some(text) = optional_text(ctx, 0)? else {
            return Ok(None);
        };
        let path = Path::parse(text).map_err(user_error)?;
        Ok(Some(query.evaluate(&path)))
    })?;

    Ok(())
}
