#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Sibling label allocation settings.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct TreeConfig {
    /// Digits per generated label. Base 63, so at most 10 fit in a `u64`.
    pub label_width: usize,
    /// Distance left between an appended or prepended label and its neighbour.
    pub gap: u64,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            label_width: 5,
            gap: 4096,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> Result<()> {
        if !(1..=10).contains(&self.label_width) {
            return Err(Error::Config(format!(
                "label_width must be within 1..=10, got {}",
                self.label_width
            )));
        }
        if self.gap == 0 {
            return Err(Error::Config("gap must be at least 1".into()));
        }
        Ok(())
    }
}

/// Table layout used by the SQL stores.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct StoreConfig {
    pub table: String,
    pub id_column: String,
    pub path_column: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            table: "ltree_nodes".into(),
            id_column: "id".into(),
            path_column: "path".into(),
        }
    }
}

impl StoreConfig {
    pub fn with_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    /// Identifiers are spliced into SQL, so only plain `[A-Za-z_][A-Za-z0-9_]*` names pass.
    pub fn validate(&self) -> Result<()> {
        for (what, ident) in [
            ("table", &self.table),
            ("id_column", &self.id_column),
            ("path_column", &self.path_column),
        ] {
            let valid = ident
                .bytes()
                .next()
                .is_some_and(|b| b.is_ascii_alphabetic() || b == b'_')
                && ident.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
            if !valid {
                return Err(Error::Config(format!("invalid {what} identifier '{ident}'")));
            }
        }
        if self.id_column == self.path_column {
            return Err(Error::Config("id and path columns must differ".into()));
        }
        Ok(())
    }
}
