use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Longest label accepted by the codec.
pub const MAX_LABEL_LEN: usize = 255;

/// Every character a label may contain, in byte order.
pub const LABEL_ALPHABET: &str =
    "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ_abcdefghijklmnopqrstuvwxyz";

pub(crate) fn is_label_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// A single path component: 1..=255 characters from `[A-Za-z0-9_]`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct Label(String);

impl Label {
    pub fn new(text: impl Into<String>) -> Result<Self> {
        let text = text.into();
        validate(&text)?;
        Ok(Self(text))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

fn validate(text: &str) -> Result<()> {
    if text.is_empty() {
        return Err(Error::InvalidLabelSyntax("empty label".into()));
    }
    if text.len() > MAX_LABEL_LEN {
        return Err(Error::InvalidLabelSyntax(format!(
            "label of {} characters exceeds {MAX_LABEL_LEN}",
            text.len()
        )));
    }
    if let Some(bad) = text.chars().find(|c| !c.is_ascii() || !is_label_byte(*c as u8)) {
        return Err(Error::InvalidLabelSyntax(format!(
            "'{text}' contains disallowed character {bad:?}"
        )));
    }
    Ok(())
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Label {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Label::new(s)
    }
}

impl TryFrom<String> for Label {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Label::new(value)
    }
}

impl From<Label> for String {
    fn from(label: Label) -> Self {
        label.0
    }
}

impl AsRef<str> for Label {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for Label {
    fn borrow(&self) -> &str {
        &self.0
    }
}
