//! Dotted field paths such as `personalInfo.firstName`.
//!
//! The taxonomy of keys belongs to the form definition. Any characters are
//! allowed; the only structure imposed is that no `.`-separated segment is
//! empty, so prefix queries stay meaningful.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_FIELD_KEY_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldKeyError {
    #[error("field key must not be empty")]
    Empty,
    #[error("field key exceeds {MAX_FIELD_KEY_LEN} bytes")]
    TooLong,
    #[error("field key '{0}' has an empty path segment")]
    EmptySegment(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldKey(String);

impl FieldKey {
    pub fn new(value: impl Into<String>) -> Result<Self, FieldKeyError> {
        let value = value.into();
        if value.is_empty() {
            return Err(FieldKeyError::Empty);
        }
        if value.len() > MAX_FIELD_KEY_LEN {
            return Err(FieldKeyError::TooLong);
        }
        if value.split('.').any(str::is_empty) {
            return Err(FieldKeyError::EmptySegment(value));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for FieldKey {
    type Error = FieldKeyError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for FieldKey {
    type Error = FieldKeyError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl FromStr for FieldKey {
    type Err = FieldKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl From<FieldKey> for String {
    fn from(value: FieldKey) -> Self {
        value.0
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
