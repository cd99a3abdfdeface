//! Structural search over list answers.
//!
//! A filter addresses one member of each list item by a dotted path and
//! compares it against an operand. Comparisons are type strict: a numeric
//! operand only matches numeric members, text only matches text.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::{FieldKey, ListItem};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FilterError {
    #[error("item path must not be empty")]
    EmptyPath,
    #[error("item path '{0}' has an invalid segment")]
    InvalidPath(String),
    #[error("unknown comparison operator '{0}'; expected one of eq, ne, gt, gte, lt, lte, exists")]
    UnknownOperator(String),
    #[error("operator {0} requires an operand")]
    MissingOperand(CompareOp),
    #[error("operand must be a number, string or boolean (got {0})")]
    UnsupportedOperand(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Exists,
}

impl CompareOp {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Exists => "exists",
        }
    }

    /// SQL operator for the comparison; `None` for `exists`.
    #[must_use]
    pub const fn sql(self) -> Option<&'static str> {
        match self {
            Self::Eq => Some("="),
            Self::Ne => Some("<>"),
            Self::Gt => Some(">"),
            Self::Gte => Some(">="),
            Self::Lt => Some("<"),
            Self::Lte => Some("<="),
            Self::Exists => None,
        }
    }
}

impl FromStr for CompareOp {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "eq" | "=" | "==" => Ok(Self::Eq),
            "ne" | "!=" | "<>" => Ok(Self::Ne),
            "gt" | ">" => Ok(Self::Gt),
            "gte" | ">=" => Ok(Self::Gte),
            "lt" | "<" => Ok(Self::Lt),
            "lte" | "<=" => Ok(Self::Lte),
            "exists" => Ok(Self::Exists),
            other => Err(FilterError::UnknownOperator(other.to_owned())),
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Operand {
    pub fn from_json(value: &Value) -> Result<Self, FilterError> {
        match value {
            Value::Bool(b) => Ok(Self::Bool(*b)),
            Value::Number(n) => n
                .as_f64()
                .map(Self::Number)
                .ok_or_else(|| FilterError::UnsupportedOperand(n.to_string())),
            Value::String(s) => Ok(Self::Text(s.clone())),
            other => Err(FilterError::UnsupportedOperand(other.to_string())),
        }
    }

    /// Values `json_type()` reports for members comparable with this operand.
    #[must_use]
    pub const fn json_types(&self) -> &'static [&'static str] {
        match self {
            Self::Bool(_) => &["true", "false"],
            Self::Number(_) => &["integer", "real"],
            Self::Text(_) => &["text"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFilter {
    path: String,
    op: CompareOp,
    operand: Option<Operand>,
}

impl ItemFilter {
    pub fn new(path: &str, op: CompareOp, operand: Option<Operand>) -> Result<Self, FilterError> {
        let path = path.trim();
        if path.is_empty() {
            return Err(FilterError::EmptyPath);
        }
        let valid_segment = |segment: &str| {
            !segment.is_empty()
                && segment
                    .chars()
                    .all(|c| c.is_alphanumeric() || matches!(c, '_' | '-'))
        };
        if !path.split('.').all(valid_segment) {
            return Err(FilterError::InvalidPath(path.to_owned()));
        }
        if op != CompareOp::Exists && operand.is_none() {
            return Err(FilterError::MissingOperand(op));
        }
        Ok(Self {
            path: path.to_owned(),
            op,
            operand: if op == CompareOp::Exists { None } else { operand },
        })
    }

    /// Shorthand for `path > value`, the common "any item where quantity > 0" case.
    pub fn greater_than(path: &str, value: f64) -> Result<Self, FilterError> {
        Self::new(path, CompareOp::Gt, Some(Operand::Number(value)))
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn op(&self) -> CompareOp {
        self.op
    }

    #[must_use]
    pub fn operand(&self) -> Option<&Operand> {
        self.operand.as_ref()
    }

    /// SQLite JSON path with every segment quoted, e.g. `$."expenses"."qty"`.
    #[must_use]
    pub fn json_path(&self) -> String {
        let mut out = String::from("$");
        for segment in self.path.split('.') {
            out.push_str(".\"");
            out.push_str(segment);
            out.push('"');
        }
        out
    }
}

/// One list item that satisfied a filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListItemMatch {
    pub field_key: FieldKey,
    pub index: usize,
    pub item: ListItem,
}
