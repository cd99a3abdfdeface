//! Typed answer payloads.
//!
//! An answer holds exactly one of five kinds of value. `AnswerValue` is the
//! tagged union for that; the untyped `{ "type": ..., "value": ... }` shape is
//! `RawAnswer`, and converting between the two is the only place a tag is
//! interpreted. There is no coercion: a numeric tag carrying a JSON string is
//! rejected, not parsed.

use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use thiserror::Error;

/// One record inside a repeatable answer (a dependent, an expense line).
pub type ListItem = Map<String, Value>;

const DATE_FORMAT: &str = "%Y-%m-%d";

// ── Amount ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AmountError {
    #[error("'{0}' is not a decimal number")]
    Invalid(String),
    #[error("'{0}' is outside the supported range of ±9999999999999.99")]
    Overflow(String),
}

/// Fixed-point money value with two decimal places, stored as cents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Amount(i64);

impl Amount {
    /// Largest representable magnitude, in cents. Kept below 2^53 so every
    /// amount has an exact JSON number rendering.
    pub const MAX_ABS_CENTS: i64 = 999_999_999_999_999;

    pub fn from_cents(cents: i64) -> Result<Self, AmountError> {
        if cents.unsigned_abs() > Self::MAX_ABS_CENTS.unsigned_abs() {
            return Err(AmountError::Overflow(cents.to_string()));
        }
        Ok(Self(cents))
    }

    /// Round to cents, half away from zero, and range-check.
    pub fn from_decimal(value: Decimal) -> Result<Self, AmountError> {
        let overflow = || AmountError::Overflow(value.to_string());
        let mut rounded = value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        if rounded.abs() > Decimal::new(Self::MAX_ABS_CENTS, 2) {
            return Err(overflow());
        }
        rounded.rescale(2);
        let cents = i64::try_from(rounded.mantissa()).map_err(|_err| overflow())?;
        Self::from_cents(cents)
    }

    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    #[must_use]
    pub fn to_decimal(self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    fn to_json(self) -> Value {
        if self.0 % 100 == 0 {
            return Value::from(self.0 / 100);
        }
        self.to_decimal()
            .to_f64()
            .and_then(Number::from_f64)
            .map_or(Value::Null, Value::Number)
    }
}

fn parse_error(raw: &str, err: &rust_decimal::Error) -> AmountError {
    match err {
        rust_decimal::Error::ExceedsMaximumPossibleValue
        | rust_decimal::Error::LessThanMinimumPossibleValue => AmountError::Overflow(raw.to_owned()),
        _ => AmountError::Invalid(raw.to_owned()),
    }
}

impl FromStr for Amount {
    type Err = AmountError;

    /// Parses `123`, `-45.6`, `0.07`, `1.5e3`. More than two fractional digits
    /// round half away from zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.contains('_') {
            return Err(AmountError::Invalid(trimmed.to_owned()));
        }
        let parsed = if trimmed.contains(['e', 'E']) {
            Decimal::from_scientific(trimmed)
        } else {
            Decimal::from_str(trimmed)
        };
        let value = parsed.map_err(|err| parse_error(trimmed, &err))?;
        Self::from_decimal(value).map_err(|_err| AmountError::Overflow(trimmed.to_owned()))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_decimal())
    }
}

// ── Kinds ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Boolean,
    Text,
    Numeric,
    Date,
    List,
}

impl ValueKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Date => "date",
            Self::List => "list",
        }
    }

    #[must_use]
    pub const fn all() -> &'static [ValueKind] {
        &[
            Self::Boolean,
            Self::Text,
            Self::Numeric,
            Self::Date,
            Self::List,
        ]
    }
}

impl FromStr for ValueKind {
    type Err = ValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ValueError::UnsupportedType { tag: s.to_owned() })
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("unsupported value type '{tag}'; expected one of boolean, text, numeric, date, list")]
    UnsupportedType { tag: String },
    #[error("a {kind} value cannot hold a JSON {found}")]
    PayloadMismatch { kind: ValueKind, found: &'static str },
    #[error("list item {index} must be a JSON object")]
    ListItemNotObject { index: usize },
    #[error("invalid numeric value: {0}")]
    Amount(#[from] AmountError),
    #[error("invalid date '{0}'; expected YYYY-MM-DD")]
    InvalidDate(String),
}

impl ValueError {
    /// Tag or payload shape is outside the five supported kinds, as opposed to
    /// a well-typed payload with an out-of-range value.
    #[must_use]
    pub const fn is_unsupported_type(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedType { .. }
                | Self::PayloadMismatch { .. }
                | Self::ListItemNotObject { .. }
        )
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── AnswerValue ──────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAnswer", into = "RawAnswer")]
pub enum AnswerValue {
    Boolean(bool),
    Text(String),
    Numeric(Amount),
    Date(NaiveDate),
    List(Vec<ListItem>),
}

impl AnswerValue {
    #[must_use]
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Boolean(_) => ValueKind::Boolean,
            Self::Text(_) => ValueKind::Text,
            Self::Numeric(_) => ValueKind::Numeric,
            Self::Date(_) => ValueKind::Date,
            Self::List(_) => ValueKind::List,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    pub fn numeric(literal: &str) -> Result<Self, AmountError> {
        literal.parse().map(Self::Numeric)
    }

    pub fn date(literal: &str) -> Result<Self, ValueError> {
        NaiveDate::parse_from_str(literal, DATE_FORMAT)
            .map(Self::Date)
            .map_err(|_err| ValueError::InvalidDate(literal.to_owned()))
    }

    /// Builds a list value from JSON items, each of which must be an object.
    pub fn list(items: Vec<Value>) -> Result<Self, ValueError> {
        items
            .into_iter()
            .enumerate()
            .map(|(index, item)| match item {
                Value::Object(map) => Ok(map),
                _ => Err(ValueError::ListItemNotObject { index }),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Self::List)
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[ListItem]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// The bare JSON payload, without the tag.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            Self::Boolean(b) => Value::Bool(*b),
            Self::Text(text) => Value::String(text.clone()),
            Self::Numeric(amount) => amount.to_json(),
            Self::Date(date) => Value::String(date.format(DATE_FORMAT).to_string()),
            Self::List(items) => Value::Array(items.iter().cloned().map(Value::Object).collect()),
        }
    }

    /// Interprets an untagged JSON payload under an explicit kind.
    pub fn from_json(kind: ValueKind, value: Value) -> Result<Self, ValueError> {
        let mismatch = |value: &Value| ValueError::PayloadMismatch {
            kind,
            found: json_type_name(value),
        };
        match (kind, value) {
            (ValueKind::Boolean, Value::Bool(b)) => Ok(Self::Boolean(b)),
            (ValueKind::Text, Value::String(text)) => Ok(Self::Text(text)),
            (ValueKind::Numeric, Value::Number(number)) => {
                Ok(Self::Numeric(number.to_string().parse()?))
            }
            (ValueKind::Date, Value::String(raw)) => Self::date(&raw),
            (ValueKind::List, Value::Array(items)) => Self::list(items),
            (_, other) => Err(mismatch(&other)),
        }
    }
}

impl fmt::Display for AnswerValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Text(text) => f.write_str(text),
            Self::Numeric(amount) => write!(f, "{amount}"),
            Self::Date(date) => write!(f, "{}", date.format(DATE_FORMAT)),
            Self::List(items) => write!(f, "[{} item(s)]", items.len()),
        }
    }
}

/// Untyped answer as it arrives from a caller: a tag plus a JSON payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawAnswer {
    #[serde(rename = "type")]
    pub kind: String,
    pub value: Value,
}

impl RawAnswer {
    pub fn new(kind: impl Into<String>, value: Value) -> Self {
        Self {
            kind: kind.into(),
            value,
        }
    }
}

impl TryFrom<RawAnswer> for AnswerValue {
    type Error = ValueError;

    fn try_from(raw: RawAnswer) -> Result<Self, Self::Error> {
        let kind: ValueKind = raw.kind.parse()?;
        Self::from_json(kind, raw.value)
    }
}

impl From<AnswerValue> for RawAnswer {
    fn from(value: AnswerValue) -> Self {
        Self {
            kind: value.kind().as_str().to_owned(),
            value: value.to_json(),
        }
    }
}
