//! Core domain types for the tax form engine.
//!
//! This crate contains pure domain types with no IO, no async, and minimal dependencies:
//! identifiers, the form status state machine, the answer value union and
//! row snapshots. Storage and guard enforcement live in `taxform-store`.

#![allow(clippy::missing_errors_doc)] // Result-returning functions are self-explanatory

mod field_key;
mod ids;
mod query;
mod records;
mod status;
mod value;

pub use field_key::{FieldKey, FieldKeyError, MAX_FIELD_KEY_LEN};
pub use ids::{
    AdminId, DocumentId, FilingId, FormId, IdError, MAX_ID_LEN, SectionId, StepId, UserId,
};
pub use query::{CompareOp, FilterError, ItemFilter, ListItemMatch, Operand};
pub use records::{Answer, Document, Form, NewDocument, SectionProgress};
pub use status::{EnumParseError, FormStatus, TransitionError};
pub use value::{AmountError, Amount, AnswerValue, ListItem, RawAnswer, ValueError, ValueKind};
