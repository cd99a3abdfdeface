use std::fmt;

use rusqlite::ErrorCode;
use thiserror::Error;

use taxform_types::{
    DocumentId, FieldKey, FilingId, FormId, SectionId, StepId, TransitionError, ValueError,
};

/// Names the row an error is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRef {
    Form(FormId),
    Filing(FilingId),
    Answer {
        form_id: FormId,
        field_key: FieldKey,
    },
    Section {
        form_id: FormId,
        step_id: StepId,
        section_id: SectionId,
    },
    Document(DocumentId),
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Form(id) => write!(f, "form {id}"),
            Self::Filing(id) => write!(f, "form for filing {id}"),
            Self::Answer { form_id, field_key } => {
                write!(f, "answer {field_key} on form {form_id}")
            }
            Self::Section {
                form_id,
                step_id,
                section_id,
            } => write!(f, "section {step_id}/{section_id} on form {form_id}"),
            Self::Document(id) => write!(f, "document {id}"),
        }
    }
}

/// Every outcome an engine operation can report besides success.
///
/// `FormLocked`, `InvalidTransition` and `ImmutableEntity` are terminal and
/// caller-correctable. Only `Storage` errors can be transient.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0} not found")]
    NotFound(EntityRef),
    #[error("{0} already exists")]
    AlreadyExists(EntityRef),
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
    #[error("form {form_id} is locked")]
    FormLocked { form_id: FormId },
    #[error("{0} is immutable")]
    ImmutableEntity(EntityRef),
    #[error("{0}")]
    UnsupportedValueType(ValueError),
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    /// Busy/locked database errors; the only class worth retrying.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Storage(rusqlite::Error::SqliteFailure(err, _))
                if matches!(err.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
        )
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}

impl From<ValueError> for EngineError {
    fn from(err: ValueError) -> Self {
        if err.is_unsupported_type() {
            Self::UnsupportedValueType(err)
        } else {
            Self::InvalidInput(err.to_string())
        }
    }
}
