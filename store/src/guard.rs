//! Immutability guard.
//!
//! Called at the start of every mutating transaction, before any write:
//! - Forms: once locked, only the review fields may change.
//! - Answers: writable only while the owning form is unlocked.
//! - Documents: nothing may change once the document is approved.
//!
//! The lock state is read through the caller's transaction, never through
//! a separate earlier read.

use rusqlite::{Connection, OptionalExtension};

use taxform_types::{DocumentId, FormId, FormStatus};

use crate::engine::parse_column;
use crate::{EngineError, EntityRef};

/// Form columns a mutation can touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormField {
    Status,
    IsLocked,
    CompletionPercentage,
    LastSavedStepId,
    SubmittedAt,
    ReviewedBy,
    ReviewedAt,
    ReviewNotes,
}

impl FormField {
    /// The only fields an admin may still write on a locked form.
    pub const REVIEW_FIELDS: &'static [FormField] = &[
        Self::Status,
        Self::ReviewedBy,
        Self::ReviewedAt,
        Self::ReviewNotes,
    ];

    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::IsLocked => "is_locked",
            Self::CompletionPercentage => "completion_percentage",
            Self::LastSavedStepId => "last_saved_step_id",
            Self::SubmittedAt => "submitted_at",
            Self::ReviewedBy => "reviewed_by",
            Self::ReviewedAt => "reviewed_at",
            Self::ReviewNotes => "review_notes",
        }
    }

    #[must_use]
    pub fn writable_when_locked(self) -> bool {
        Self::REVIEW_FIELDS.contains(&self)
    }
}

/// Lock state of a form as seen inside the current transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FormLock {
    pub form_id: FormId,
    pub status: FormStatus,
    pub is_locked: bool,
}

impl FormLock {
    /// Reject the mutation unless every touched field is allowed in the
    /// current lock state.
    pub fn permit(&self, fields: &[FormField]) -> Result<(), EngineError> {
        if !self.is_locked {
            return Ok(());
        }
        if let Some(field) = fields.iter().find(|field| !field.writable_when_locked()) {
            tracing::warn!(
                form_id = %self.form_id,
                field = field.column(),
                status = %self.status,
                "Rejected write to locked form"
            );
            return Err(EngineError::FormLocked {
                form_id: self.form_id,
            });
        }
        Ok(())
    }
}

/// Read a form's lock state. Fails with `NotFound` for unknown forms and
/// `InvariantViolation` if the stored flag disagrees with the status.
pub(crate) fn form_lock(db: &Connection, form_id: &FormId) -> Result<FormLock, EngineError> {
    let row: Option<(String, bool)> = db
        .query_row(
            "SELECT status, is_locked FROM forms WHERE id = ?1",
            [form_id.to_string()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;
    let (status, is_locked) = row.ok_or(EngineError::NotFound(EntityRef::Form(*form_id)))?;
    let status: FormStatus = parse_column("forms.status", &status)?;
    if is_locked != status.is_locked() {
        return Err(EngineError::invariant(format!(
            "form {form_id} has status {status} but is_locked = {is_locked}"
        )));
    }
    Ok(FormLock {
        form_id: *form_id,
        status,
        is_locked,
    })
}

/// Answers become fully read-only once their form is locked.
pub(crate) fn check_answer_write(db: &Connection, form_id: &FormId) -> Result<(), EngineError> {
    let lock = form_lock(db, form_id)?;
    if lock.is_locked {
        tracing::warn!(form_id = %form_id, status = %lock.status, "Rejected answer write on locked form");
        return Err(EngineError::FormLocked { form_id: *form_id });
    }
    Ok(())
}

/// Approved documents accept no further writes, approval fields included.
pub(crate) fn check_document_write(
    db: &Connection,
    document_id: &DocumentId,
) -> Result<(), EngineError> {
    let is_approved: Option<bool> = db
        .query_row(
            "SELECT is_approved FROM documents WHERE id = ?1",
            [document_id.to_string()],
            |row| row.get(0),
        )
        .optional()?;
    match is_approved {
        None => Err(EngineError::NotFound(EntityRef::Document(*document_id))),
        Some(true) => {
            tracing::warn!(document_id = %document_id, "Rejected write to approved document");
            Err(EngineError::ImmutableEntity(EntityRef::Document(
                *document_id,
            )))
        }
        Some(false) => Ok(()),
    }
}
