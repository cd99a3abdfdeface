//! Form lifecycle: draft creation, progress, submission and admin review.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use taxform_types::{AdminId, FilingId, Form, FormId, FormStatus, StepId, UserId};

use crate::engine::{now, parse_column, parse_optional};
use crate::guard::{self, FormField};
use crate::notify::FormEvent;
use crate::{EngineError, EntityRef, FormEngine};

const FORM_COLUMNS: &str = "id, filing_id, user_id, status, is_locked, completion_percentage,
    last_saved_step_id, submitted_at, reviewed_by, reviewed_at, review_notes, created_at, updated_at";

/// Raw `forms` row before domain decoding.
struct FormRow {
    id: String,
    filing_id: String,
    user_id: String,
    status: String,
    is_locked: bool,
    completion_percentage: i64,
    last_saved_step_id: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl FormRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            filing_id: row.get(1)?,
            user_id: row.get(2)?,
            status: row.get(3)?,
            is_locked: row.get(4)?,
            completion_percentage: row.get(5)?,
            last_saved_step_id: row.get(6)?,
            submitted_at: row.get(7)?,
            reviewed_by: row.get(8)?,
            reviewed_at: row.get(9)?,
            review_notes: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn into_form(self) -> Result<Form, EngineError> {
        let completion_percentage = u8::try_from(self.completion_percentage)
            .ok()
            .filter(|pct| *pct <= 100)
            .ok_or_else(|| {
                EngineError::invariant(format!(
                    "form {} has completion_percentage {}",
                    self.id, self.completion_percentage
                ))
            })?;
        let form = Form {
            id: parse_column("forms.id", &self.id)?,
            filing_id: parse_column("forms.filing_id", &self.filing_id)?,
            user_id: parse_column("forms.user_id", &self.user_id)?,
            status: parse_column("forms.status", &self.status)?,
            is_locked: self.is_locked,
            completion_percentage,
            last_saved_step_id: parse_optional("forms.last_saved_step_id", self.last_saved_step_id)?,
            submitted_at: self.submitted_at,
            reviewed_by: parse_optional("forms.reviewed_by", self.reviewed_by)?,
            reviewed_at: self.reviewed_at,
            review_notes: self.review_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        };
        if !form.lock_consistent() {
            return Err(EngineError::invariant(format!(
                "form {} has status {} but is_locked = {}",
                form.id, form.status, form.is_locked
            )));
        }
        Ok(form)
    }
}

pub(crate) fn load_form(db: &Connection, form_id: &FormId) -> Result<Form, EngineError> {
    let row = db
        .query_row(
            &format!("SELECT {FORM_COLUMNS} FROM forms WHERE id = ?1"),
            [form_id.to_string()],
            FormRow::from_row,
        )
        .optional()?;
    row.ok_or(EngineError::NotFound(EntityRef::Form(*form_id)))?
        .into_form()
}

fn find_form_by_filing(db: &Connection, filing_id: &FilingId) -> Result<Option<Form>, EngineError> {
    db.query_row(
        &format!("SELECT {FORM_COLUMNS} FROM forms WHERE filing_id = ?1"),
        [filing_id.as_str()],
        FormRow::from_row,
    )
    .optional()?
    .map(FormRow::into_form)
    .transpose()
}

impl FormEngine {
    /// Create the draft form for a filing. At most one form exists per filing.
    pub fn create_form(&self, filing_id: &FilingId, user_id: &UserId) -> Result<Form, EngineError> {
        let form = self.write(|tx| {
            if find_form_by_filing(tx, filing_id)?.is_some() {
                return Err(EngineError::AlreadyExists(EntityRef::Filing(
                    filing_id.clone(),
                )));
            }
            let id = FormId::generate();
            let at = now();
            tx.execute(
                "INSERT INTO forms (id, filing_id, user_id, status, is_locked, completion_percentage, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, 0, 0, ?5, ?5)",
                params![
                    id.to_string(),
                    filing_id.as_str(),
                    user_id.as_str(),
                    FormStatus::Draft.as_str(),
                    at
                ],
            )?;
            load_form(tx, &id)
        })?;
        tracing::info!(form_id = %form.id, filing_id = %filing_id, user_id = %user_id, "Form created");
        Ok(form)
    }

    pub fn get_form(&self, form_id: &FormId) -> Result<Form, EngineError> {
        self.read("get_form", |db| load_form(db, form_id))
    }

    pub fn get_form_by_filing(&self, filing_id: &FilingId) -> Result<Form, EngineError> {
        self.read("get_form_by_filing", |db| {
            find_form_by_filing(db, filing_id)?
                .ok_or_else(|| EngineError::NotFound(EntityRef::Filing(filing_id.clone())))
        })
    }

    /// All forms owned by a user, oldest first.
    pub fn list_forms_for_user(&self, user_id: &UserId) -> Result<Vec<Form>, EngineError> {
        self.read("list_forms_for_user", |db| {
            let mut stmt = db.prepare(&format!(
                "SELECT {FORM_COLUMNS} FROM forms WHERE user_id = ?1 ORDER BY created_at, id"
            ))?;
            let rows = stmt.query_map([user_id.as_str()], FormRow::from_row)?;
            let mut forms = Vec::new();
            for row in rows {
                forms.push(row?.into_form()?);
            }
            Ok(forms)
        })
    }

    /// Record the caller-computed completion and, optionally, the last saved
    /// step. Only allowed while the form is a draft.
    pub fn update_progress(
        &self,
        form_id: &FormId,
        percentage: u8,
        last_step_id: Option<&StepId>,
    ) -> Result<Form, EngineError> {
        if percentage > 100 {
            return Err(EngineError::InvalidInput(format!(
                "completion percentage must be between 0 and 100 (got {percentage})"
            )));
        }
        self.write(|tx| {
            let lock = guard::form_lock(tx, form_id)?;
            lock.permit(&[FormField::CompletionPercentage, FormField::LastSavedStepId])?;
            tx.execute(
                "UPDATE forms
                 SET completion_percentage = ?2,
                     last_saved_step_id = COALESCE(?3, last_saved_step_id),
                     updated_at = ?4
                 WHERE id = ?1",
                params![
                    form_id.to_string(),
                    percentage,
                    last_step_id.map(StepId::as_str),
                    now()
                ],
            )?;
            load_form(tx, form_id)
        })
    }

    /// `draft → submitted`, locking the form and its answers for good.
    ///
    /// Not idempotent: a second submit fails with `InvalidTransition`, and it
    /// is never retried automatically.
    pub fn submit(&self, form_id: &FormId) -> Result<Form, EngineError> {
        let form = self.write(|tx| {
            let lock = guard::form_lock(tx, form_id)?;
            let next = lock.status.submit()?;
            lock.permit(&[
                FormField::Status,
                FormField::IsLocked,
                FormField::SubmittedAt,
            ])?;
            let at = now();
            let changed = tx.execute(
                "UPDATE forms
                 SET status = ?2, is_locked = 1, submitted_at = ?3, updated_at = ?3
                 WHERE id = ?1 AND status = 'draft'",
                params![form_id.to_string(), next.as_str(), at],
            )?;
            if changed != 1 {
                return Err(EngineError::invariant(format!(
                    "submit of form {form_id} matched {changed} draft rows"
                )));
            }
            load_form(tx, form_id)
        })?;
        tracing::info!(form_id = %form.id, filing_id = %form.filing_id, "Form submitted");
        self.emit(FormEvent::FormSubmitted {
            form_id: form.id,
            filing_id: form.filing_id.clone(),
        });
        Ok(form)
    }

    /// Administrative status change on a submitted form. Touches only the
    /// review fields; the lock stays on.
    pub fn review(
        &self,
        form_id: &FormId,
        admin_id: &AdminId,
        new_status: FormStatus,
        notes: Option<&str>,
    ) -> Result<Form, EngineError> {
        let form = self.write(|tx| {
            let lock = guard::form_lock(tx, form_id)?;
            let next = lock.status.review(new_status)?;
            lock.permit(FormField::REVIEW_FIELDS)?;
            tx.execute(
                "UPDATE forms
                 SET status = ?2, reviewed_by = ?3, reviewed_at = ?4, review_notes = ?5, updated_at = ?4
                 WHERE id = ?1",
                params![
                    form_id.to_string(),
                    next.as_str(),
                    admin_id.as_str(),
                    now(),
                    notes
                ],
            )?;
            load_form(tx, form_id)
        })?;
        tracing::info!(
            form_id = %form.id,
            admin_id = %admin_id,
            status = %form.status,
            "Form reviewed"
        );
        self.emit(FormEvent::FormReviewed {
            form_id: form.id,
            admin_id: admin_id.clone(),
            status: form.status,
        });
        Ok(form)
    }

    /// Cascade from deleting the parent filing: removes the form with its
    /// answers and section rows, and detaches any bound documents.
    pub fn delete_filing(&self, filing_id: &FilingId) -> Result<FormId, EngineError> {
        let form_id = self.write(|tx| {
            let form = find_form_by_filing(tx, filing_id)?
                .ok_or_else(|| EngineError::NotFound(EntityRef::Filing(filing_id.clone())))?;
            tx.execute("DELETE FROM forms WHERE id = ?1", [form.id.to_string()])?;
            Ok(form.id)
        })?;
        tracing::info!(form_id = %form_id, filing_id = %filing_id, "Form deleted with its filing");
        Ok(form_id)
    }
}
