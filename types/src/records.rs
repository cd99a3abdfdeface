//! Snapshots of persisted rows, as returned to callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    AdminId, AnswerValue, DocumentId, FieldKey, FilingId, FormId, FormStatus, SectionId, StepId,
    UserId,
};

/// A structured tax form and its lifecycle metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Form {
    pub id: FormId,
    pub filing_id: FilingId,
    pub user_id: UserId,
    pub status: FormStatus,
    /// Stored alongside `status` for cheap guard checks; always equals
    /// `status.is_locked()`.
    pub is_locked: bool,
    /// Maintained by the caller; the engine never recomputes it.
    pub completion_percentage: u8,
    pub last_saved_step_id: Option<StepId>,
    pub submitted_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<AdminId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Form {
    /// Whether the persisted lock flag agrees with the status.
    #[must_use]
    pub fn lock_consistent(&self) -> bool {
        self.is_locked == self.status.is_locked()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub form_id: FormId,
    pub field_key: FieldKey,
    pub value: AnswerValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionProgress {
    pub form_id: FormId,
    pub step_id: StepId,
    pub section_id: SectionId,
    pub is_reviewed: bool,
    /// Last admin to change the review flag, kept when a section is un-reviewed.
    pub reviewed_by: Option<AdminId>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub review_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Metadata for an uploaded document. The bytes live in the blob store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub user_id: UserId,
    pub file_name: String,
    pub form_id: Option<FormId>,
    pub question_key: Option<FieldKey>,
    pub is_approved: bool,
    pub approved_by: Option<AdminId>,
    pub approved_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub user_id: UserId,
    pub file_name: String,
    pub form_id: Option<FormId>,
    pub question_key: Option<FieldKey>,
}

impl NewDocument {
    pub fn new(user_id: UserId, file_name: impl Into<String>) -> Self {
        Self {
            user_id,
            file_name: file_name.into(),
            form_id: None,
            question_key: None,
        }
    }

    pub fn for_question(mut self, form_id: FormId, question_key: FieldKey) -> Self {
        self.form_id = Some(form_id);
        self.question_key = Some(question_key);
        self
    }
}
