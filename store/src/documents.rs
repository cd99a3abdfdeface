//! Document metadata bound to forms and questions.
//!
//! Bytes live with the external blob store; this table holds the binding and
//! the approval state. Approval freezes the row.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use taxform_types::{AdminId, Document, DocumentId, FieldKey, FormId, NewDocument};

use crate::engine::{now, parse_column, parse_optional};
use crate::notify::FormEvent;
use crate::{EngineError, EntityRef, FormEngine, guard};

const DOCUMENT_COLUMNS: &str = "id, user_id, file_name, form_id, question_key, is_approved,
    approved_by, approved_at, rejection_reason, created_at, updated_at";

struct DocumentRow {
    id: String,
    user_id: String,
    file_name: String,
    form_id: Option<String>,
    question_key: Option<String>,
    is_approved: bool,
    approved_by: Option<String>,
    approved_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DocumentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            file_name: row.get(2)?,
            form_id: row.get(3)?,
            question_key: row.get(4)?,
            is_approved: row.get(5)?,
            approved_by: row.get(6)?,
            approved_at: row.get(7)?,
            rejection_reason: row.get(8)?,
            created_at: row.get(9)?,
            updated_at: row.get(10)?,
        })
    }

    fn into_document(self) -> Result<Document, EngineError> {
        Ok(Document {
            id: parse_column("documents.id", &self.id)?,
            user_id: parse_column("documents.user_id", &self.user_id)?,
            file_name: self.file_name,
            form_id: parse_optional("documents.form_id", self.form_id)?,
            question_key: parse_optional("documents.question_key", self.question_key)?,
            is_approved: self.is_approved,
            approved_by: parse_optional("documents.approved_by", self.approved_by)?,
            approved_at: self.approved_at,
            rejection_reason: self.rejection_reason,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn load_document(db: &Connection, document_id: &DocumentId) -> Result<Document, EngineError> {
    let row = db
        .query_row(
            &format!("SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = ?1"),
            [document_id.to_string()],
            DocumentRow::from_row,
        )
        .optional()?;
    row.ok_or(EngineError::NotFound(EntityRef::Document(*document_id)))?
        .into_document()
}

fn validate_binding(
    db: &Connection,
    form_id: Option<&FormId>,
    question_key: Option<&FieldKey>,
) -> Result<(), EngineError> {
    match (form_id, question_key) {
        (Some(form_id), _) => guard::form_lock(db, form_id).map(|_| ()),
        (None, Some(key)) => Err(EngineError::InvalidInput(format!(
            "question key {key} given without a form"
        ))),
        (None, None) => Ok(()),
    }
}

impl FormEngine {
    /// Record an uploaded document's metadata, optionally bound to a form
    /// question. The form may already be locked.
    pub fn register_document(&self, new: &NewDocument) -> Result<Document, EngineError> {
        if new.file_name.trim().is_empty() {
            return Err(EngineError::InvalidInput("file name must not be empty".into()));
        }
        let document = self.write(|tx| {
            validate_binding(tx, new.form_id.as_ref(), new.question_key.as_ref())?;
            let id = DocumentId::generate();
            tx.execute(
                "INSERT INTO documents
                 (id, user_id, file_name, form_id, question_key, is_approved, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?6)",
                params![
                    id.to_string(),
                    new.user_id.as_str(),
                    new.file_name,
                    new.form_id.map(|form_id| form_id.to_string()),
                    new.question_key.as_ref().map(FieldKey::as_str),
                    now()
                ],
            )?;
            load_document(tx, &id)
        })?;
        tracing::info!(
            document_id = %document.id,
            user_id = %document.user_id,
            form_id = ?document.form_id,
            "Document registered"
        );
        Ok(document)
    }

    pub fn get_document(&self, document_id: &DocumentId) -> Result<Document, EngineError> {
        self.read("get_document", |db| load_document(db, document_id))
    }

    /// Documents bound to a form, grouped by question.
    pub fn list_documents(&self, form_id: &FormId) -> Result<Vec<Document>, EngineError> {
        self.read("list_documents", |db| {
            guard::form_lock(db, form_id)?;
            let mut stmt = db.prepare(&format!(
                "SELECT {DOCUMENT_COLUMNS} FROM documents
                 WHERE form_id = ?1 ORDER BY question_key, created_at, id"
            ))?;
            let rows = stmt.query_map([form_id.to_string()], DocumentRow::from_row)?;
            let mut documents = Vec::new();
            for row in rows {
                documents.push(row?.into_document()?);
            }
            Ok(documents)
        })
    }

    /// Move a document to another form question.
    pub fn bind_document(
        &self,
        document_id: &DocumentId,
        form_id: &FormId,
        question_key: &FieldKey,
    ) -> Result<Document, EngineError> {
        self.write(|tx| {
            guard::check_document_write(tx, document_id)?;
            validate_binding(tx, Some(form_id), Some(question_key))?;
            tx.execute(
                "UPDATE documents SET form_id = ?2, question_key = ?3, updated_at = ?4 WHERE id = ?1",
                params![
                    document_id.to_string(),
                    form_id.to_string(),
                    question_key.as_str(),
                    now()
                ],
            )?;
            load_document(tx, document_id)
        })
    }

    /// Approve a document. Afterwards every write to it fails with
    /// `ImmutableEntity`, a second approval included.
    pub fn approve_document(
        &self,
        document_id: &DocumentId,
        admin_id: &AdminId,
    ) -> Result<Document, EngineError> {
        let document = self.write(|tx| {
            guard::check_document_write(tx, document_id)?;
            tx.execute(
                "UPDATE documents
                 SET is_approved = 1, approved_by = ?2, approved_at = ?3,
                     rejection_reason = NULL, updated_at = ?3
                 WHERE id = ?1",
                params![document_id.to_string(), admin_id.as_str(), now()],
            )?;
            load_document(tx, document_id)
        })?;
        tracing::info!(document_id = %document_id, admin_id = %admin_id, "Document approved");
        self.emit(FormEvent::DocumentApproved {
            document_id: *document_id,
            admin_id: admin_id.clone(),
        });
        Ok(document)
    }

    /// Reject a document with a reason. A rejected document stays writable so
    /// the user can replace it and an admin can approve it later.
    pub fn reject_document(
        &self,
        document_id: &DocumentId,
        admin_id: &AdminId,
        reason: &str,
    ) -> Result<Document, EngineError> {
        let reason = reason.trim();
        if reason.is_empty() {
            return Err(EngineError::InvalidInput(
                "a rejection reason is required".into(),
            ));
        }
        let document = self.write(|tx| {
            guard::check_document_write(tx, document_id)?;
            tx.execute(
                "UPDATE documents
                 SET is_approved = 0, approved_by = ?2, approved_at = NULL,
                     rejection_reason = ?3, updated_at = ?4
                 WHERE id = ?1",
                params![document_id.to_string(), admin_id.as_str(), reason, now()],
            )?;
            load_document(tx, document_id)
        })?;
        tracing::info!(document_id = %document_id, admin_id = %admin_id, reason, "Document rejected");
        self.emit(FormEvent::DocumentRejected {
            document_id: *document_id,
            admin_id: admin_id.clone(),
            reason: reason.to_owned(),
        });
        Ok(document)
    }

    pub fn delete_document(&self, document_id: &DocumentId) -> Result<(), EngineError> {
        self.write(|tx| {
            guard::check_document_write(tx, document_id)?;
            tx.execute(
                "DELETE FROM documents WHERE id = ?1",
                [document_id.to_string()],
            )?;
            Ok(())
        })?;
        tracing::info!(document_id = %document_id, "Document deleted");
        Ok(())
    }
}
