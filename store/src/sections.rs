//! Per-section review flags. Independent of the form lock: admins mark
//! sections while reviewing a submitted form.

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, Row, params};

use taxform_types::{AdminId, FormId, SectionId, SectionProgress, StepId};

use crate::engine::{now, parse_column, parse_optional};
use crate::{EngineError, EntityRef, FormEngine, guard};

const SECTION_COLUMNS: &str = "step_id, section_id, is_reviewed, reviewed_by, reviewed_at,
    review_notes, created_at, updated_at";

struct SectionRow {
    step_id: String,
    section_id: String,
    is_reviewed: bool,
    reviewed_by: Option<String>,
    reviewed_at: Option<DateTime<Utc>>,
    review_notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl SectionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            step_id: row.get(0)?,
            section_id: row.get(1)?,
            is_reviewed: row.get(2)?,
            reviewed_by: row.get(3)?,
            reviewed_at: row.get(4)?,
            review_notes: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn into_progress(self, form_id: FormId) -> Result<SectionProgress, EngineError> {
        Ok(SectionProgress {
            form_id,
            step_id: parse_column("section_progress.step_id", &self.step_id)?,
            section_id: parse_column("section_progress.section_id", &self.section_id)?,
            is_reviewed: self.is_reviewed,
            reviewed_by: parse_optional("section_progress.reviewed_by", self.reviewed_by)?,
            reviewed_at: self.reviewed_at,
            review_notes: self.review_notes,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn load_section(
    db: &Connection,
    form_id: &FormId,
    step_id: &StepId,
    section_id: &SectionId,
) -> Result<SectionProgress, EngineError> {
    let row = db
        .query_row(
            &format!(
                "SELECT {SECTION_COLUMNS} FROM section_progress
                 WHERE form_id = ?1 AND step_id = ?2 AND section_id = ?3"
            ),
            params![form_id.to_string(), step_id.as_str(), section_id.as_str()],
            SectionRow::from_row,
        )
        .optional()?;
    row.ok_or_else(|| {
        EngineError::NotFound(EntityRef::Section {
            form_id: *form_id,
            step_id: step_id.clone(),
            section_id: section_id.clone(),
        })
    })?
    .into_progress(*form_id)
}

impl FormEngine {
    /// Create or update the review flag for one section. Marking a section
    /// un-reviewed clears `reviewed_at` but keeps the last reviewer.
    pub fn mark_section_reviewed(
        &self,
        form_id: &FormId,
        step_id: &StepId,
        section_id: &SectionId,
        admin_id: &AdminId,
        is_reviewed: bool,
        notes: Option<&str>,
    ) -> Result<SectionProgress, EngineError> {
        let progress = self.write_idempotent("mark_section_reviewed", |tx| {
            guard::form_lock(tx, form_id)?;
            let at = now();
            let reviewed_at = is_reviewed.then_some(at);
            tx.execute(
                "INSERT INTO section_progress
                 (form_id, step_id, section_id, is_reviewed, reviewed_by, reviewed_at,
                  review_notes, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                 ON CONFLICT (form_id, step_id, section_id) DO UPDATE SET
                    is_reviewed = excluded.is_reviewed,
                    reviewed_by = excluded.reviewed_by,
                    reviewed_at = excluded.reviewed_at,
                    review_notes = excluded.review_notes,
                    updated_at = excluded.updated_at",
                params![
                    form_id.to_string(),
                    step_id.as_str(),
                    section_id.as_str(),
                    is_reviewed,
                    admin_id.as_str(),
                    reviewed_at,
                    notes,
                    at
                ],
            )?;
            load_section(tx, form_id, step_id, section_id)
        })?;
        tracing::info!(
            form_id = %form_id,
            step_id = %step_id,
            section_id = %section_id,
            admin_id = %admin_id,
            is_reviewed,
            "Section review updated"
        );
        Ok(progress)
    }

    pub fn get_section(
        &self,
        form_id: &FormId,
        step_id: &StepId,
        section_id: &SectionId,
    ) -> Result<SectionProgress, EngineError> {
        self.read("get_section", |db| {
            load_section(db, form_id, step_id, section_id)
        })
    }

    pub fn list_sections(&self, form_id: &FormId) -> Result<Vec<SectionProgress>, EngineError> {
        self.read("list_sections", |db| {
            guard::form_lock(db, form_id)?;
            let mut stmt = db.prepare(&format!(
                "SELECT {SECTION_COLUMNS} FROM section_progress
                 WHERE form_id = ?1 ORDER BY step_id, section_id"
            ))?;
            let rows = stmt.query_map([form_id.to_string()], SectionRow::from_row)?;
            let mut sections = Vec::new();
            for row in rows {
                sections.push(row?.into_progress(*form_id)?);
            }
            Ok(sections)
        })
    }
}
