//! Table layout for forms, answers, section progress and document bindings.
//!
//! The CHECK constraints restate the invariants the engine maintains so a
//! write that slipped past the guard still cannot persist a broken row:
//! - `is_locked` always equals `status <> 'draft'`
//! - one form per filing
//! - an answer populates exactly the value column named by `value_kind`

use anyhow::{Context, Result};
use rusqlite::Connection;

pub(crate) const SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS forms (
        id TEXT PRIMARY KEY,
        filing_id TEXT NOT NULL UNIQUE,
        user_id TEXT NOT NULL,
        status TEXT NOT NULL
            CHECK (status IN ('draft', 'submitted', 'under_review', 'approved', 'rejected')),
        is_locked INTEGER NOT NULL CHECK (is_locked = (status <> 'draft')),
        completion_percentage INTEGER NOT NULL DEFAULT 0
            CHECK (completion_percentage BETWEEN 0 AND 100),
        last_saved_step_id TEXT,
        submitted_at TEXT,
        reviewed_by TEXT,
        reviewed_at TEXT,
        review_notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS answers (
        form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
        field_key TEXT NOT NULL,
        value_kind TEXT NOT NULL
            CHECK (value_kind IN ('boolean', 'text', 'numeric', 'date', 'list')),
        boolean_value INTEGER CHECK (boolean_value IN (0, 1)),
        text_value TEXT,
        numeric_cents INTEGER,
        date_value TEXT,
        list_value TEXT CHECK (list_value IS NULL OR json_type(list_value) = 'array'),
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (form_id, field_key),
        CHECK (
            (boolean_value IS NOT NULL) + (text_value IS NOT NULL) + (numeric_cents IS NOT NULL)
            + (date_value IS NOT NULL) + (list_value IS NOT NULL) = 1
        ),
        CHECK (
            CASE value_kind
                WHEN 'boolean' THEN boolean_value IS NOT NULL
                WHEN 'text' THEN text_value IS NOT NULL
                WHEN 'numeric' THEN numeric_cents IS NOT NULL
                WHEN 'date' THEN date_value IS NOT NULL
                WHEN 'list' THEN list_value IS NOT NULL
            END
        )
    );

    CREATE TABLE IF NOT EXISTS section_progress (
        form_id TEXT NOT NULL REFERENCES forms(id) ON DELETE CASCADE,
        step_id TEXT NOT NULL,
        section_id TEXT NOT NULL,
        is_reviewed INTEGER NOT NULL DEFAULT 0,
        reviewed_by TEXT,
        reviewed_at TEXT,
        review_notes TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (form_id, step_id, section_id)
    );

    -- Documents only weakly reference their form: deleting a filing detaches them.
    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        file_name TEXT NOT NULL,
        form_id TEXT REFERENCES forms(id) ON DELETE SET NULL,
        question_key TEXT,
        is_approved INTEGER NOT NULL DEFAULT 0,
        approved_by TEXT,
        approved_at TEXT,
        rejection_reason TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        CHECK (is_approved = 0 OR (approved_by IS NOT NULL AND approved_at IS NOT NULL))
    );

    CREATE INDEX IF NOT EXISTS idx_forms_user
    ON forms(user_id);

    CREATE INDEX IF NOT EXISTS idx_answers_list
    ON answers(form_id) WHERE value_kind = 'list';

    CREATE INDEX IF NOT EXISTS idx_documents_form
    ON documents(form_id, question_key);
";

pub(crate) fn apply(db: &Connection) -> Result<()> {
    db.execute_batch(SCHEMA)
        .context("Failed to create form store schema")
}
