//! Value store: one typed answer per `(form, field_key)`.
//!
//! Each kind has its own nullable column and `value_kind` says which one is
//! populated. Decoding re-checks that pairing, so a row that breaks it
//! surfaces as `InvariantViolation` instead of a silently guessed value.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

use taxform_types::{
    Amount, Answer, AnswerValue, FieldKey, FormId, ItemFilter, ListItem, ListItemMatch, Operand,
    RawAnswer, ValueKind,
};

use crate::engine::{now, parse_column};
use crate::{EngineError, EntityRef, FormEngine, guard};

const ANSWER_COLUMNS: &str = "field_key, value_kind, boolean_value, text_value, numeric_cents,
    date_value, list_value, created_at, updated_at";

/// Column values for one answer; exactly one slot is `Some`.
#[derive(Default)]
struct Slots {
    boolean: Option<bool>,
    text: Option<String>,
    cents: Option<i64>,
    date: Option<NaiveDate>,
    list: Option<String>,
}

impl Slots {
    fn encode(value: &AnswerValue) -> Result<Self, EngineError> {
        let mut slots = Self::default();
        match value {
            AnswerValue::Boolean(b) => slots.boolean = Some(*b),
            AnswerValue::Text(text) => slots.text = Some(text.clone()),
            AnswerValue::Numeric(amount) => slots.cents = Some(amount.cents()),
            AnswerValue::Date(date) => slots.date = Some(*date),
            AnswerValue::List(items) => {
                let encoded = serde_json::to_string(items)
                    .map_err(|err| EngineError::InvalidInput(format!("list value: {err}")))?;
                slots.list = Some(encoded);
            }
        }
        Ok(slots)
    }

    fn populated(&self) -> usize {
        usize::from(self.boolean.is_some())
            + usize::from(self.text.is_some())
            + usize::from(self.cents.is_some())
            + usize::from(self.date.is_some())
            + usize::from(self.list.is_some())
    }

    fn decode(self, kind: ValueKind) -> Result<AnswerValue, String> {
        if self.populated() != 1 {
            return Err(format!("{} value columns populated", self.populated()));
        }
        match (kind, self) {
            (ValueKind::Boolean, Self { boolean: Some(b), .. }) => Ok(AnswerValue::Boolean(b)),
            (ValueKind::Text, Self { text: Some(text), .. }) => Ok(AnswerValue::Text(text)),
            (ValueKind::Numeric, Self { cents: Some(cents), .. }) => Amount::from_cents(cents)
                .map(AnswerValue::Numeric)
                .map_err(|err| err.to_string()),
            (ValueKind::Date, Self { date: Some(date), .. }) => Ok(AnswerValue::Date(date)),
            (ValueKind::List, Self { list: Some(raw), .. }) => {
                serde_json::from_str::<Vec<ListItem>>(&raw)
                    .map(AnswerValue::List)
                    .map_err(|err| format!("list_value is not an array of objects: {err}"))
            }
            (kind, _) => Err(format!("value_kind is {kind} but a different column is set")),
        }
    }
}

struct AnswerRow {
    field_key: String,
    value_kind: String,
    slots: Slots,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AnswerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            field_key: row.get(0)?,
            value_kind: row.get(1)?,
            slots: Slots {
                boolean: row.get(2)?,
                text: row.get(3)?,
                cents: row.get(4)?,
                date: row.get(5)?,
                list: row.get(6)?,
            },
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_answer(self, form_id: FormId) -> Result<Answer, EngineError> {
        let field_key: FieldKey = parse_column("answers.field_key", &self.field_key)?;
        let kind: ValueKind = parse_column("answers.value_kind", &self.value_kind)?;
        let value = self.slots.decode(kind).map_err(|reason| {
            EngineError::invariant(format!(
                "answer {field_key} on form {form_id}: {reason}"
            ))
        })?;
        Ok(Answer {
            form_id,
            field_key,
            value,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

fn load_answer(db: &Connection, form_id: &FormId, field_key: &FieldKey) -> Result<Answer, EngineError> {
    let row = db
        .query_row(
            &format!("SELECT {ANSWER_COLUMNS} FROM answers WHERE form_id = ?1 AND field_key = ?2"),
            params![form_id.to_string(), field_key.as_str()],
            AnswerRow::from_row,
        )
        .optional()?;
    row.ok_or_else(|| {
        EngineError::NotFound(EntityRef::Answer {
            form_id: *form_id,
            field_key: field_key.clone(),
        })
    })?
    .into_answer(*form_id)
}

fn collect_answers(
    db: &Connection,
    form_id: &FormId,
    sql: &str,
    args: &[&dyn rusqlite::ToSql],
) -> Result<Vec<Answer>, EngineError> {
    let mut stmt = db.prepare(sql)?;
    let rows = stmt.query_map(args, AnswerRow::from_row)?;
    let mut answers = Vec::new();
    for row in rows {
        answers.push(row?.into_answer(*form_id)?);
    }
    Ok(answers)
}

fn ensure_form(db: &Connection, form_id: &FormId) -> Result<(), EngineError> {
    guard::form_lock(db, form_id).map(|_| ())
}

/// Bind `filter` as a SQL predicate over `j.value`, pushing its parameters.
fn filter_predicate(filter: &ItemFilter, args: &mut Vec<SqlValue>) -> String {
    let path_idx = args.len() + 1;
    args.push(SqlValue::Text(filter.json_path()));
    let (Some(op), Some(operand)) = (filter.op().sql(), filter.operand()) else {
        return format!("json_type(j.value, ?{path_idx}) IS NOT NULL");
    };
    let types = operand
        .json_types()
        .iter()
        .map(|ty| format!("'{ty}'"))
        .collect::<Vec<_>>()
        .join(", ");
    let operand_idx = args.len() + 1;
    args.push(match operand {
        Operand::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Operand::Number(n) => SqlValue::Real(*n),
        Operand::Text(text) => SqlValue::Text(text.clone()),
    });
    format!(
        "json_type(j.value, ?{path_idx}) IN ({types}) \
         AND json_extract(j.value, ?{path_idx}) {op} ?{operand_idx}"
    )
}

impl FormEngine {
    /// Insert or replace an answer. Replacing keeps `created_at` and may
    /// change the value kind. Fails with `FormLocked` once the form is locked.
    pub fn upsert_answer(
        &self,
        form_id: &FormId,
        field_key: &FieldKey,
        value: &AnswerValue,
    ) -> Result<Answer, EngineError> {
        let slots = Slots::encode(value)?;
        let answer = self.write_idempotent("upsert_answer", |tx| {
            guard::check_answer_write(tx, form_id)?;
            tx.execute(
                "INSERT INTO answers
                 (form_id, field_key, value_kind, boolean_value, text_value, numeric_cents,
                  date_value, list_value, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT (form_id, field_key) DO UPDATE SET
                    value_kind = excluded.value_kind,
                    boolean_value = excluded.boolean_value,
                    text_value = excluded.text_value,
                    numeric_cents = excluded.numeric_cents,
                    date_value = excluded.date_value,
                    list_value = excluded.list_value,
                    updated_at = excluded.updated_at",
                params![
                    form_id.to_string(),
                    field_key.as_str(),
                    value.kind().as_str(),
                    slots.boolean,
                    slots.text,
                    slots.cents,
                    slots.date,
                    slots.list,
                    now()
                ],
            )?;
            load_answer(tx, form_id, field_key)
        })?;
        tracing::debug!(form_id = %form_id, field_key = %field_key, kind = %value.kind(), "Answer saved");
        Ok(answer)
    }

    /// [`Self::upsert_answer`] for an untyped `{type, value}` payload.
    /// Unknown tags and mismatched payloads fail with `UnsupportedValueType`.
    pub fn upsert_raw_answer(
        &self,
        form_id: &FormId,
        field_key: &FieldKey,
        raw: RawAnswer,
    ) -> Result<Answer, EngineError> {
        let value = AnswerValue::try_from(raw)?;
        self.upsert_answer(form_id, field_key, &value)
    }

    pub fn get_answer(&self, form_id: &FormId, field_key: &FieldKey) -> Result<Answer, EngineError> {
        self.read("get_answer", |db| load_answer(db, form_id, field_key))
    }

    /// Every answer on a form, ordered by key.
    pub fn list_answers(&self, form_id: &FormId) -> Result<Vec<Answer>, EngineError> {
        self.read("list_answers", |db| {
            ensure_form(db, form_id)?;
            collect_answers(
                db,
                form_id,
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM answers WHERE form_id = ?1 ORDER BY field_key"
                ),
                &[&form_id.to_string()],
            )
        })
    }

    /// Answers whose key is `prefix` itself or lies beneath it
    /// (`income` matches `income.wages`, not `incomes`).
    pub fn list_answers_with_prefix(
        &self,
        form_id: &FormId,
        prefix: &FieldKey,
    ) -> Result<Vec<Answer>, EngineError> {
        self.read("list_answers_with_prefix", |db| {
            ensure_form(db, form_id)?;
            collect_answers(
                db,
                form_id,
                &format!(
                    "SELECT {ANSWER_COLUMNS} FROM answers
                     WHERE form_id = ?1
                       AND (field_key = ?2 OR substr(field_key, 1, length(?2) + 1) = ?2 || '.')
                     ORDER BY field_key"
                ),
                &[&form_id.to_string(), &prefix.as_str()],
            )
        })
    }

    /// Remove one answer while the form is still a draft.
    pub fn delete_answer(&self, form_id: &FormId, field_key: &FieldKey) -> Result<(), EngineError> {
        self.write(|tx| {
            guard::check_answer_write(tx, form_id)?;
            let removed = tx.execute(
                "DELETE FROM answers WHERE form_id = ?1 AND field_key = ?2",
                params![form_id.to_string(), field_key.as_str()],
            )?;
            if removed == 0 {
                return Err(EngineError::NotFound(EntityRef::Answer {
                    form_id: *form_id,
                    field_key: field_key.clone(),
                }));
            }
            Ok(())
        })?;
        tracing::debug!(form_id = %form_id, field_key = %field_key, "Answer deleted");
        Ok(())
    }

    /// Find list items matching `filter` across a form's list answers, or
    /// within one answer when `field_key` is given. Items where the path is
    /// missing or holds a differently typed value never match a comparison.
    pub fn search_list_items(
        &self,
        form_id: &FormId,
        field_key: Option<&FieldKey>,
        filter: &ItemFilter,
    ) -> Result<Vec<ListItemMatch>, EngineError> {
        let mut args = vec![SqlValue::Text(form_id.to_string())];
        let mut sql = String::from(
            "SELECT a.field_key, j.key, j.value
             FROM answers a, json_each(a.list_value) j
             WHERE a.form_id = ?1 AND a.value_kind = 'list'",
        );
        if let Some(key) = field_key {
            args.push(SqlValue::Text(key.as_str().to_owned()));
            sql.push_str(&format!(" AND a.field_key = ?{}", args.len()));
        }
        let predicate = filter_predicate(filter, &mut args);
        sql.push_str(&format!(" AND {predicate} ORDER BY a.field_key, j.key"));

        self.read("search_list_items", |db| {
            ensure_form(db, form_id)?;
            let mut stmt = db.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                ))
            })?;
            let mut matches = Vec::new();
            for row in rows {
                let (key, index, item) = row?;
                let field_key: FieldKey = parse_column("answers.field_key", &key)?;
                let index = usize::try_from(index).map_err(|_err| {
                    EngineError::invariant(format!("negative list index {index} in {field_key}"))
                })?;
                let item: ListItem = serde_json::from_str(&item).map_err(|err| {
                    EngineError::invariant(format!("list item {index} of {field_key}: {err}"))
                })?;
                matches.push(ListItemMatch {
                    field_key,
                    index,
                    item,
                });
            }
            Ok(matches)
        })
    }
}
