//! Subcommand definitions and dispatch onto [`FormEngine`].

use anyhow::{Result, bail};
use clap::{Args, Subcommand};
use serde::Serialize;
use serde_json::{Value, json};

use taxform_store::FormEngine;
use taxform_types::{
    AdminId, CompareOp, DocumentId, FieldKey, FilingId, FormId, FormStatus, ItemFilter,
    NewDocument, Operand, RawAnswer, SectionId, StepId, UserId, ValueKind,
};

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the draft form for a filing
    Create {
        #[arg(long)]
        filing: FilingId,
        #[arg(long)]
        user: UserId,
    },
    /// Show a form by id or by filing
    Show(FormSelector),
    /// List every form a user owns
    Forms {
        #[arg(long)]
        user: UserId,
    },
    /// Record completion percentage and the last saved step
    Progress {
        #[arg(long)]
        form: FormId,
        #[arg(long, value_parser = clap::value_parser!(u8).range(0..=100))]
        percent: u8,
        #[arg(long)]
        step: Option<StepId>,
    },
    /// Submit a draft form, locking it
    Submit {
        #[arg(long)]
        form: FormId,
    },
    /// Move a submitted form through admin review
    Review {
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        admin: AdminId,
        /// under_review, approved or rejected
        #[arg(long)]
        status: FormStatus,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Read and write answers
    #[command(subcommand)]
    Answer(AnswerCommand),
    /// Section review flags
    #[command(subcommand)]
    Section(SectionCommand),
    /// Document bindings and approval
    #[command(subcommand)]
    Document(DocumentCommand),
    /// Delete the form belonging to a filing, with its answers and sections
    DeleteFiling {
        #[arg(long)]
        filing: FilingId,
    },
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
pub struct FormSelector {
    #[arg(long)]
    form: Option<FormId>,
    #[arg(long)]
    filing: Option<FilingId>,
}

#[derive(Subcommand, Debug)]
pub enum AnswerCommand {
    /// Insert or replace an answer
    Set {
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        key: FieldKey,
        /// boolean, text, numeric, date or list
        #[arg(long = "type")]
        kind: String,
        /// Taken verbatim for text and date; JSON for the other kinds
        #[arg(long)]
        value: String,
    },
    Get {
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        key: FieldKey,
    },
    Delete {
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        key: FieldKey,
    },
    /// List answers, optionally only those under a dotted prefix
    List {
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        prefix: Option<FieldKey>,
    },
    /// Find list items where `path op value` holds
    Search {
        #[arg(long)]
        form: FormId,
        /// Restrict the search to one list answer
        #[arg(long)]
        key: Option<FieldKey>,
        /// Dotted path inside each item, e.g. `qty`
        #[arg(long)]
        path: String,
        /// eq, ne, gt, gte, lt, lte or exists
        #[arg(long, default_value = "exists")]
        op: CompareOp,
        /// JSON operand; input that is not valid JSON is taken as a string
        #[arg(long)]
        value: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
pub enum SectionCommand {
    /// Mark a section reviewed, or un-reviewed with --unreview
    Mark {
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        step: StepId,
        #[arg(long)]
        section: SectionId,
        #[arg(long)]
        admin: AdminId,
        #[arg(long)]
        unreview: bool,
        #[arg(long)]
        notes: Option<String>,
    },
    List {
        #[arg(long)]
        form: FormId,
    },
}

#[derive(Subcommand, Debug)]
pub enum DocumentCommand {
    /// Record an uploaded document, optionally bound to a form question
    Register {
        #[arg(long)]
        user: UserId,
        #[arg(long)]
        file: String,
        #[arg(long, requires = "key")]
        form: Option<FormId>,
        #[arg(long, requires = "form")]
        key: Option<FieldKey>,
    },
    Bind {
        #[arg(long)]
        document: DocumentId,
        #[arg(long)]
        form: FormId,
        #[arg(long)]
        key: FieldKey,
    },
    Approve {
        #[arg(long)]
        document: DocumentId,
        #[arg(long)]
        admin: AdminId,
    },
    Reject {
        #[arg(long)]
        document: DocumentId,
        #[arg(long)]
        admin: AdminId,
        #[arg(long)]
        reason: String,
    },
    List {
        #[arg(long)]
        form: FormId,
    },
    Get {
        #[arg(long)]
        document: DocumentId,
    },
    Delete {
        #[arg(long)]
        document: DocumentId,
    },
}

/// Parse user input as JSON, falling back to a plain string.
fn json_arg(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()))
}

/// Text and date payloads are strings as typed; other kinds are read as JSON.
fn answer_payload(kind: &str, raw: String) -> Value {
    match kind.parse::<ValueKind>() {
        Ok(ValueKind::Text | ValueKind::Date) => Value::String(raw),
        _ => json_arg(&raw),
    }
}

fn to_output(value: impl Serialize) -> Result<Value> {
    Ok(serde_json::to_value(value)?)
}

pub fn run(engine: &FormEngine, command: Command) -> Result<Value> {
    match command {
        Command::Create { filing, user } => to_output(engine.create_form(&filing, &user)?),
        Command::Show(FormSelector { form, filing }) => match (form, filing) {
            (Some(form), _) => to_output(engine.get_form(&form)?),
            (None, Some(filing)) => to_output(engine.get_form_by_filing(&filing)?),
            (None, None) => bail!("pass --form or --filing"),
        },
        Command::Forms { user } => to_output(engine.list_forms_for_user(&user)?),
        Command::Progress {
            form,
            percent,
            step,
        } => to_output(engine.update_progress(&form, percent, step.as_ref())?),
        Command::Submit { form } => to_output(engine.submit(&form)?),
        Command::Review {
            form,
            admin,
            status,
            notes,
        } => to_output(engine.review(&form, &admin, status, notes.as_deref())?),
        Command::Answer(command) => run_answer(engine, command),
        Command::Section(command) => run_section(engine, command),
        Command::Document(command) => run_document(engine, command),
        Command::DeleteFiling { filing } => {
            let form_id = engine.delete_filing(&filing)?;
            Ok(json!({ "deleted_form": form_id }))
        }
    }
}

fn run_answer(engine: &FormEngine, command: AnswerCommand) -> Result<Value> {
    match command {
        AnswerCommand::Set {
            form,
            key,
            kind,
            value,
        } => {
            let payload = answer_payload(&kind, value);
            let raw = RawAnswer::new(kind, payload);
            to_output(engine.upsert_raw_answer(&form, &key, raw)?)
        }
        AnswerCommand::Get { form, key } => to_output(engine.get_answer(&form, &key)?),
        AnswerCommand::Delete { form, key } => {
            engine.delete_answer(&form, &key)?;
            Ok(json!({ "deleted": key }))
        }
        AnswerCommand::List { form, prefix } => match prefix {
            Some(prefix) => to_output(engine.list_answers_with_prefix(&form, &prefix)?),
            None => to_output(engine.list_answers(&form)?),
        },
        AnswerCommand::Search {
            form,
            key,
            path,
            op,
            value,
        } => {
            let operand = value
                .as_deref()
                .map(|raw| Operand::from_json(&json_arg(raw)))
                .transpose()?;
            let filter = ItemFilter::new(&path, op, operand)?;
            to_output(engine.search_list_items(&form, key.as_ref(), &filter)?)
        }
    }
}

fn run_section(engine: &FormEngine, command: SectionCommand) -> Result<Value> {
    match command {
        SectionCommand::Mark {
            form,
            step,
            section,
            admin,
            unreview,
            notes,
        } => to_output(engine.mark_section_reviewed(
            &form,
            &step,
            &section,
            &admin,
            !unreview,
            notes.as_deref(),
        )?),
        SectionCommand::List { form } => to_output(engine.list_sections(&form)?),
    }
}

fn run_document(engine: &FormEngine, command: DocumentCommand) -> Result<Value> {
    match command {
        DocumentCommand::Register {
            user,
            file,
            form,
            key,
        } => {
            let mut new = NewDocument::new(user, file);
            if let (Some(form), Some(key)) = (form, key) {
                new = new.for_question(form, key);
            }
            to_output(engine.register_document(&new)?)
        }
        DocumentCommand::Bind {
            document,
            form,
            key,
        } => to_output(engine.bind_document(&document, &form, &key)?),
        DocumentCommand::Approve { document, admin } => {
            to_output(engine.approve_document(&document, &admin)?)
        }
        DocumentCommand::Reject {
            document,
            admin,
            reason,
        } => to_output(engine.reject_document(&document, &admin, &reason)?),
        DocumentCommand::List { form } => to_output(engine.list_documents(&form)?),
        DocumentCommand::Get { document } => to_output(engine.get_document(&document)?),
        DocumentCommand::Delete { document } => {
            engine.delete_document(&document)?;
            Ok(json!({ "deleted": document }))
        }
    }
}
