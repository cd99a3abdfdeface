//! Shared test utilities and fixtures
//!
//! Common infrastructure for integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use taxform_store::{FormEngine, FormEvent, Notifier, NotifyError};
use taxform_types::{AdminId, FieldKey, FilingId, Form, StepId, UserId};

/// Notifier that keeps every event it receives, in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<FormEvent>>,
}

impl RecordingNotifier {
    pub fn events(&self) -> Vec<FormEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: &FormEvent) -> Result<(), NotifyError> {
        self.events.lock().unwrap().push(event.clone());
        Ok(())
    }
}

/// Notifier that always fails, to show failures never reach the caller.
pub struct FailingNotifier;

impl Notifier for FailingNotifier {
    fn notify(&self, _event: &FormEvent) -> Result<(), NotifyError> {
        Err(NotifyError("mail relay unreachable".into()))
    }
}

pub fn engine() -> FormEngine {
    FormEngine::open_in_memory().unwrap()
}

pub fn recording_engine() -> (FormEngine, Arc<RecordingNotifier>) {
    let notifier = Arc::new(RecordingNotifier::default());
    let engine = engine().with_notifier(notifier.clone());
    (engine, notifier)
}

pub fn filing(id: &str) -> FilingId {
    FilingId::new(id).unwrap()
}

pub fn user() -> UserId {
    UserId::new("user-1").unwrap()
}

pub fn admin() -> AdminId {
    AdminId::new("admin1").unwrap()
}

pub fn key(raw: &str) -> FieldKey {
    FieldKey::new(raw).unwrap()
}

pub fn step(raw: &str) -> StepId {
    StepId::new(raw).unwrap()
}

pub fn draft(engine: &FormEngine, filing_id: &str) -> Form {
    engine.create_form(&filing(filing_id), &user()).unwrap()
}
