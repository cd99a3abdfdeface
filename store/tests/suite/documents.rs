//! Document binding and the approval freeze.

use taxform_store::{EngineError, EntityRef, FormEvent};
use taxform_types::NewDocument;

use crate::common::{admin, draft, key, recording_engine, user};

#[test]
fn approved_document_cannot_be_rejected() {
    let (engine, notifier) = recording_engine();
    let form = draft(&engine, "F1");
    let doc = engine
        .register_document(&NewDocument::new(user(), "w2.pdf").for_question(form.id, key("income.w2")))
        .unwrap();

    engine.approve_document(&doc.id, &admin()).unwrap();
    let err = engine
        .reject_document(&doc.id, &admin(), "reason")
        .unwrap_err();
    assert!(matches!(err, EngineError::ImmutableEntity(EntityRef::Document(id)) if id == doc.id));

    let stored = engine.get_document(&doc.id).unwrap();
    assert!(stored.is_approved);
    assert_eq!(stored.rejection_reason, None);
    assert_eq!(
        notifier.events(),
        vec![FormEvent::DocumentApproved {
            document_id: doc.id,
            admin_id: admin(),
        }]
    );
}

#[test]
fn admins_can_request_documents_after_submission() {
    let (engine, _) = recording_engine();
    let form = draft(&engine, "F1");
    engine.submit(&form.id).unwrap();

    let doc = engine
        .register_document(&NewDocument::new(user(), "1099.pdf").for_question(form.id, key("income.1099")))
        .unwrap();
    let rejected = engine
        .reject_document(&doc.id, &admin(), "page 2 missing")
        .unwrap();
    assert_eq!(rejected.rejection_reason.as_deref(), Some("page 2 missing"));
    engine.delete_document(&doc.id).unwrap();
    assert!(engine.list_documents(&form.id).unwrap().is_empty());
}
