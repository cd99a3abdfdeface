//! End-to-end form lifecycle: draft answers, submission, admin review.

use std::sync::Arc;

use taxform_store::{EngineError, FormEvent};
use taxform_types::{AnswerValue, FormStatus, SectionId, TransitionError};

use crate::common::{
    FailingNotifier, admin, draft, engine, filing, key, recording_engine, step, user,
};

#[test]
fn filing_moves_from_draft_to_approval() {
    let (engine, notifier) = recording_engine();
    let form = engine.create_form(&filing("F1"), &user()).unwrap();

    engine
        .upsert_answer(&form.id, &key("personalInfo.firstName"), &AnswerValue::text("Jane"))
        .unwrap();
    engine
        .upsert_answer(
            &form.id,
            &key("income.total"),
            &AnswerValue::numeric("50000.00").unwrap(),
        )
        .unwrap();

    let submitted = engine.submit(&form.id).unwrap();
    assert_eq!(submitted.status, FormStatus::Submitted);
    assert!(submitted.is_locked);

    let err = engine
        .upsert_answer(
            &form.id,
            &key("income.total"),
            &AnswerValue::numeric("1").unwrap(),
        )
        .unwrap_err();
    assert!(matches!(err, EngineError::FormLocked { form_id } if form_id == form.id));

    let under_review = engine
        .review(&form.id, &admin(), FormStatus::UnderReview, Some("checking W-2"))
        .unwrap();
    assert_eq!(under_review.status, FormStatus::UnderReview);

    let approved = engine
        .review(&form.id, &admin(), FormStatus::Approved, None)
        .unwrap();
    assert_eq!(approved.status, FormStatus::Approved);
    assert_eq!(approved.reviewed_by, Some(admin()));
    assert!(approved.is_locked);

    let income = engine.get_answer(&form.id, &key("income.total")).unwrap();
    assert_eq!(income.value, AnswerValue::numeric("50000").unwrap());

    let events = notifier.events();
    let names: Vec<&str> = events.iter().map(FormEvent::name).collect();
    assert_eq!(names, ["form_submitted", "form_reviewed", "form_reviewed"]);
}

#[test]
fn lock_flag_tracks_status_through_every_transition() {
    let engine = engine();
    let form = draft(&engine, "F1");
    assert_eq!(form.is_locked, form.status.is_locked());

    let mut states = vec![engine.submit(&form.id).unwrap()];
    for target in [
        FormStatus::UnderReview,
        FormStatus::Rejected,
        FormStatus::UnderReview,
        FormStatus::Approved,
    ] {
        states.push(engine.review(&form.id, &admin(), target, None).unwrap());
    }
    for state in states {
        assert!(state.lock_consistent());
        assert!(state.is_locked);
    }
}

#[test]
fn review_never_returns_to_draft_or_runs_before_submit() {
    let engine = engine();
    let form = draft(&engine, "F1");
    assert!(matches!(
        engine.review(&form.id, &admin(), FormStatus::Approved, None),
        Err(EngineError::InvalidTransition(TransitionError::NotSubmitted { .. }))
    ));

    engine.submit(&form.id).unwrap();
    assert!(matches!(
        engine.review(&form.id, &admin(), FormStatus::Draft, None),
        Err(EngineError::InvalidTransition(_))
    ));
    let form = engine.get_form(&form.id).unwrap();
    assert_eq!(form.status, FormStatus::Submitted);
    assert_eq!(form.reviewed_by, None);
}

#[test]
fn section_review_ignores_the_lock() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let section = SectionId::new("wages").unwrap();

    engine
        .mark_section_reviewed(&form.id, &step("income"), &section, &admin(), true, None)
        .unwrap();
    engine.submit(&form.id).unwrap();
    engine
        .review(&form.id, &admin(), FormStatus::UnderReview, Some("note"))
        .unwrap();
    let after = engine
        .mark_section_reviewed(
            &form.id,
            &step("income"),
            &section,
            &admin(),
            true,
            Some("matches W-2"),
        )
        .unwrap();
    assert_eq!(after.review_notes.as_deref(), Some("matches W-2"));
    assert_eq!(engine.list_sections(&form.id).unwrap().len(), 1);
}

#[test]
fn progress_is_frozen_after_submit() {
    let engine = engine();
    let form = draft(&engine, "F1");
    engine
        .update_progress(&form.id, 80, Some(&step("deductions")))
        .unwrap();
    engine.submit(&form.id).unwrap();
    assert!(matches!(
        engine.update_progress(&form.id, 100, None),
        Err(EngineError::FormLocked { .. })
    ));
    let form = engine.get_form(&form.id).unwrap();
    assert_eq!(form.completion_percentage, 80);
    assert_eq!(form.last_saved_step_id, Some(step("deductions")));
}

#[test]
fn notifier_failure_does_not_undo_submit() {
    let engine = engine().with_notifier(Arc::new(FailingNotifier));
    let form = draft(&engine, "F1");
    engine.submit(&form.id).unwrap();
    assert_eq!(engine.get_form(&form.id).unwrap().status, FormStatus::Submitted);
}

#[test]
fn deleting_the_filing_removes_answers_and_sections() {
    let engine = engine();
    let form = draft(&engine, "F1");
    engine
        .upsert_answer(&form.id, &key("a.b"), &AnswerValue::Boolean(true))
        .unwrap();
    engine
        .mark_section_reviewed(
            &form.id,
            &step("s"),
            &SectionId::new("x").unwrap(),
            &admin(),
            true,
            None,
        )
        .unwrap();
    engine.delete_filing(&filing("F1")).unwrap();

    assert!(matches!(
        engine.list_answers(&form.id),
        Err(EngineError::NotFound(_))
    ));
    assert!(matches!(
        engine.get_form_by_filing(&filing("F1")),
        Err(EngineError::NotFound(_))
    ));
}
