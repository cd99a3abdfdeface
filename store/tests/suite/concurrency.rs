//! Racing submits and writes, within one engine and across engines sharing
//! a database file.

use std::sync::{Arc, Barrier};
use std::thread;

use taxform_store::{EngineError, FormEngine};
use taxform_types::{AnswerValue, FormId, FormStatus, TransitionError};

use crate::common::{draft, engine, key};

const WORKERS: usize = 8;

fn assert_single_winner(results: Vec<Result<taxform_types::Form, EngineError>>) {
    let winners = results.iter().filter(|result| result.is_ok()).count();
    assert_eq!(winners, 1, "exactly one submit must win");
    for result in results {
        if let Err(err) = result {
            assert!(
                matches!(
                    err,
                    EngineError::InvalidTransition(TransitionError::NotDraft {
                        from: FormStatus::Submitted
                    })
                ),
                "unexpected error: {err}"
            );
        }
    }
}

#[test]
fn concurrent_submits_on_shared_engine_have_one_winner() {
    let engine = Arc::new(engine());
    let form_id = draft(&engine, "F1").id;
    let barrier = Arc::new(Barrier::new(WORKERS));

    let handles: Vec<_> = (0..WORKERS)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.submit(&form_id)
            })
        })
        .collect();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_single_winner(results);
    assert!(engine.get_form(&form_id).unwrap().is_locked);
}

#[test]
fn concurrent_submits_across_engines_have_one_winner() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("forms.db");
    let form_id = draft(&FormEngine::open(&path).unwrap(), "F1").id;

    let engines: Vec<_> = (0..WORKERS)
        .map(|_| FormEngine::open(&path).unwrap())
        .collect();
    let barrier = Arc::new(Barrier::new(WORKERS));
    let handles: Vec<_> = engines
        .into_iter()
        .map(|engine| {
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.submit(&form_id)
            })
        })
        .collect();
    let results = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert_single_winner(results);
    let reopened = FormEngine::open(&path).unwrap();
    assert_eq!(reopened.get_form(&form_id).unwrap().status, FormStatus::Submitted);
}

/// Writers racing a submit either land before the lock or see it; no answer
/// is ever written after `submitted_at`.
#[test]
fn writes_racing_submit_never_land_after_the_lock() {
    let engine = Arc::new(engine());
    let form_id: FormId = draft(&engine, "F1").id;
    let barrier = Arc::new(Barrier::new(WORKERS + 1));

    let writers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                let mut locked_out = false;
                for round in 0..20 {
                    let field = key(&format!("worker{worker}.round{round}"));
                    match engine.upsert_answer(&form_id, &field, &AnswerValue::Boolean(true)) {
                        Ok(_) => assert!(!locked_out, "write succeeded after FormLocked"),
                        Err(EngineError::FormLocked { .. }) => locked_out = true,
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
            })
        })
        .collect();

    barrier.wait();
    let submitted = engine.submit(&form_id).unwrap();
    for writer in writers {
        writer.join().unwrap();
    }

    let submitted_at = submitted.submitted_at.unwrap();
    for answer in engine.list_answers(&form_id).unwrap() {
        assert!(answer.updated_at <= submitted_at, "{} written after lock", answer.field_key);
    }
}
