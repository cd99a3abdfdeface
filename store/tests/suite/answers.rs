//! Value store behavior seen through the public engine API.

use serde_json::json;
use taxform_store::{EngineError, EntityRef};
use taxform_types::{AnswerValue, ItemFilter, RawAnswer, SectionId, ValueKind};

use crate::common::{admin, draft, engine, key, step};

#[test]
fn repeated_upsert_is_idempotent() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let value = AnswerValue::date("1990-04-15").unwrap();
    let first = engine
        .upsert_answer(&form.id, &key("personalInfo.dob"), &value)
        .unwrap();
    let second = engine
        .upsert_answer(&form.id, &key("personalInfo.dob"), &value)
        .unwrap();
    assert_eq!(first.value, second.value);
    assert_eq!(first.created_at, second.created_at);
    assert_eq!(engine.list_answers(&form.id).unwrap(), vec![second]);
}

#[test]
fn list_upsert_replaces_instead_of_appending() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let children = key("children");
    engine
        .upsert_answer(
            &form.id,
            &children,
            &AnswerValue::list(vec![json!({"name": "Bob"})]).unwrap(),
        )
        .unwrap();
    engine
        .upsert_answer(
            &form.id,
            &children,
            &AnswerValue::list(vec![json!({"name": "Bob"}), json!({"name": "Sue"})]).unwrap(),
        )
        .unwrap();

    let answers = engine.list_answers(&form.id).unwrap();
    assert_eq!(answers.len(), 1);
    assert_eq!(answers[0].value.as_list().map(<[_]>::len), Some(2));
}

#[test]
fn every_key_is_frozen_after_submit() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let keys: Vec<_> = (0..25).map(|idx| key(&format!("schedule.line{idx}"))).collect();
    for (idx, field) in keys.iter().enumerate() {
        let amount = AnswerValue::numeric(&idx.to_string()).unwrap();
        engine.upsert_answer(&form.id, field, &amount).unwrap();
    }
    engine.submit(&form.id).unwrap();

    let unwritten = key("never.written");
    for field in keys.iter().chain([&unwritten]) {
        assert!(matches!(
            engine.upsert_answer(&form.id, field, &AnswerValue::Boolean(true)),
            Err(EngineError::FormLocked { .. })
        ));
        assert!(matches!(
            engine.delete_answer(&form.id, field),
            Err(EngineError::FormLocked { .. })
        ));
    }
    assert_eq!(engine.list_answers(&form.id).unwrap().len(), keys.len());
}

#[test]
fn each_stored_row_has_exactly_its_declared_kind() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let field = key("mixed");
    let sequence = [
        RawAnswer::new("boolean", json!(true)),
        RawAnswer::new("text", json!("yes")),
        RawAnswer::new("numeric", json!(12.345)),
        RawAnswer::new("date", json!("2024-01-31")),
        RawAnswer::new("list", json!([{"a": 1}])),
        RawAnswer::new("boolean", json!(false)),
    ];
    for raw in sequence {
        let expected: ValueKind = raw.kind.parse().unwrap();
        let saved = engine.upsert_raw_answer(&form.id, &field, raw).unwrap();
        assert_eq!(saved.value.kind(), expected);
        assert_eq!(engine.get_answer(&form.id, &field).unwrap().value, saved.value);
    }
    assert_eq!(
        engine.get_answer(&form.id, &field).unwrap().value,
        AnswerValue::Boolean(false)
    );
}

#[test]
fn numeric_input_rounds_to_cents() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let saved = engine
        .upsert_raw_answer(&form.id, &key("income.total"), RawAnswer::new("numeric", json!(12.345)))
        .unwrap();
    assert_eq!(saved.value.to_string(), "12.35");
}

#[test]
fn unknown_tag_is_reported_as_unsupported_type() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let err = engine
        .upsert_raw_answer(&form.id, &key("x"), RawAnswer::new("binary", json!("AAE=")))
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedValueType(_)));
    assert!(engine.list_answers(&form.id).unwrap().is_empty());
}

#[test]
fn missing_answer_names_the_key() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let err = engine.get_answer(&form.id, &key("nope")).unwrap_err();
    assert!(matches!(
        &err,
        EngineError::NotFound(EntityRef::Answer { field_key, .. }) if field_key.as_str() == "nope"
    ));
    assert!(err.to_string().contains("nope"));
}

#[test]
fn list_search_finds_items_across_answers() {
    let engine = engine();
    let form = draft(&engine, "F1");
    engine
        .upsert_answer(
            &form.id,
            &key("dependents"),
            &AnswerValue::list(vec![
                json!({"name": "Bob", "age": 7}),
                json!({"name": "Sue", "age": 17}),
            ])
            .unwrap(),
        )
        .unwrap();
    engine
        .upsert_answer(&form.id, &key("age"), &AnswerValue::numeric("40").unwrap())
        .unwrap();

    let teens = ItemFilter::greater_than("age", 12.0).unwrap();
    let found = engine.search_list_items(&form.id, None, &teens).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].field_key, key("dependents"));
    assert_eq!(found[0].index, 1);
    assert_eq!(found[0].item.get("name"), Some(&json!("Sue")));
}

#[test]
fn taxonomy_keys_with_spaces_and_slashes_round_trip() {
    let engine = engine();
    let form = draft(&engine, "F1");
    let first_name = key("personal info.first name");
    let box1 = key("income/w2.box1");
    let box1_value = AnswerValue::numeric("50000.00").unwrap();
    engine
        .upsert_answer(&form.id, &first_name, &AnswerValue::text("Jane"))
        .unwrap();
    engine.upsert_answer(&form.id, &box1, &box1_value).unwrap();

    let personal = engine
        .list_answers_with_prefix(&form.id, &key("personal info"))
        .unwrap();
    assert_eq!(personal.len(), 1);
    assert_eq!(personal[0].field_key, first_name);
    assert_eq!(engine.get_answer(&form.id, &box1).unwrap().value, box1_value);

    let section = engine
        .mark_section_reviewed(
            &form.id,
            &step("Personal Info"),
            &SectionId::new("Rental Income").unwrap(),
            &admin(),
            true,
            None,
        )
        .unwrap();
    assert_eq!(section.section_id.as_str(), "Rental Income");
    assert_eq!(section.step_id.as_str(), "Personal Info");
}
