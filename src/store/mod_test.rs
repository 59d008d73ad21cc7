use serde_json::json;

use super::*;

fn object(value: Value) -> Data {
    match value {
        Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

#[test]
fn key_matches_id_and_optional_diagram() {
    let doc = object(json!({"id": "e1", "diagramId": "1"}));
    assert!(DocKey::new("e1", None).matches(&doc));
    assert!(DocKey::new("e1", Some("1".into())).matches(&doc));
    assert!(!DocKey::new("e1", Some("2".into())).matches(&doc));
    assert!(!DocKey::new("e2", None).matches(&doc));
}

#[test]
fn key_accepts_legacy_diagram_spelling() {
    let doc = object(json!({"id": "e1", "diagramID": "7"}));
    assert_eq!(DocKey::of(&doc), Some(DocKey::new("e1", Some("7".into()))));
}

#[test]
fn query_requires_every_field_equal() {
    let doc = object(json!({"id": "u1", "name": "Jane", "password": "pw"}));
    assert!(matches_query(&doc, &object(json!({"name": "Jane"}))));
    assert!(matches_query(&doc, &Data::new()));
    assert!(!matches_query(&doc, &object(json!({"name": "Jane", "password": "x"}))));
}

#[test]
fn ensure_id_keeps_existing_and_fills_missing() {
    let mut with_id = object(json!({"id": "keep"}));
    assert_eq!(ensure_id(&mut with_id), "keep");

    let mut blank = object(json!({"id": ""}));
    let id = ensure_id(&mut blank);
    assert!(!id.is_empty());
    assert_eq!(blank.get("id").and_then(Value::as_str), Some(id.as_str()));
}

#[test]
fn database_errors_are_retryable() {
    let dup = StoreError::Duplicate { collection: Collection::Entities, id: "e1".into() };
    assert_eq!(dup.error_code(), "E_DUPLICATE_ID");
    assert!(!dup.retryable());
    assert!(StoreError::Database(sqlx::Error::PoolTimedOut).retryable());
}
