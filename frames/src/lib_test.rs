use serde_json::json;

use super::*;

fn object(value: serde_json::Value) -> Data {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("expected object, got {other}"),
    }
}

fn raw(text: &str) -> RawRequest {
    decode_request(text).expect("decode request")
}

// =============================================================================
// REQUESTS
// =============================================================================

#[test]
fn decode_request_accepts_legacy_request_id_spelling() {
    let req = raw(r#"{"type":"getAll","collection":"entities","data":{},"requestID":"r-1"}"#);
    assert_eq!(req.request_id.as_deref(), Some("r-1"));
}

#[test]
fn decode_request_defaults_missing_data_to_empty_object() {
    let req = raw(r#"{"type":"pauseLiveMotion"}"#);
    assert_eq!(req.data, json!({}));
    assert_eq!(Request::from_raw(&req).expect("typed"), Request::PauseLiveMotion);
}

#[test]
fn encode_request_omits_absent_optionals() {
    let req = RawRequest::new(RequestKind::StartLiveMotion, None, Data::new());
    let text = encode_request(&req).expect("encode");
    let value: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(value, json!({"type": "startLiveMotion", "data": {}}));
}

#[test]
fn assign_request_id_sets_and_returns_same_id() {
    let mut req = RawRequest::new(RequestKind::GetAll, Some(Collection::Entities), Data::new());
    let id = req.assign_request_id();
    assert_eq!(req.request_id.as_deref(), Some(id.as_str()));
}

#[test]
fn from_raw_rejects_unknown_type() {
    let err = Request::from_raw(&raw(r#"{"type":"bogus","data":{}}"#)).expect_err("unknown");
    assert_eq!(err, ProtocolError::UnknownType("bogus".into()));
}

#[test]
fn from_raw_rejects_unknown_collection() {
    let err = Request::from_raw(&raw(r#"{"type":"getAll","collection":"props","data":{}}"#)).expect_err("unknown");
    assert_eq!(err, ProtocolError::UnknownCollection("props".into()));
}

#[test]
fn from_raw_requires_collection_for_crud_verbs() {
    let err = Request::from_raw(&raw(r#"{"type":"update","data":{"id":"e1"}}"#)).expect_err("missing");
    assert!(matches!(err, ProtocolError::UnknownCollection(_)));
}

#[test]
fn from_raw_maps_both_player_verbs_to_claim() {
    for verb in ["newPlayer", "connectPlayer"] {
        let text = format!(r#"{{"type":"{verb}","data":{{"id":"e1","diagramID":"7"}}}}"#);
        let req = Request::from_raw(&raw(&text)).expect("typed");
        assert_eq!(
            req,
            Request::ClaimControl(ControlClaim { id: "e1".into(), diagram_id: Some("7".into()) })
        );
    }
}

#[test]
fn from_raw_remove_requires_id() {
    let err = Request::from_raw(&raw(r#"{"type":"remove","collection":"entities","data":{}}"#)).expect_err("missing");
    assert_eq!(err, ProtocolError::MissingField("id"));
}

#[test]
fn from_raw_subscribe_reads_diagram_id() {
    let req = Request::from_raw(&raw(r#"{"type":"subscribe","data":{"diagramId":"d1"}}"#)).expect("typed");
    assert_eq!(req, Request::Subscribe { diagram_id: "d1".into() });
}

#[test]
fn from_raw_rejects_non_object_data() {
    let err = Request::from_raw(&raw(r#"{"type":"getAll","collection":"users","data":[1]}"#)).expect_err("array");
    assert!(matches!(err, ProtocolError::InvalidPayload(_)));
}

#[test]
fn collection_parse_matches_wire_names() {
    for c in Collection::ALL {
        assert_eq!(c.as_str().parse::<Collection>().expect("parse"), c);
    }
}

// =============================================================================
// ENTITIES
// =============================================================================

#[test]
fn entity_record_accepts_minimal_shape() {
    let record = EntityRecord::from_data(&object(json!({
        "id": "e1", "diagramId": "1", "class": "actor",
        "posX": 0, "posY": 0, "angle": 0, "size": 1
    })))
    .expect("record");
    assert_eq!(record.draw_key(), "actor");
    assert!(!record.has_controller);
    assert!(record.color2.is_none());
}

#[test]
fn entity_record_serializes_camel_case_without_empty_color2() {
    let data = EntityRecord::new("e1", "1", "actor").to_data().expect("data");
    assert!(data.contains_key("posX"));
    assert!(data.contains_key("drawType"));
    assert!(!data.contains_key("color2"));
}

#[test]
fn patch_rejects_field_outside_whitelist() {
    let err = EntityPatch::from_data(&object(json!({"id": "e1", "screenX": 4}))).expect_err("whitelist");
    assert!(matches!(err, ProtocolError::InvalidPayload(msg) if msg.contains("screenX")));
}

#[test]
fn patch_requires_id() {
    assert!(EntityPatch::from_data(&object(json!({"posX": 1.0}))).is_err());
}

#[test]
fn patch_serializes_only_set_fields() {
    let data = EntityPatch::new("e1").with_position(1.0, 2.0).to_data().expect("data");
    assert_eq!(serde_json::Value::Object(data), json!({"id": "e1", "posX": 1.0, "posY": 2.0}));
}

#[test]
fn apply_reports_movement_only_for_projected_fields() {
    let mut record = EntityRecord::new("e1", "1", "actor");
    let mut rename = EntityPatch::new("e1");
    rename.name = Some("Hamlet".into());
    assert!(!record.apply(&rename));
    assert_eq!(record.name, "Hamlet");

    assert!(record.apply(&EntityPatch::new("e1").with_angle(1.5)));
    assert!(!record.apply(&EntityPatch::new("e1").with_angle(1.5)));
}

#[test]
fn apply_release_clears_controller_id() {
    let mut record = EntityRecord::new("e1", "1", "actor");
    record.apply(&EntityPatch::new("e1").with_controller(Some("c1".into())));
    assert!(record.has_controller);
    assert_eq!(record.controller_id.as_deref(), Some("c1"));

    record.apply(&EntityPatch::new("e1").with_controller(None));
    assert!(!record.has_controller);
    assert!(record.controller_id.is_none());
}

#[test]
fn strip_control_removes_controller_fields() {
    let mut patch = EntityPatch::new("e1").with_controller(Some("c1".into()));
    patch.strip_control();
    assert!(patch.has_controller.is_none());
    assert!(patch.controller_id.is_none());
    assert!(!patch.has_changes());
}

#[test]
fn has_changes_ignores_address_fields() {
    assert!(!EntityPatch::new("e1").with_diagram("1").has_changes());
    assert!(EntityPatch::new("e1").with_angle(0.5).has_changes());

    let mut renamed = EntityPatch::new("e1");
    renamed.name = Some("Lear".into());
    assert!(renamed.has_changes());
}

// =============================================================================
// SERVER MESSAGES
// =============================================================================

#[test]
fn reply_is_classified_by_request_id_even_with_type() {
    let text = encode_reply("r-9", object(json!({"added": true, "type": "entity_add"}))).expect("encode");
    match decode_server_message(&text).expect("decode") {
        ServerMessage::Reply { request_id, body } => {
            assert_eq!(request_id, "r-9");
            assert_eq!(body.get("added"), Some(&json!(true)));
            assert!(!body.contains_key(REQUEST_ID));
        }
        ServerMessage::Push(p) => panic!("expected reply, got {p:?}"),
    }
}

#[test]
fn push_round_trips_through_classifier() {
    let push = Push::EntityRemove(EntityRef { id: "e1".into(), diagram_id: Some("1".into()) });
    let text = encode_push(&push).expect("encode");
    assert_eq!(decode_server_message(&text).expect("decode"), ServerMessage::Push(push));
}

#[test]
fn push_wire_shape_is_type_and_data() {
    let text = encode_push(&Push::LiveMotion(LiveMotion { live: false })).expect("encode");
    let value: serde_json::Value = serde_json::from_str(&text).expect("json");
    assert_eq!(value, json!({"type": "live_motion", "data": {"live": false}}));
}

#[test]
fn unknown_push_type_is_reported() {
    let err = decode_server_message(r#"{"type":"weather","data":{}}"#).expect_err("unknown");
    assert!(matches!(err, CodecError::UnknownPushType(t) if t == "weather"));
}

#[test]
fn message_without_id_or_type_is_unclassified() {
    let err = decode_server_message(r#"{"data":{}}"#).expect_err("unclassified");
    assert!(matches!(err, CodecError::Unclassified));
}

#[test]
fn non_object_message_is_rejected() {
    assert!(matches!(decode_server_message("[1,2]"), Err(CodecError::NotAnObject)));
}

#[test]
fn push_diagram_scope_follows_payload() {
    let add = Push::EntityAdd(EntityRecord::new("e1", "d2", "actor"));
    assert_eq!(add.diagram_id(), Some("d2"));
    assert_eq!(Push::Connected(Welcome { client_id: "c".into() }).diagram_id(), None);
}

#[test]
fn known_types_cover_every_variant() {
    let samples = [
        Push::EntitiesSet(vec![]),
        Push::EntityAdd(EntityRecord::new("e", "d", "actor")),
        Push::EntityUpdate(EntityPatch::new("e")),
        Push::EntityRemove(EntityRef { id: "e".into(), diagram_id: None }),
        Push::UpdateEntities(vec![]),
        Push::Connected(Welcome { client_id: "c".into() }),
        Push::LiveMotion(LiveMotion { live: true }),
    ];
    for push in samples {
        assert!(Push::KNOWN_TYPES.contains(&push.kind()));
    }
}

#[test]
fn unique_id_has_time_and_random_parts() {
    let id = unique_id();
    let (time, random) = id.split_once('-').expect("dash");
    assert!(u128::from_str_radix(time, 16).is_ok());
    assert!(u32::from_str_radix(random, 16).is_ok());
    assert_ne!(unique_id(), unique_id());
}
