use frames::{Data, EntityRecord};
use serde_json::json;

use super::*;
use crate::state::test_helpers::*;

fn sample(value: Value) -> MotionSample {
    serde_json::from_value(value).unwrap()
}

async fn control(state: &AppState, id: &str, client_id: &str, remote_addr: Option<&str>) {
    state.controllers.write().await.insert(
        EntityKey::new("1", id),
        Controller { client_id: client_id.into(), remote_addr: remote_addr.map(str::to_owned) },
    );
}

async fn stored(state: &AppState, id: &str) -> EntityRecord {
    let mut query = Data::new();
    query.insert("id".into(), json!(id));
    let doc = state.store.find_one(Collection::Entities, &query).await.unwrap().unwrap();
    EntityRecord::from_data(&doc).unwrap()
}

#[test]
fn sample_accepts_numeric_channel_ids() {
    let parsed = sample(json!({"time": 1.5, "channels": [{"id": 384_327, "pos": {"x": 1}, "rot": {"y": 45}}]}));
    assert_eq!(parsed.channels[0].channel_id().as_deref(), Some("384327"));
    assert!((parsed.channels[0].pos.x - 1.0).abs() < f64::EPSILON);
}

#[test]
fn pose_maps_floor_plane_and_heading() {
    let channel = MotionChannel {
        id: json!("e1"),
        pos: Vector3 { x: 0.1, y: 9.0, z: 2.3 },
        rot: Vector3 { x: 0.0, y: 45.0, z: 0.0 },
    };
    let patch = pose_patch(&EntityKey::new("1", "e1"), &channel, 5.0);
    assert!((patch.pos_x.unwrap() - 0.5).abs() < 1e-9);
    assert!((patch.pos_y.unwrap() - 11.5).abs() < 1e-9);
    assert_eq!(patch.angle, Some(45.0));
    assert_eq!(patch.diagram_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn channel_id_selects_controlled_entity() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    control(&state, "e1", "a", None).await;
    let mut rx = seed_client(&state, "viewer", Some("1")).await;

    let applied = ingest(&state, &sample(json!({"channels": [{"id": "e1", "pos": {"x": 1, "z": 2}}]})), None).await;

    assert_eq!(applied.len(), 1);
    let Push::EntityUpdate(patch) = recv_push(&mut rx).await else {
        panic!("expected entity_update");
    };
    assert_eq!(patch.pos_x, Some(5.0));
    assert_eq!(patch.pos_y, Some(10.0));
    let record = stored(&state, "e1").await;
    assert!((record.pos_x - 5.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn source_address_falls_back_to_claimant() {
    let state = test_app_state_with_entities(&[actor("e1"), actor("e2")]);
    control(&state, "e2", "a", Some("10.0.0.7")).await;

    let applied = ingest(
        &state,
        &sample(json!({"channels": [{"id": "384327", "pos": {"x": 2}}]})),
        Some("10.0.0.7"),
    )
    .await;

    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].id, "e2");
}

#[tokio::test]
async fn uncontrolled_channels_are_ignored() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    let mut rx = seed_client(&state, "viewer", Some("1")).await;

    let applied = ingest(&state, &sample(json!({"channels": [{"id": "e1"}]})), Some("10.0.0.7")).await;

    assert!(applied.is_empty());
    assert_no_push(&mut rx).await;
}

#[tokio::test]
async fn paused_live_motion_drops_samples() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    control(&state, "e1", "a", None).await;
    state.set_live(false);

    let applied = ingest(&state, &sample(json!({"channels": [{"id": "e1", "pos": {"x": 1}}]})), None).await;

    assert!(applied.is_empty());
    let record = stored(&state, "e1").await;
    assert!(record.pos_x.abs() < f64::EPSILON);
}
