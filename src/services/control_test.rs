use frames::EntityRecord;
use serde_json::json;

use super::*;
use crate::state::test_helpers::*;

fn claim_of(id: &str) -> ControlClaim {
    ControlClaim { id: id.into(), diagram_id: Some("1".into()) }
}

fn release_of(id: &str) -> ControlRelease {
    ControlRelease { id: id.into(), diagram_id: Some("1".into()) }
}

async fn stored(state: &AppState, id: &str) -> EntityRecord {
    let mut query = Data::new();
    query.insert("id".into(), json!(id));
    let doc = state
        .store
        .find_one(Collection::Entities, &query)
        .await
        .unwrap()
        .expect("stored entity");
    EntityRecord::from_data(&doc).unwrap()
}

#[tokio::test]
async fn first_claim_wins() {
    let state = test_app_state_with_entities(&[actor("e1")]);

    let a = claim(&state, "a", &claim_of("e1")).await;
    let b = claim(&state, "b", &claim_of("e1")).await;

    assert!(matches!(a, ClaimOutcome::Accepted { ref controller_id, .. } if controller_id == "a"));
    assert!(matches!(b, ClaimOutcome::Rejected { ref holder, .. } if holder == "a"));
    assert_eq!(state.controllers.read().await.len(), 1);
}

#[tokio::test]
async fn concurrent_claims_accept_exactly_one() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let state = state.clone();
            tokio::spawn(async move { claim(&state, &format!("c{i}"), &claim_of("e1")).await })
        })
        .collect();

    let mut accepted = 0;
    for task in tasks {
        if matches!(task.await.unwrap(), ClaimOutcome::Accepted { .. }) {
            accepted += 1;
        }
    }
    assert_eq!(accepted, 1);
}

#[tokio::test]
async fn reclaim_by_holder_is_accepted() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    claim(&state, "a", &claim_of("e1")).await;
    let again = claim(&state, "a", &claim_of("e1")).await;
    assert!(matches!(again, ClaimOutcome::Accepted { .. }));
}

#[tokio::test]
async fn claim_without_diagram_uses_default() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    let outcome = claim(&state, "a", &ControlClaim { id: "e1".into(), diagram_id: None }).await;
    assert_eq!(outcome.key(), &EntityKey::new("1", "e1"));
}

#[tokio::test]
async fn claim_persists_controller_fields() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    claim(&state, "a", &claim_of("e1")).await;

    let record = stored(&state, "e1").await;
    assert!(record.has_controller);
    assert_eq!(record.controller_id.as_deref(), Some("a"));
}

#[tokio::test]
async fn rejected_patch_names_the_holder() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    claim(&state, "a", &claim_of("e1")).await;
    let patch = claim(&state, "b", &claim_of("e1")).await.patch();

    assert_eq!(patch.has_controller, Some(true));
    assert_eq!(patch.controller_id.as_deref(), Some("a"));
    assert_eq!(patch.diagram_id.as_deref(), Some("1"));
}

#[tokio::test]
async fn only_holder_can_release() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    claim(&state, "a", &claim_of("e1")).await;

    assert!(release(&state, "b", &release_of("e1")).await.is_none());
    assert_eq!(release(&state, "a", &release_of("e1")).await, Some(EntityKey::new("1", "e1")));
    assert!(state.controllers.read().await.is_empty());

    let record = stored(&state, "e1").await;
    assert!(!record.has_controller);
    assert!(record.controller_id.is_none());
}

#[tokio::test]
async fn second_claim_releases_the_first() {
    let state = test_app_state_with_entities(&[actor("e1"), actor("e2")]);
    claim(&state, "a", &claim_of("e1")).await;

    let outcome = claim(&state, "a", &claim_of("e2")).await;
    let ClaimOutcome::Accepted { released, .. } = outcome else {
        panic!("expected accepted claim");
    };
    assert_eq!(released, vec![EntityKey::new("1", "e1")]);

    let controllers = state.controllers.read().await;
    assert_eq!(controllers.len(), 1);
    assert!(controllers.contains_key(&EntityKey::new("1", "e2")));
    drop(controllers);

    let first = stored(&state, "e1").await;
    assert!(!first.has_controller);
    assert!(first.controller_id.is_none());
}

#[tokio::test]
async fn rejected_claim_keeps_current_control() {
    let state = test_app_state_with_entities(&[actor("e1"), actor("e2")]);
    claim(&state, "a", &claim_of("e1")).await;
    claim(&state, "b", &claim_of("e2")).await;

    let outcome = claim(&state, "a", &claim_of("e2")).await;
    assert!(matches!(outcome, ClaimOutcome::Rejected { .. }));
    assert_eq!(
        state.controllers.read().await.get(&EntityKey::new("1", "e1")).map(|c| c.client_id.as_str()),
        Some("a")
    );
}

#[tokio::test]
async fn reclaim_releases_nothing() {
    let state = test_app_state_with_entities(&[actor("e1")]);
    claim(&state, "a", &claim_of("e1")).await;
    let again = claim(&state, "a", &claim_of("e1")).await;
    assert!(matches!(again, ClaimOutcome::Accepted { ref released, .. } if released.is_empty()));
}

#[tokio::test]
async fn release_all_frees_held_entities_of_one_client() {
    let state = test_app_state_with_entities(&[actor("e1"), actor("e2")]);
    claim(&state, "a", &claim_of("e1")).await;
    claim(&state, "b", &claim_of("e2")).await;

    let released = release_all(&state, "a").await;
    assert_eq!(released, vec![EntityKey::new("1", "e1")]);

    let controllers = state.controllers.read().await;
    assert_eq!(controllers.len(), 1);
    assert!(controllers.contains_key(&EntityKey::new("1", "e2")));
}

#[test]
fn released_patch_clears_controller() {
    let patch = released_patch(&EntityKey::new("1", "e1"));
    assert_eq!(patch.has_controller, Some(false));
    assert!(patch.controller_id.is_none());
}
