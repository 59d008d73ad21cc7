use std::time::{Duration, Instant};

use serde_json::json;

use super::*;

fn data() -> Data {
    match json!({"ok": true}) {
        serde_json::Value::Object(map) => map,
        _ => Data::new(),
    }
}

#[test]
fn take_returns_action_and_waiter_once() {
    let mut table = PendingTable::new();
    let (tx, _rx) = oneshot::channel();
    table.insert("r1".into(), Some(tx), ReplyAction::Claim { id: "e1".into() }, Instant::now());

    let (action, waiter) = table.take("r1").expect("entry");
    assert_eq!(action, ReplyAction::Claim { id: "e1".into() });
    assert!(waiter.is_some());
    assert!(table.take("r1").is_none());
    assert!(table.is_empty());
}

#[test]
fn take_unknown_id_is_none() {
    let mut table = PendingTable::new();
    assert!(table.take("nope").is_none());
}

#[tokio::test]
async fn duplicate_id_displaces_older_waiter_with_closed() {
    let mut table = PendingTable::new();
    let now = Instant::now();
    let (old_tx, old_rx) = oneshot::channel();
    let (new_tx, new_rx) = oneshot::channel();
    table.insert("r1".into(), Some(old_tx), ReplyAction::None, now);
    table.insert("r1".into(), Some(new_tx), ReplyAction::None, now);
    assert_eq!(table.len(), 1);

    assert!(matches!(old_rx.await, Ok(Err(ClientError::Closed))));

    let (_, waiter) = table.take("r1").expect("entry");
    deliver(waiter, Ok(data()));
    assert!(matches!(new_rx.await, Ok(Ok(_))));
}

#[tokio::test]
async fn expire_resolves_only_overdue_entries() {
    let mut table = PendingTable::new();
    let t0 = Instant::now();
    let (tx_old, rx_old) = oneshot::channel();
    let (tx_new, _rx_new) = oneshot::channel();
    table.insert("old".into(), Some(tx_old), ReplyAction::Claim { id: "e1".into() }, t0 + Duration::from_secs(1));
    table.insert("new".into(), Some(tx_new), ReplyAction::None, t0 + Duration::from_secs(5));

    assert!(table.expire_at(t0).is_empty());
    let expired = table.expire_at(t0 + Duration::from_secs(2));
    assert_eq!(expired, vec![ReplyAction::Claim { id: "e1".into() }]);
    assert!(matches!(rx_old.await, Ok(Err(ClientError::Timeout))));
    assert!(table.contains("new"));
    assert!(!table.contains("old"));
}

#[test]
fn next_deadline_is_earliest() {
    let mut table = PendingTable::new();
    let t0 = Instant::now();
    assert!(table.next_deadline().is_none());
    table.insert("a".into(), None, ReplyAction::None, t0 + Duration::from_secs(3));
    table.insert("b".into(), None, ReplyAction::None, t0 + Duration::from_secs(1));
    assert_eq!(table.next_deadline(), Some(t0 + Duration::from_secs(1)));
}

#[tokio::test]
async fn fail_all_closes_every_waiter() {
    let mut table = PendingTable::new();
    let now = Instant::now();
    let (tx, rx) = oneshot::channel();
    table.insert("a".into(), Some(tx), ReplyAction::Release { id: "e1".into() }, now);
    table.insert("b".into(), None, ReplyAction::None, now);

    let actions = table.fail_all();
    assert_eq!(actions.len(), 2);
    assert!(table.is_empty());
    assert!(matches!(rx.await, Ok(Err(ClientError::Closed))));
}

#[test]
fn deliver_to_dropped_receiver_is_harmless() {
    let (tx, rx) = oneshot::channel();
    drop(rx);
    deliver(Some(tx), Ok(data()));
    deliver(None, Err(ClientError::Timeout));
}
