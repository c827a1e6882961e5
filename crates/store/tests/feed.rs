#![forbid(unsafe_code)]

use tideline_core::{Cursor, FeedItem};
use tideline_store::{feed_channel, FeedStore};

fn item(id: u64) -> FeedItem {
    FeedItem { id, author: Some(id % 7), body: format!("post {}", id), created_ts: 1_700_000_000 + id as i64 }
}

#[test]
fn page_appends_after_last_and_replaces_cursor() {
    // Scenario: cursor {before_id:100, more:true}; a page of 12 arrives with
    // new server-reported cursor fields.
    let mut store = FeedStore::with_initial(
        vec![item(150), item(120), item(100)],
        Cursor { before_id: Some(100), since_id: None, more: true },
    );

    let page: Vec<FeedItem> = (0..12).map(|n| item(99 - n)).collect();
    let appended = store.append_page(page);
    assert_eq!(appended, 12);
    assert_eq!(store.len(), 15);
    // append-only growth: existing prefix untouched, page after the last item
    assert_eq!(store.items()[0].id, 150);
    assert_eq!(store.items()[2].id, 100);
    assert_eq!(store.items()[3].id, 99);
    assert_eq!(store.items()[14].id, 88);

    store.set_cursor(Cursor { before_id: Some(88), since_id: Some(150), more: true });
    assert_eq!(store.cursor(), Cursor { before_id: Some(88), since_id: Some(150), more: true });
}

#[test]
fn duplicate_ids_in_page_are_skipped() {
    let mut store = FeedStore::with_initial(vec![item(100)], Cursor::default());
    let appended = store.append_page(vec![item(100), item(99)]);
    assert_eq!(appended, 1);
    assert_eq!(store.len(), 2);
    assert_eq!(store.items()[1].id, 99);
}

#[test]
fn live_insert_prepends() {
    let mut store = FeedStore::with_initial(vec![item(100), item(90)], Cursor::default());
    assert!(store.prepend_live(item(110)));
    assert_eq!(store.items()[0].id, 110);
    assert_eq!(store.items()[1].id, 100);
    // repeated push of the same item is a no-op
    assert!(!store.prepend_live(item(110)));
    assert_eq!(store.len(), 3);
}

#[test]
fn marker_attempt_confirm_and_rollback() {
    let mut store = FeedStore::new();
    store.init_marker(50);

    let prior = store.begin_marker_attempt(70);
    assert_eq!(prior, 50);
    assert_eq!(store.marker().acknowledged_id, 70);
    assert_eq!(store.marker().in_flight_id, Some(70));

    // failed sync, nothing superseded it: rollback applies
    assert!(store.rollback_marker(70, prior));
    assert_eq!(store.marker().acknowledged_id, 50);
    assert_eq!(store.marker().in_flight_id, None);
}

#[test]
fn rollback_does_not_clobber_newer_advancement() {
    let mut store = FeedStore::new();
    store.init_marker(50);

    let prior_a = store.begin_marker_attempt(70);
    // a newer attempt lands and is confirmed before the first one fails
    store.begin_marker_attempt(80);
    store.confirm_marker(80);
    assert_eq!(store.marker().acknowledged_id, 80);

    // stale failure for 70: acknowledged no longer equals the attempt
    assert!(!store.rollback_marker(70, prior_a));
    assert_eq!(store.marker().acknowledged_id, 80);
}

#[test]
fn stale_confirm_leaves_in_flight_untouched() {
    let mut store = FeedStore::new();
    store.init_marker(10);
    store.begin_marker_attempt(20);
    store.begin_marker_attempt(30);
    // late confirm for the superseded attempt
    store.confirm_marker(20);
    assert_eq!(store.marker().in_flight_id, Some(30));
    store.confirm_marker(30);
    assert_eq!(store.marker().in_flight_id, None);
}

#[test]
fn snapshots_swap_on_publish() {
    let mut store = FeedStore::with_initial(vec![item(100)], Cursor::default());
    let (publisher, handle) = feed_channel(&store);
    let first = handle.current();
    assert_eq!(first.items.len(), 1);

    store.append_page(vec![item(99)]);
    publisher.publish(&store);

    let second = handle.current();
    assert_eq!(second.items.len(), 2);
    assert!(second.epoch > first.epoch);
    assert_eq!(*handle.subscribe_epoch().borrow(), second.epoch);
    // earlier snapshot is unaffected by later publishes
    assert_eq!(first.items.len(), 1);
}
