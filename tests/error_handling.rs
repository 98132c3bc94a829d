//! Error handling and edge case tests.

use poolsync::{
    ChangeFeed, FeedConfig, ItemId, LiveCollection, LiveCollectionConfig, MemoryTable, Phase,
    StaticCredentials, SyncError, Transaction, TransactionType,
};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const WAIT: Duration = Duration::from_secs(5);

fn setup_with(config: FeedConfig) -> (Arc<ChangeFeed>, Arc<MemoryTable<Transaction>>) {
    let feed = Arc::new(ChangeFeed::new(config));
    feed.connect();
    let table = Arc::new(MemoryTable::new("public", "transactions").with_feed(Arc::clone(&feed)));
    (feed, table)
}

fn setup() -> (Arc<ChangeFeed>, Arc<MemoryTable<Transaction>>) {
    setup_with(FeedConfig::default())
}

fn open(
    feed: &Arc<ChangeFeed>,
    table: &Arc<MemoryTable<Transaction>>,
    config: LiveCollectionConfig,
) -> LiveCollection<Transaction> {
    LiveCollection::<Transaction>::open(
        config,
        Arc::clone(table) as _,
        Arc::clone(feed),
        Arc::new(StaticCredentials::new("token")),
    )
    .unwrap()
}

fn wait_for_channel(feed: &ChangeFeed) {
    let deadline = Instant::now() + WAIT;
    while feed.channel_count() == 0 {
        assert!(Instant::now() < deadline, "channel never opened");
        thread::sleep(Duration::from_millis(5));
    }
}

fn tx(id: i64) -> Transaction {
    Transaction::new(id, "pool", TransactionType::Deposit)
}

// --- Load Errors ---

#[test]
fn test_load_failure() {
    let (feed, table) = setup();
    table.insert(tx(1)).unwrap();
    table.fail_next_fetches(1, "connection refused");

    let live = open(&feed, &table, LiveCollectionConfig::new("pool").with_live_updates(false));
    let snapshot = live.wait_for(|s| !s.loading(), WAIT).unwrap();

    assert!(snapshot.items.is_empty());
    assert_eq!(
        snapshot.error,
        Some(SyncError::Fetch("connection refused".into()))
    );
    assert_eq!(live.phase(), Phase::ReadyWithError);
}

#[test]
fn test_refresh_recovers_from_load_failure() {
    let (feed, table) = setup();
    table.insert(tx(1)).unwrap();
    table.fail_next_fetches(1, "timeout");

    let live = open(&feed, &table, LiveCollectionConfig::new("pool").with_live_updates(false));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    assert!(live.error().is_some());

    live.refresh().unwrap();
    assert!(live.error().is_none());
    assert_eq!(live.snapshot().ids(), vec![ItemId(1)]);
    assert_eq!(live.phase(), Phase::Ready);
}

#[test]
fn test_live_updates_follow_failed_load() {
    let (feed, table) = setup();
    table.fail_next_fetches(1, "timeout");

    let live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    wait_for_channel(&feed);

    table.insert(tx(1)).unwrap();
    let snapshot = live.wait_for(|s| !s.items().is_empty(), WAIT).unwrap();
    assert_eq!(snapshot.ids(), vec![ItemId(1)]);
    // Error stays until a load succeeds
    assert!(snapshot.error.is_some());
}

// --- Event Errors ---

#[test]
fn test_event_fetch_failure_keeps_items() {
    let (feed, table) = setup();
    table.insert(tx(1)).unwrap();
    table.insert(tx(2)).unwrap();
    let live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    wait_for_channel(&feed);

    table.fail_next_fetches(1, "503");
    table.insert(tx(3)).unwrap();

    let snapshot = live.wait_for(|s| s.error().is_some(), WAIT).unwrap();
    assert_eq!(snapshot.ids(), vec![ItemId(2), ItemId(1)]);
    assert_eq!(snapshot.error, Some(SyncError::Fetch("503".into())));

    // The channel stays open and later changes still apply
    table.insert(tx(4)).unwrap();
    let snapshot = live.wait_for(|s| s.get(ItemId(4)).is_some(), WAIT).unwrap();
    assert_eq!(snapshot.ids(), vec![ItemId(4), ItemId(2), ItemId(1)]);
    assert_eq!(feed.channel_count(), 1);
}

#[test]
fn test_update_for_vanished_row() {
    let (feed, table) = setup();
    let live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    wait_for_channel(&feed);

    feed.publish_json(
        r#"{"eventType":"UPDATE","schema":"public","table":"transactions",
            "new":{"id":99,"pool_id":"pool"},"old":{"id":99}}"#,
    )
    .unwrap();

    let snapshot = live.wait_for(|s| s.error().is_some(), WAIT).unwrap();
    assert_eq!(snapshot.error, Some(SyncError::NotFound(ItemId(99))));
    assert!(snapshot.items.is_empty());
}

#[test]
fn test_undecodable_change() {
    let (feed, table) = setup();
    table.insert(tx(1)).unwrap();
    let live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    wait_for_channel(&feed);

    feed.publish_json(
        r#"{"eventType":"INSERT","schema":"public","table":"transactions",
            "new":{"pool_id":"pool"}}"#,
    )
    .unwrap();

    let snapshot = live.wait_for(|s| s.error().is_some(), WAIT).unwrap();
    assert!(matches!(snapshot.error, Some(SyncError::InvalidPayload(_))));
    assert_eq!(snapshot.ids(), vec![ItemId(1)]);
}

// --- Stream Errors ---

#[test]
fn test_slow_view_dropped_by_feed() {
    let (feed, table) = setup();
    let live = open(
        &feed,
        &table,
        LiveCollectionConfig::new("pool").with_buffer_size(2),
    );
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    wait_for_channel(&feed);
    table.set_fetch_delay(Some(Duration::from_millis(50)));

    for id in 0..10 {
        table.insert(tx(id)).unwrap();
    }

    let snapshot = live
        .wait_for(|s| matches!(s.error(), Some(SyncError::Stream(_))), WAIT)
        .unwrap();
    assert!(snapshot.items.len() < 10);
    assert_eq!(feed.channel_count(), 0);
}

#[test]
fn test_feed_shutdown() {
    let (feed, table) = setup();
    table.insert(tx(1)).unwrap();
    let live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();
    wait_for_channel(&feed);

    feed.shutdown();

    let snapshot = live
        .wait_for(|s| matches!(s.error(), Some(SyncError::Stream(_))), WAIT)
        .unwrap();
    assert_eq!(snapshot.ids(), vec![ItemId(1)]);
}

#[test]
fn test_channel_limit_surfaces_error() {
    let (feed, table) = setup_with(FeedConfig {
        max_channels: 0,
        ..Default::default()
    });
    table.insert(tx(1)).unwrap();

    let live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    let snapshot = live
        .wait_for(|s| matches!(s.error(), Some(SyncError::Stream(_))), WAIT)
        .unwrap();

    assert_eq!(snapshot.ids(), vec![ItemId(1)]);
    assert_eq!(feed.channel_count(), 0);
}

// --- Closed Collections ---

#[test]
fn test_commands_after_close() {
    let (feed, table) = setup();
    let mut live = open(&feed, &table, LiveCollectionConfig::new("pool"));
    live.wait_for(|s| !s.loading(), WAIT).unwrap();

    live.close();
    assert_eq!(live.refresh(), Err(SyncError::Closed));
    assert_eq!(live.set_live_updates(true), Err(SyncError::Closed));

    // Closing twice is fine
    live.close();
}
