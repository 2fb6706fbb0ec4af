//! Integration tests for account change notifications

use accounts_store::contract::*;
use accounts_store::{AccountStore, Config, EventKind, SubscriptionFilter};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{
    memory_store, open_store, print_test_header, recorder, registry, FlakyStorage, SlowStorage,
};

#[tokio::test]
async fn test_events_follow_commit_order() {
    print_test_header(
        "test_events_follow_commit_order",
        "Created, Updated and Deleted arrive in commit order with the changed keys",
    );
    let (store, _storage) = memory_store().await;
    let (log, callback) = recorder();
    let _subscription = store.subscribe(callback);

    let account = store.create_account("twitter").unwrap();
    account.set_typed("username", "alice").unwrap();
    account.commit().await.unwrap();

    let sync = account.service("sync").unwrap();
    sync.set_typed("poll_interval", 60).unwrap();
    account.set_typed("password", "secret").unwrap();
    account.commit().await.unwrap();

    // Clean commit publishes nothing
    account.commit().await.unwrap();

    store.delete_account(account.id()).await.unwrap();
    store.shutdown().await.unwrap();

    let events = log.lock();
    let kinds: Vec<EventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::Created, EventKind::Updated, EventKind::Deleted]);
    assert!(events.iter().all(|e| e.account_id == 1));

    assert_eq!(events[0].changed_keys, vec!["username".to_string()]);
    assert_eq!(
        events[1].changed_keys,
        vec!["password".to_string(), "poll_interval".to_string()]
    );
    assert_eq!(events[1].changed_services, vec!["sync".to_string()]);
    assert!(events[2].changed_keys.is_empty());
    assert!(events[0].timestamp <= events[2].timestamp);
}

#[tokio::test]
async fn test_failed_commit_publishes_nothing() {
    let storage = Arc::new(FlakyStorage::new());
    let store = open_store(storage.clone()).await;
    let (log, callback) = recorder();
    let _subscription = store.subscribe(callback);

    storage.set_failing(true);
    let account = store.create_account("twitter").unwrap();
    account.set_typed("username", "alice").unwrap();
    assert!(account.commit().await.is_err());

    storage.set_failing(false);
    account.commit().await.unwrap();
    store.shutdown().await.unwrap();

    let events = log.lock();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, EventKind::Created);
    assert_eq!(events[0].changed_keys, vec!["username".to_string()]);
}

#[tokio::test]
async fn test_unsaved_delete_publishes_nothing() {
    let (store, _storage) = memory_store().await;
    let (log, callback) = recorder();
    let _subscription = store.subscribe(callback);

    let account = store.create_account("twitter").unwrap();
    account.delete().await.unwrap();
    store.shutdown().await.unwrap();

    assert!(log.lock().is_empty());
}

#[tokio::test]
async fn test_filtered_subscriptions() {
    let (store, _storage) = memory_store().await;
    let first = store.create_account("twitter").unwrap();
    let second = store.create_account("google").unwrap();

    let (by_account, callback) = recorder();
    let _account_sub =
        store.subscribe_filtered(SubscriptionFilter::account(first.id()), callback);
    let (by_prefix, callback) = recorder();
    let _prefix_sub = store.subscribe_filtered(
        SubscriptionFilter::default().with_key_prefix("server."),
        callback,
    );

    first.set_typed("username", "alice").unwrap();
    first.commit().await.unwrap();
    second.set_typed("server.host", "imap.gmail.com").unwrap();
    second.commit().await.unwrap();
    first.set_typed("server.port", 993).unwrap();
    first.commit().await.unwrap();
    second.delete().await.unwrap();
    store.shutdown().await.unwrap();

    let events = by_account.lock();
    assert_eq!(events.len(), 2);
    assert!(events.iter().all(|e| e.account_id == first.id()));

    // Deletions pass any key prefix
    let events = by_prefix.lock();
    let seen: Vec<(AccountId, EventKind)> =
        events.iter().map(|e| (e.account_id, e.kind)).collect();
    assert_eq!(
        seen,
        vec![
            (second.id(), EventKind::Created),
            (first.id(), EventKind::Updated),
            (second.id(), EventKind::Deleted),
        ]
    );
}

#[tokio::test]
async fn test_dropped_subscription_stops_delivery() {
    let (store, _storage) = memory_store().await;
    let (kept_log, callback) = recorder();
    let kept = store.subscribe(callback);
    let (dropped_log, callback) = recorder();
    let dropped = store.subscribe(callback);
    assert_ne!(dropped.id(), kept.id());

    let account = store.create_account("twitter").unwrap();
    account.commit().await.unwrap();

    dropped.unsubscribe();
    account.set_typed("username", "alice").unwrap();
    account.commit().await.unwrap();
    store.shutdown().await.unwrap();

    assert_eq!(kept_log.lock().len(), 2);
    drop(kept);
    // The first event may or may not have been dispatched before unsubscribing
    assert!(dropped_log.lock().len() <= 1);
    assert!(dropped_log
        .lock()
        .iter()
        .all(|e| e.kind == EventKind::Created));
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_commits_keep_per_account_order() {
    print_test_header(
        "test_concurrent_commits_keep_per_account_order",
        "Commits racing from several tasks publish each account's events in commit order",
    );
    let config = Config {
        persistence_timeout: Duration::from_secs(60),
        ..Config::default()
    };
    let storage = Arc::new(SlowStorage::new(Duration::from_secs(5)));
    let store = AccountStore::open(config, storage, registry()).await.unwrap();
    let (log, callback) = recorder();
    let _subscription = store.subscribe(callback);

    let accounts = [
        store.create_account("twitter").unwrap(),
        store.create_account("google").unwrap(),
    ];
    let mut handles = Vec::new();
    for round in 0..4 {
        for account in &accounts {
            let account = account.clone();
            handles.push(tokio::spawn(async move {
                account.set_typed(&format!("key{}", round), round).unwrap();
                account.commit().await
            }));
        }
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    accounts[0].delete().await.unwrap();
    store.shutdown().await.unwrap();

    let events = log.lock();
    for account in &accounts {
        let mine: Vec<_> = events
            .iter()
            .filter(|e| e.account_id == account.id())
            .collect();
        assert_eq!(mine[0].kind, EventKind::Created);
        assert!(mine[1..]
            .iter()
            .all(|e| matches!(e.kind, EventKind::Updated | EventKind::Deleted)));
        assert!(mine[..mine.len() - 1]
            .iter()
            .all(|e| e.kind != EventKind::Deleted));

        // Every key is reported once, by the commit that first persisted it
        let mut keys: Vec<&str> = mine
            .iter()
            .flat_map(|e| e.changed_keys.iter().map(String::as_str))
            .collect();
        keys.sort_unstable();
        assert_eq!(keys, vec!["key0", "key1", "key2", "key3"]);
    }
    assert_eq!(
        events
            .iter()
            .filter(|e| e.account_id == accounts[0].id())
            .last()
            .map(|e| e.kind),
        Some(EventKind::Deleted)
    );
}
