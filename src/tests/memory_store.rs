use std::time::Duration;

use crate::config::StoreAddress;
use crate::error::Error;
use crate::store::memory::glob_match;
use crate::store::{Connector, MemoryConnection, MemoryStore, StoreHandle};

async fn open(store: &MemoryStore) -> MemoryConnection {
    store
        .connect(&StoreAddress::parse("localhost").unwrap())
        .await
        .unwrap()
}

#[test]
fn glob_matching() {
    assert!(glob_match("*", ""));
    assert!(glob_match("user:*", "user:42"));
    assert!(glob_match("user:*", "user:"));
    assert!(!glob_match("user:*", "users:42"));
    assert!(glob_match("h?llo", "hello"));
    assert!(!glob_match("h?llo", "hllo"));
    assert!(glob_match("h[ae]llo", "hallo"));
    assert!(!glob_match("h[ae]llo", "hillo"));
    assert!(glob_match("h[^e]llo", "hallo"));
    assert!(!glob_match("h[^e]llo", "hello"));
    assert!(glob_match("key:[0-9]", "key:7"));
    assert!(!glob_match("key:[0-9]", "key:x"));
    assert!(glob_match("a*b*c", "a-b-b-c"));
    assert!(!glob_match("a*b*c", "a-b-b-d"));
    assert!(glob_match("literal\\*", "literal*"));
    assert!(!glob_match("literal\\*", "literally"));
    assert!(glob_match("**x", "abcx"));
}

#[tokio::test]
async fn scan_count_bounds_keys_examined() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    for key in ["a:1", "a:2", "b:1", "b:2", "c:1"] {
        conn.set(key, "x", None).await.unwrap();
    }

    let (next, batch) = conn.scan(0, "b:*", 2).await.unwrap();
    assert_ne!(next, 0);
    assert!(batch.is_empty());

    let (next, batch) = conn.scan(next, "b:*", 2).await.unwrap();
    assert_ne!(next, 0);
    assert_eq!(batch, vec!["b:1".to_string(), "b:2".to_string()]);

    let (next, batch) = conn.scan(next, "b:*", 2).await.unwrap();
    assert_eq!((next, batch), (0, vec![]));
}

#[tokio::test]
async fn scan_rejects_unknown_cursor() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    conn.set("k", "v", None).await.unwrap();

    assert!(matches!(
        conn.scan(99, "*", 2).await.unwrap_err(),
        Error::Command {
            command: "SCAN",
            ..
        }
    ));

    // a cursor is good for one resume
    conn.set("l", "v", None).await.unwrap();
    let (next, _) = conn.scan(0, "*", 1).await.unwrap();
    conn.scan(next, "*", 1).await.unwrap();
    assert!(conn.scan(next, "*", 1).await.is_err());
}

async fn finish_scan(conn: &mut MemoryConnection, mut cursor: u64, seen: &mut Vec<String>) {
    while cursor != 0 {
        let (next, batch) = conn.scan(cursor, "*", 2).await.unwrap();
        seen.extend(batch);
        cursor = next;
    }
}

#[tokio::test]
async fn scan_survives_expiry_between_batches() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    conn.set("a", "x", Some(1)).await.unwrap();
    for key in ["b", "c", "d"] {
        conn.set(key, "x", None).await.unwrap();
    }

    let (next, mut seen) = conn.scan(0, "*", 2).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;
    finish_scan(&mut conn, next, &mut seen).await;

    assert_eq!(seen, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn scan_survives_deletes_between_batches() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    for key in ["a", "b", "c", "d"] {
        conn.set(key, "x", None).await.unwrap();
    }

    let (next, mut seen) = conn.scan(0, "*", 2).await.unwrap();
    assert_eq!(conn.del("a").await.unwrap(), 1);
    finish_scan(&mut conn, next, &mut seen).await;
    assert_eq!(seen, vec!["a", "b", "c", "d"]);

    // the key a cursor resumes after may itself be gone
    conn.set("a", "x", None).await.unwrap();
    let (next, mut seen) = conn.scan(0, "*", 2).await.unwrap();
    assert_eq!(conn.del("b").await.unwrap(), 1);
    finish_scan(&mut conn, next, &mut seen).await;
    assert_eq!(seen, vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn failed_hset_leaves_ttl_untouched() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    conn.set("plain", "v", None).await.unwrap();

    let fields = [("a".to_string(), "1".to_string())];
    assert!(matches!(
        conn.hset("plain", &fields, Some(60)).await.unwrap_err(),
        Error::Command {
            command: "HSET/EXPIRE",
            ..
        }
    ));
    assert_eq!(store.time_to_live("plain"), None);
    assert_eq!(conn.get("plain").await.unwrap(), Some("v".to_string()));
}

#[tokio::test]
async fn wrong_type_is_a_command_error() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;

    conn.hset("h", &[("a".to_string(), "1".to_string())], None)
        .await
        .unwrap();
    conn.set("s", "v", None).await.unwrap();

    assert!(matches!(
        conn.get("h").await.unwrap_err(),
        Error::Command { command: "GET", .. }
    ));
    assert!(matches!(
        conn.hgetall("s").await.unwrap_err(),
        Error::Command {
            command: "HGETALL",
            ..
        }
    ));
}

#[tokio::test]
async fn unlink_requires_keys() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;

    let err = conn.unlink(&[]).await.unwrap_err();
    assert!(matches!(err, Error::Command { command: "UNLINK", .. }));

    conn.set("x", "1", None).await.unwrap();
    let removed = conn
        .unlink(&["x".to_string(), "missing".to_string()])
        .await
        .unwrap();
    assert_eq!(removed, 1);
}

#[tokio::test]
async fn expired_keys_are_invisible() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;

    conn.set("gone", "x", Some(1)).await.unwrap();
    conn.set("stays", "x", None).await.unwrap();
    tokio::time::sleep(Duration::from_millis(1100)).await;

    assert_eq!(store.len(), 1);
    assert_eq!(conn.del("gone").await.unwrap(), 0);
    assert_eq!(conn.scan(0, "*", 10).await.unwrap().1, vec!["stays".to_string()]);
}

#[tokio::test]
async fn quit_closes_every_clone() {
    let store = MemoryStore::new();
    let mut conn = open(&store).await;
    let mut clone = conn.clone();

    conn.quit().await.unwrap();

    assert!(clone.get("k").await.unwrap_err().is_connection());
    assert!(conn.quit().await.unwrap_err().is_connection());
}

#[tokio::test]
async fn connect_delay_and_refusal() {
    let store = MemoryStore::new().with_connect_delay(Duration::from_millis(20));
    store.refuse_connections(true);

    let err = store
        .connect(&StoreAddress::parse("localhost").unwrap())
        .await
        .err()
        .unwrap();
    assert!(err.is_connection());
    assert_eq!(store.connect_count(), 0);

    store.refuse_connections(false);
    open(&store).await;
    assert_eq!(store.connect_count(), 1);
}
