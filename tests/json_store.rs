//! JSON-array store behavior through the public API
//!
//! Covers:
//! - insert / query round trips and pagination
//! - fast-path skip/take agreeing with the materialized path
//! - concurrent writers on one connection and across connections
//! - readers never observing a half-written table
//! - cross-process lock timeout leaving the table untouched

use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use rowflex::observability::Logger;
use rowflex::query::{AggrItem, Filter, QueryPlan};
use rowflex::record::{Record, Value};
use rowflex::store::{Connection, StoreConfig, StoreError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn connect(dir: &TempDir) -> Connection {
    Connection::open(StoreConfig::json(dir.path()), Logger::discard())
        .expect("failed to open connection")
}

fn rec(value: serde_json::Value) -> Record {
    Record::from_json(value).expect("record must be an object")
}

fn fetch_all(conn: &Connection, plan: &QueryPlan) -> Vec<Record> {
    conn.cursor(plan).unwrap().fetch(0).unwrap()
}

fn seed_numbers(conn: &Connection, n: i64) {
    let rows: Vec<Record> = (0..n).map(|i| rec(json!({"_id": i, "n": i}))).collect();
    conn.insert("numbers", &rows).unwrap();
}

// =============================================================================
// Queries
// =============================================================================

/// Inserted records come back through an equality filter.
#[test]
fn test_insert_then_filter() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    conn.insert(
        "users",
        &[
            rec(json!({"_id": "u1", "name": "Ada", "age": 36})),
            rec(json!({"_id": "u2", "name": "Grace", "age": 45})),
        ],
    )
    .unwrap();

    let plan = QueryPlan::new("users").with_filter(Filter::eq("name", "Grace"));
    let rows = fetch_all(&conn, &plan);
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("_id"), Some(&Value::from("u2")));
    assert_eq!(rows[0].get("age"), Some(&Value::Int(45)));
}

/// Streaming skip/take returns exactly the slice of the full result.
#[test]
fn test_skip_take_matches_full_slice() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    seed_numbers(&conn, 10);

    let full: Vec<Record> = fetch_all(&conn, &QueryPlan::new("numbers"));
    assert_eq!(full.len(), 10);

    for skip in [0usize, 1, 5] {
        for take in [0usize, 1, 3] {
            let plan = QueryPlan::new("numbers").skip(skip).take(take);
            let got = fetch_all(&conn, &plan);
            let end = if take == 0 { full.len() } else { (skip + take).min(full.len()) };
            assert_eq!(got, full[skip..end].to_vec(), "skip={} take={}", skip, take);
        }
    }
}

/// Successive fetches page through the table without overlap.
#[test]
fn test_paging_with_fetch() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    seed_numbers(&conn, 7);

    let mut cursor = conn
        .cursor(&QueryPlan::new("numbers").sort_by(["-n"]))
        .unwrap();
    let mut pages = Vec::new();
    loop {
        let page = cursor.fetch(3).unwrap();
        if page.is_empty() {
            break;
        }
        pages.push(page.len());
    }
    assert_eq!(pages, vec![3, 3, 1]);
    assert!(cursor.fetch_one().unwrap_err().is_eof());
}

/// Grouped aggregation over a filtered set.
#[test]
fn test_group_and_aggregate() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    conn.insert(
        "sales",
        &[
            rec(json!({"region": "north", "amount": 10, "price": 1.5})),
            rec(json!({"region": "south", "amount": 4, "price": 2.0})),
            rec(json!({"region": "north", "amount": 6, "price": 2.5})),
            rec(json!({"region": "east", "amount": 100, "price": 9.0})),
        ],
    )
    .unwrap();

    let plan = QueryPlan::new("sales")
        .with_filter(Filter::ne("region", "east"))
        .group_by(["region"])
        .aggregate(AggrItem::sum("amount"))
        .aggregate(AggrItem::avg("price").with_alias("avg_price"))
        .aggregate(AggrItem::count("amount").with_alias("orders"))
        .sort_by(["region"]);
    let rows = fetch_all(&conn, &plan);

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("region"), Some(&Value::from("north")));
    assert_eq!(rows[0].get("amount"), Some(&Value::Int(16)));
    assert_eq!(rows[0].get("avg_price"), Some(&Value::Float(2.0)));
    assert_eq!(rows[0].get("orders"), Some(&Value::Int(2)));
    assert_eq!(rows[1].get("region"), Some(&Value::from("south")));

    let mut cursor = conn.cursor(&plan).unwrap();
    // count ignores grouping
    assert_eq!(cursor.count().unwrap(), 3);
}

/// Filter variables are substituted into a copy of the plan.
#[test]
fn test_plan_variables() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    seed_numbers(&conn, 10);

    let plan = QueryPlan::new("numbers").with_filter(Filter::range("n", "%lo", "%hi"));
    let mut vars = HashMap::new();
    vars.insert("lo".to_string(), Value::Int(3));
    vars.insert("hi".to_string(), Value::Int(5));

    assert_eq!(fetch_all(&conn, &plan.with_vars(&vars)).len(), 3);
    // the template itself is unchanged and its placeholders do not parse
    let err = conn.cursor(&plan).unwrap().fetch(0).unwrap_err();
    assert_eq!(err.code(), "FLEX_TYPE_MISMATCH");
}

/// Typed structs go in and come back out through serde.
#[test]
fn test_typed_round_trip() {
    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Book {
        _id: String,
        title: String,
        pages: u32,
        tags: Vec<String>,
    }

    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    let book = Book {
        _id: "b1".into(),
        title: "Dune".into(),
        pages: 412,
        tags: vec!["sf".into(), "classic".into()],
    };
    conn.insert_serialized("books", &book).unwrap();

    let mut cursor = conn.cursor(&QueryPlan::new("books")).unwrap();
    let back: Book = cursor.fetch_one_as().unwrap();
    assert_eq!(back, book);
}

// =============================================================================
// Concurrency
// =============================================================================

/// 100 threads inserting through one shared connection lose nothing.
#[test]
fn test_concurrent_inserts_keep_every_record() {
    let dir = TempDir::new().unwrap();
    let conn = Arc::new(connect(&dir));

    let handles: Vec<_> = (0..100)
        .map(|i| {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                conn.insert("log", &[rec(json!({"_id": format!("id-{}", i), "i": i}))])
                    .unwrap();
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let rows = fetch_all(&conn, &QueryPlan::new("log"));
    assert_eq!(rows.len(), 100);
    let mut ids: Vec<String> = rows
        .iter()
        .map(|r| r.get("_id").unwrap().to_text())
        .collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 100);
}

/// Separate connections on one directory serialize on the file lock.
#[test]
fn test_separate_connections_do_not_lose_updates() {
    let dir = TempDir::new().unwrap();
    let setup = connect(&dir);
    setup.insert("counter", &[rec(json!({"_id": "c", "hit": false}))]).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let path = dir.path().to_path_buf();
            thread::spawn(move || {
                let conn = Connection::open(StoreConfig::json(&path), Logger::discard()).unwrap();
                for _ in 0..10 {
                    conn.insert("counter", &[rec(json!({"hit": true}))]).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let hits = QueryPlan::new("counter").with_filter(Filter::eq("hit", true));
    assert_eq!(setup.cursor(&hits).unwrap().count().unwrap(), 40);
}

/// Readers take no lock and still never see a partial file.
#[test]
fn test_readers_see_whole_tables_during_rewrites() {
    let dir = TempDir::new().unwrap();
    let conn = Arc::new(connect(&dir));
    seed_numbers(&conn, 50);

    let writer = {
        let conn = Arc::clone(&conn);
        thread::spawn(move || {
            for round in 0..30 {
                let patch = rec(json!({"round": round}));
                conn.update("numbers", None, &patch).unwrap();
            }
        })
    };

    for _ in 0..30 {
        let rows = fetch_all(&conn, &QueryPlan::new("numbers"));
        assert_eq!(rows.len(), 50);
    }
    writer.join().unwrap();
}

// =============================================================================
// Locking
// =============================================================================

/// A lock held elsewhere makes the mutation time out and leaves the
/// table as it was.
#[test]
fn test_lock_held_by_another_process_times_out() {
    let dir = TempDir::new().unwrap();
    let config = StoreConfig::json(dir.path())
        .with_lock_timeout(Duration::from_millis(50))
        .with_lock_poll(Duration::from_millis(5));
    let conn = Connection::open(config, Logger::discard()).unwrap();
    conn.insert("t", &[rec(json!({"a": 1}))]).unwrap();
    let table = dir.path().join("t.json");
    let before = fs::read(&table).unwrap();

    let foreign = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.path().join("t.json.lock"))
        .unwrap();
    foreign.lock_exclusive().unwrap();

    let err = conn.insert("t", &[rec(json!({"a": 2}))]).unwrap_err();
    assert!(matches!(err, StoreError::LockTimeout { .. }));
    assert_eq!(fs::read(&table).unwrap(), before);

    FileExt::unlock(&foreign).unwrap();
    assert_eq!(conn.insert("t", &[rec(json!({"a": 2}))]).unwrap(), 1);
}

/// Writers queued on one connection share the lock timeout instead of
/// each starting a fresh one after the writer ahead of them gives up.
#[test]
fn test_queued_writers_share_one_lock_timeout() {
    let dir = TempDir::new().unwrap();
    let timeout = Duration::from_millis(300);
    let config = StoreConfig::json(dir.path())
        .with_lock_timeout(timeout)
        .with_lock_poll(Duration::from_millis(5));
    let conn = Arc::new(Connection::open(config, Logger::discard()).unwrap());

    let foreign = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(dir.path().join("t.json.lock"))
        .unwrap();
    foreign.lock_exclusive().unwrap();

    let workers: Vec<_> = (0..4)
        .map(|i| {
            let conn = Arc::clone(&conn);
            thread::spawn(move || {
                let start = Instant::now();
                let result = conn.insert("t", &[rec(json!({"worker": i}))]);
                (result, start.elapsed())
            })
        })
        .collect();

    for worker in workers {
        let (result, waited) = worker.join().unwrap();
        assert!(matches!(result, Err(StoreError::LockTimeout { .. })));
        assert!(
            waited < timeout * 2,
            "writer waited {:?} with a {:?} lock timeout",
            waited,
            timeout
        );
    }
    FileExt::unlock(&foreign).unwrap();
}

/// Malformed files surface codec errors and stay sticky.
#[test]
fn test_malformed_table_is_reported() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir);
    fs::write(dir.path().join("bad.json"), r#"[{"a": 1}, {"a": "#).unwrap();

    let mut cursor = conn.cursor(&QueryPlan::new("bad")).unwrap();
    let err = cursor.fetch(0).unwrap_err();
    assert_eq!(err.code(), "FLEX_CODEC_MALFORMED");
    assert_eq!(cursor.fetch(0).unwrap_err(), err);

    // mutations read the table first and fail the same way
    let err = conn.delete("bad", None).unwrap_err();
    assert_eq!(err.code(), "FLEX_CODEC_MALFORMED");
}
