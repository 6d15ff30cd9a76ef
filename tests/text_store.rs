//! Delimited-text store behavior through the public API
//!
//! Covers:
//! - typed cells surviving a write/read cycle
//! - strict and loose header handling
//! - hand-written files with CRLF endings, blank lines and stray quotes
//! - update / delete rewrites keeping the header

use std::fs;

use chrono::{TimeZone, Utc};
use rowflex::codec::{HeaderMode, TextConfig};
use rowflex::observability::Logger;
use rowflex::query::{Filter, QueryPlan};
use rowflex::record::{Record, Value};
use rowflex::store::{Connection, StoreConfig};
use serde_json::json;
use tempfile::TempDir;

// =============================================================================
// Test Utilities
// =============================================================================

fn connect(dir: &TempDir, config: TextConfig) -> Connection {
    Connection::open(StoreConfig::text(dir.path(), config), Logger::discard())
        .expect("failed to open connection")
}

fn rec(value: serde_json::Value) -> Record {
    Record::from_json(value).expect("record must be an object")
}

fn fetch_all(conn: &Connection, table: &str) -> Vec<Record> {
    conn.cursor(&QueryPlan::new(table)).unwrap().fetch(0).unwrap()
}

// =============================================================================
// Encoding
// =============================================================================

/// Numbers, bools, timestamps, strings and nested records come back typed.
#[test]
fn test_typed_cells_round_trip() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir, TextConfig::default());

    let born = Utc.with_ymd_and_hms(1990, 5, 1, 8, 30, 0).unwrap();
    let mut person = rec(json!({
        "_id": "p1",
        "n": 3,
        "score": 1.5,
        "ok": true,
        "zip": "0150",
        "addr": {"city": "Oslo"}
    }));
    person.set("born", born);
    conn.insert("people", std::slice::from_ref(&person)).unwrap();

    let text = fs::read_to_string(dir.path().join("people.csv")).unwrap();
    let mut lines = text.lines();
    assert_eq!(lines.next(), Some("_id,addr.city,born,n,ok,score,zip"));
    assert_eq!(
        lines.next(),
        Some(r#""p1","Oslo",1990-05-01 08:30:00,3,true,1.5,"0150""#)
    );

    let back = fetch_all(&conn, "people");
    assert_eq!(back, vec![person]);
}

/// Strings holding every quote char and the delimiter survive insert,
/// a filtered fetch and a rewrite.
#[test]
fn test_strings_with_quotes_and_delimiters_round_trip() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir, TextConfig::default());
    let note = r#"say "hi", it's"#;
    conn.insert("notes", &[rec(json!({"id": 2, "note": note}))]).unwrap();
    conn.insert("notes", &[rec(json!({"id": 3, "note": "plain"}))]).unwrap();

    let plan = QueryPlan::new("notes").with_filter(Filter::eq("id", 2));
    let rows = conn.cursor(&plan).unwrap().fetch(0).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("note"), Some(&Value::from(note)));

    conn.delete("notes", Some(&Filter::eq("id", 3))).unwrap();
    let rows = fetch_all(&conn, "notes");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get("note"), Some(&Value::from(note)));
}

/// A line break cannot be stored, so the insert fails and the table is
/// left as it was.
#[test]
fn test_line_break_in_string_is_rejected() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir, TextConfig::default());
    conn.insert("notes", &[rec(json!({"id": 1, "note": "one line"}))]).unwrap();
    let path = dir.path().join("notes.csv");
    let before = fs::read(&path).unwrap();

    let err = conn
        .insert("notes", &[rec(json!({"id": 2, "note": "line1\nline2"}))])
        .unwrap_err();
    assert_eq!(err.code(), "FLEX_CODEC_UNENCODABLE");
    assert_eq!(fs::read(&path).unwrap(), before);

    let err = conn
        .update("notes", None, &rec(json!({"note": "a\r\nb"})))
        .unwrap_err();
    assert_eq!(err.code(), "FLEX_CODEC_UNENCODABLE");
    assert_eq!(fs::read(&path).unwrap(), before);
    assert_eq!(fetch_all(&conn, "notes").len(), 1);
}

/// A custom delimiter picks the `txt` extension and per-field date formats.
#[test]
fn test_pipe_delimited_with_field_date_format() {
    let dir = TempDir::new().unwrap();
    let config = TextConfig::new('|').with_field_date_format("day", "%Y/%m/%d");
    let conn = connect(&dir, config);
    fs::write(
        dir.path().join("events.txt"),
        "day|what\n2024/02/29|leap|extra\n",
    )
    .unwrap();

    let rows = fetch_all(&conn, "events");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].get("day"),
        Some(&Value::Timestamp(Utc.with_ymd_and_hms(2024, 2, 29, 0, 0, 0).unwrap()))
    );
    assert_eq!(rows[0].get("what"), Some(&Value::from("leap")));
    assert_eq!(rows[0].get("2"), Some(&Value::from("extra")));
    assert_eq!(conn.table_names().unwrap(), vec!["events"]);
}

/// CRLF endings, blank lines and an unterminated quote.
#[test]
fn test_hand_written_file() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir, TextConfig::default());
    fs::write(
        dir.path().join("food.csv"),
        "\r\nname,taste,level\r\n\r\nmakan'ikan,asin,sekali\r\n\"tea, hot\",'sweet',2\r\n",
    )
    .unwrap();

    let rows = fetch_all(&conn, "food");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get("name"), Some(&Value::from("makan'ikan")));
    assert_eq!(rows[0].get("level"), Some(&Value::from("sekali")));
    assert_eq!(rows[1].get("name"), Some(&Value::from("tea, hot")));
    assert_eq!(rows[1].get("taste"), Some(&Value::from("sweet")));
    assert_eq!(rows[1].get("level"), Some(&Value::Int(2)));
}

// =============================================================================
// Header modes
// =============================================================================

/// Strict mode keeps the header and drops unknown fields.
#[test]
fn test_strict_header_drops_unknown_fields() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir, TextConfig::default());
    conn.insert("t", &[rec(json!({"a": 1, "b": 2}))]).unwrap();
    conn.insert("t", &[rec(json!({"a": 3, "c": 4}))]).unwrap();

    let text = fs::read_to_string(dir.path().join("t.csv")).unwrap();
    assert_eq!(text, "a,b\n1,2\n3,\n");

    let rows = fetch_all(&conn, "t");
    assert_eq!(rows[1].get("b"), Some(&Value::from("")));
    assert!(rows[1].get("c").is_none());
}

/// Loose mode widens the header and pads existing rows.
#[test]
fn test_loose_header_grows() {
    let dir = TempDir::new().unwrap();
    let (logger, sink) = Logger::memory();
    let config = TextConfig::default().with_header_mode(HeaderMode::Loose);
    let conn = Connection::open(StoreConfig::text(dir.path(), config), logger).unwrap();

    conn.insert("t", &[rec(json!({"a": 1, "b": 2}))]).unwrap();
    conn.insert("t", &[rec(json!({"a": 3, "c": 4}))]).unwrap();

    let text = fs::read_to_string(dir.path().join("t.csv")).unwrap();
    assert_eq!(text, "a,b,c\n1,2,\n3,,4\n");
    assert!(sink.contains_event("HEADER_REWRITTEN"));

    let patch = rec(json!({"d": "new"}));
    assert_eq!(conn.update("t", Some(&Filter::eq("a", 1)), &patch).unwrap(), 1);
    let rows = fetch_all(&conn, "t");
    assert_eq!(rows[0].get("d"), Some(&Value::from("new")));
    assert_eq!(rows[1].get("d"), Some(&Value::from("")));
}

// =============================================================================
// Rewrites
// =============================================================================

/// Update and delete rewrite the file; truncation keeps the header.
#[test]
fn test_update_and_delete_keep_header() {
    let dir = TempDir::new().unwrap();
    let conn = connect(&dir, TextConfig::default());
    let rows: Vec<Record> = (1..=4)
        .map(|i| rec(json!({"_id": i, "name": format!("n{}", i)})))
        .collect();
    conn.insert("t", &rows).unwrap();

    let patch = rec(json!({"name": "renamed"}));
    assert_eq!(conn.update("t", Some(&Filter::gt("_id", 2)), &patch).unwrap(), 2);
    assert_eq!(conn.save("t", &rec(json!({"_id": 1, "name": "saved"}))).unwrap(), 1);

    let names: Vec<String> = fetch_all(&conn, "t")
        .iter()
        .map(|r| r.get("name").unwrap().to_text())
        .collect();
    assert_eq!(names, vec!["saved", "n2", "renamed", "renamed"]);

    assert_eq!(conn.delete("t", Some(&Filter::in_list("name", vec!["RENAMED"]))).unwrap(), 2);
    assert_eq!(fetch_all(&conn, "t").len(), 2);

    assert_eq!(conn.delete("t", None).unwrap(), 2);
    assert_eq!(fs::read_to_string(dir.path().join("t.csv")).unwrap(), "_id,name\n");
    assert!(fetch_all(&conn, "t").is_empty());
}
