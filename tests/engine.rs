//! End-to-end tests driving the engine the way the network front does:
//! enqueue operations, allow a flush period to pass, then assert through
//! reads and by inspecting the shard files on disk.

use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::tempdir;

use pathdb::config::AsqsConfig;
use pathdb::{dispatch, Config, Database, DbError, Request, Response};

/// config tuned for tests: autoscaler off, cache off unless asked for
fn test_config() -> Config {
    Config {
        cache_incoming_all: false,
        cache_outgoing_all: false,
        asqs_config: AsqsConfig {
            enable: false,
            interval_sec: 5,
            queue_threshold: 1000,
            worker_count_multiplier: 1,
        },
        ..Config::default()
    }
}

/// waits out one save/delete flush period (500 ms) with some slack
fn settle() {
    thread::sleep(Duration::from_millis(800));
}

/// waits out an add-buffer tick (1 s) plus the save flush it feeds
fn settle_add() {
    thread::sleep(Duration::from_millis(2000));
}

/// decodes every shard file under `base/db` as (file name, document)
fn shard_files(base: &Path) -> Vec<(String, serde_json::Map<String, Value>)> {
    let mut files = Vec::new();
    for entry in fs::read_dir(base.join("db")).unwrap() {
        let entry = entry.unwrap();
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with("db_file_") {
            continue;
        }
        let bytes = fs::read(entry.path()).unwrap();
        files.push((name, serde_json::from_slice(&bytes).unwrap()));
    }
    files
}

#[test]
fn save_then_read_dotted_path() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    db.set("users.alice", json!({"age": 30})).unwrap();
    settle();

    assert_eq!(db.get("users.alice").unwrap(), Some(json!({"age": 30})));
    // reading the root shows the nested structure the dotted save created
    assert_eq!(
        db.get("users").unwrap(),
        Some(json!({"alice": {"age": 30}}))
    );
    assert_eq!(db.get("users.bob").unwrap(), None);
}

#[test]
fn add_merges_into_existing_object() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    db.set("users.alice", json!({"age": 30})).unwrap();
    settle();

    db.add("users.alice", json!({"email": "a@x"})).unwrap();
    settle_add();

    assert_eq!(
        db.get("users.alice").unwrap(),
        Some(json!({"age": 30, "email": "a@x"}))
    );
}

#[test]
fn add_accumulates_fields_across_calls() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    db.add("counters", json!({"x": 1})).unwrap();
    settle_add();
    db.add("counters", json!({"y": 2})).unwrap();
    settle_add();

    let value = db.get("counters").unwrap().unwrap();
    assert_eq!(value, json!({"x": 1, "y": 2}));
}

#[test]
fn add_with_non_object_value_is_dropped() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    db.add("orphan", json!(5)).unwrap();
    settle_add();
    assert_eq!(db.get("orphan").unwrap(), None);

    // merging over a non-object replaces it with the incoming fields
    db.set("scalar", json!("text")).unwrap();
    settle();
    db.add("scalar", json!({"a": 1})).unwrap();
    settle_add();
    assert_eq!(db.get("scalar").unwrap(), Some(json!({"a": 1})));
}

#[test]
fn shard_files_respect_the_key_cap() {
    let dir = tempdir().unwrap();
    let config = Config {
        max_keys_per_file: 10,
        ..test_config()
    };
    let db = Database::open(dir.path(), config).unwrap();

    for i in 0..25 {
        db.set(&format!("k{}", i), json!(i)).unwrap();
    }
    settle();

    let files = shard_files(dir.path());
    assert_eq!(files.len(), 3);

    let mut counts: Vec<usize> = files.iter().map(|(_, doc)| doc.len()).collect();
    counts.sort_unstable();
    assert_eq!(counts, vec![5, 10, 10]);

    let total: usize = files.iter().map(|(_, doc)| doc.len()).sum();
    assert_eq!(total, 25);
}

#[test]
fn delete_removes_a_nested_path() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    db.set("users.alice", json!({"age": 30})).unwrap();
    db.set("users.bob", json!({"age": 44})).unwrap();
    settle();

    db.delete("users.alice").unwrap();
    settle();

    assert_eq!(db.get("users.alice").unwrap(), None);
    assert_eq!(db.get("users.bob").unwrap(), Some(json!({"age": 44})));
    assert_eq!(db.get("users").unwrap(), Some(json!({"bob": {"age": 44}})));
}

#[test]
fn deleting_a_whole_root_key_updates_the_view() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    db.set("solo", json!(1)).unwrap();
    settle();
    let view = db.get("").unwrap().unwrap();
    assert!(view.as_object().unwrap().contains_key("solo"));

    db.delete("solo").unwrap();
    settle();

    assert_eq!(db.get("solo").unwrap(), None);
    let view = db.get("").unwrap().unwrap();
    assert!(!view.as_object().unwrap().contains_key("solo"));

    // the key is gone from the shard file itself, not just the index
    for (_, doc) in shard_files(dir.path()) {
        assert!(!doc.contains_key("solo"));
    }
}

#[test]
fn cached_save_survives_losing_the_shard_file() {
    let dir = tempdir().unwrap();
    let config = Config {
        cache_incoming_all: true,
        cache_outgoing_all: true,
        cache_incoming_time_sec: 60,
        cache_outgoing_time_sec: 60,
        ..test_config()
    };
    let db = Database::open(dir.path(), config).unwrap();

    db.set("x", json!(1)).unwrap();
    settle();

    // remove the files behind the store; a cache hit needs no file read
    for (name, _) in shard_files(dir.path()) {
        fs::remove_file(dir.path().join("db").join(name)).unwrap();
    }
    assert_eq!(db.get("x").unwrap(), Some(json!(1)));
}

#[test]
fn concurrent_sets_for_distinct_keys_all_land() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    let mut handles = Vec::new();
    for chunk in 0..4 {
        let db = Arc::clone(&db);
        handles.push(thread::spawn(move || {
            for i in 0..125 {
                let key = format!("k{}", chunk * 125 + i);
                db.set(&key, json!(chunk * 125 + i)).unwrap();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    settle();

    let total: usize = shard_files(dir.path())
        .iter()
        .map(|(_, doc)| doc.len())
        .sum();
    assert_eq!(total, 500);
    assert_eq!(db.get("k42").unwrap(), Some(json!(42)));
    assert_eq!(db.get("k499").unwrap(), Some(json!(499)));
}

#[test]
fn empty_keys_are_rejected() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    assert!(matches!(db.set("", json!(1)), Err(DbError::EmptyKey)));
    assert!(matches!(db.add("", json!({"a": 1})), Err(DbError::EmptyKey)));
    assert!(matches!(db.delete(""), Err(DbError::EmptyKey)));
}

#[test]
fn reopening_restores_the_shard_map() {
    let dir = tempdir().unwrap();
    {
        let db = Database::open(dir.path(), test_config()).unwrap();
        db.set("a.b", json!(1)).unwrap();
        db.set("c", json!(2)).unwrap();
        settle();
    }

    let db = Database::open(dir.path(), test_config()).unwrap();
    assert_eq!(db.get("a.b").unwrap(), Some(json!(1)));
    assert_eq!(db.get("c").unwrap(), Some(json!(2)));
}

#[test]
fn dispatcher_validates_the_envelope() {
    let dir = tempdir().unwrap();
    let db = Database::open(dir.path(), test_config()).unwrap();

    let missing_action = dispatch(
        &db,
        Request {
            action: None,
            path: Some("a".to_string()),
            data: None,
        },
    );
    assert!(matches!(
        missing_action,
        Response::Err { error } if error == "missing or invalid action"
    ));

    let unknown = dispatch(
        &db,
        Request {
            action: Some("frobnicate".to_string()),
            path: Some("a".to_string()),
            data: None,
        },
    );
    assert!(matches!(unknown, Response::Err { error } if error == "unknown action"));

    let save_without_data = dispatch(
        &db,
        Request {
            action: Some("save".to_string()),
            path: Some("a".to_string()),
            data: None,
        },
    );
    assert!(matches!(
        save_without_data,
        Response::Err { error } if error == "missing or invalid data"
    ));

    let miss = dispatch(&db, Request::read("nothing.here"));
    assert!(matches!(miss, Response::Err { error } if error == "data not found"));

    // an empty path is only valid for read, where it returns the whole view
    let whole_view = dispatch(&db, Request::read(""));
    assert!(matches!(whole_view, Response::Ok { data: Some(_), .. }));

    let empty_save = dispatch(&db, Request::save("", json!(1)));
    assert!(matches!(empty_save, Response::Err { .. }));
}
