//! File-backed sessions opened from a `RecorderConfig`.

mod common;

use common::{ints, obj, Func, Heap};
use rewind_recorder::{verify_log, Recorder, RecorderConfig, RecorderError, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::PathBuf;

fn scratch_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("rewind-test-{}", uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn session_writes_verifiable_log_next_to_script() {
    let dir = scratch_dir();
    let script = dir.join("game.py");
    let config = RecorderConfig::for_script(&script).with_base_dir(&dir);
    assert_eq!(config.log_path, dir.join("game.rewind"));

    let mut heap = Heap::new();
    let main = Func::new(&mut heap, &script.to_string_lossy(), "<module>");
    let mut rec = Recorder::open(&config).unwrap();
    rec.push_frame(&heap, &main.frame(&[]));
    rec.visit_line(1);
    let scores = heap.list(ints(&[10, 20]));
    rec.store_local(&heap, 0, &obj(scores));
    rec.list_pop(&heap, scores, -1);
    rec.return_value(&heap, &Value::None);
    rec.pop_frame(&heap, &main.frame(&[]));
    let summary = rec.finish();

    let bytes = fs::read(&config.log_path).unwrap();
    let text = String::from_utf8(bytes.clone()).unwrap();
    assert!(text.starts_with("BASE_DIR(\""));
    let stats = verify_log(&text).unwrap();
    assert_eq!(stats.records, summary.records);
    assert_eq!(stats.definitions, summary.definitions);
    assert_eq!(stats.frames_pushed, 1);
    assert_eq!(stats.frames_popped, 1);

    let expected = format!("sha256:{:x}", Sha256::digest(&bytes));
    assert_eq!(summary.digest.as_deref(), Some(expected.as_str()));

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn frames_outside_base_dir_leave_only_header() {
    let dir = scratch_dir();
    let config = RecorderConfig::new(dir.join("out.rewind")).with_base_dir(dir.join("app"));

    let mut heap = Heap::new();
    let lib = Func::new(&mut heap, "/usr/lib/python3/json/decoder.py", "decode");
    let mut rec = Recorder::open(&config).unwrap();
    rec.push_frame(&heap, &lib.frame(&[]));
    rec.store_local(&heap, 0, &Value::Int(1));
    rec.pop_frame(&heap, &lib.frame(&[]));
    let summary = rec.finish();

    assert_eq!(summary.records, 1);
    let text = fs::read_to_string(&config.log_path).unwrap();
    assert_eq!(text.lines().count(), 1);

    fs::remove_dir_all(&dir).ok();
}

#[test]
fn open_reports_unwritable_path() {
    let dir = scratch_dir();
    let config = RecorderConfig::new(dir.join("missing").join("out.rewind"));
    match Recorder::open(&config) {
        Err(RecorderError::Open { path, .. }) => assert_eq!(path, config.log_path),
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("opened a log in a missing directory"),
    }
    let empty = RecorderConfig::new("");
    assert!(matches!(
        Recorder::open(&empty),
        Err(RecorderError::Config(_))
    ));

    fs::remove_dir_all(&dir).ok();
}
