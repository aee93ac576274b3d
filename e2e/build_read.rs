//! Build a database on disk, then read it back: single records, empty
//! keys/values, record counts, and structurally invalid files.

use std::path::Path;

use mcdb::{Error, Mcdb, McdbWriter};
use tempfile::TempDir;

fn build(path: &Path, records: &[(&[u8], &[u8])]) {
    let mut w = McdbWriter::create(path).expect("create writer");
    for (k, v) in records {
        w.add(k, v).expect("add record");
    }
    w.finish(true).expect("finish");
}

#[test]
fn single_record_find_hit_and_miss() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("one.mcdb");
    build(&path, &[(b"one", b"Hello")]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.num_recs(), 1);
    assert_eq!(db.find(b"one"), Some(&b"Hello"[..]));
    assert_eq!(db.find(b"two"), None);
    // Accessors describe the most recent match.
    assert_eq!(db.find(b"one"), Some(&b"Hello"[..]));
    assert_eq!(db.data(), b"Hello");
    assert_eq!(db.key(), b"one");
    assert_eq!(db.data_len(), 5);
    assert_eq!(db.key_len(), 3);
}

#[test]
fn empty_key_and_empty_value() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.mcdb");
    build(&path, &[(b"", b"")]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.num_recs(), 1);
    assert_eq!(db.find(b""), Some(&b""[..]));

    let records: Vec<_> = db.iter().collect();
    assert_eq!(records, vec![(&b""[..], &b""[..])]);
}

#[test]
fn empty_database_iterates_nothing() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("none.mcdb");
    build(&path, &[]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.num_recs(), 0);
    assert_eq!(db.iter().next(), None);
    assert_eq!(db.find(b"anything"), None);
    assert_eq!(db.find(b""), None);
}

#[test]
fn iteration_preserves_insertion_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("order.mcdb");
    let records: Vec<(Vec<u8>, Vec<u8>)> = (0..100)
        .map(|i| {
            (
                format!("key-{}", i).into_bytes(),
                format!("value-{}", i * 7).into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = records
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    build(&path, &borrowed);

    let db = Mcdb::open(&path).unwrap();
    let seen: Vec<(&[u8], &[u8])> = db.iter().collect();
    assert_eq!(seen, borrowed);
}

#[test]
fn binary_keys_and_values_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bin.mcdb");
    let key = [0u8, 255, 10, b'-', b'>', 0, 1];
    let val = [b'\n', 0, 128, 7];
    build(&path, &[(&key[..], &val[..]), (&b"\0"[..], &b""[..])]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(&key), Some(&val[..]));
    assert_eq!(db.find(b"\0"), Some(&b""[..]));
    assert_eq!(db.find(b""), None);
}

#[test]
fn validate_slots_accepts_built_files() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("ok.mcdb");
    build(&path, &[(b"a", b"1"), (b"b", b"2"), (b"c", b"3")]);
    let db = Mcdb::open(&path).unwrap();
    assert!(db.validate_slots().is_ok());
}

#[test]
fn table_offset_past_file_size_is_a_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.mcdb");
    // A header-only file whose bucket 0 claims a table beyond the end.
    let mut bytes = vec![0u8; 2048];
    bytes[0..4].copy_from_slice(&4096u32.to_be_bytes());
    bytes[4..8].copy_from_slice(&2u32.to_be_bytes());
    std::fs::write(&path, &bytes).unwrap();

    assert_eq!(Mcdb::open(&path).err(), Some(Error::ReadFormat));
}

#[test]
fn truncated_file_is_a_format_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("trunc.mcdb");
    std::fs::write(&path, b"way too short").unwrap();
    assert_eq!(Mcdb::open(&path).err(), Some(Error::ReadFormat));
}
