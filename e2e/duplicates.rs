//! Multi-valued keys: find/find_next walk a key's values in insertion
//! order and end with None.

use std::path::Path;

use mcdb::{Mcdb, McdbWriter};
use tempfile::TempDir;

fn build(path: &Path, records: &[(&[u8], &[u8])]) {
    let mut w = McdbWriter::create(path).expect("create writer");
    for (k, v) in records {
        w.add(k, v).expect("add record");
    }
    w.finish(true).expect("finish");
}

#[test]
fn findnext_walks_values_in_insertion_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dup.mcdb");
    build(
        &path,
        &[(b"a", b"1"), (b"a", b"2"), (b"a", b"3"), (b"b", b"x")],
    );

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(b"a"), Some(&b"1"[..]));
    assert_eq!(db.find_next(b"a"), Some(&b"2"[..]));
    assert_eq!(db.find_next(b"a"), Some(&b"3"[..]));
    assert_eq!(db.find_next(b"a"), None);
    // The chain stays exhausted.
    assert_eq!(db.find_next(b"a"), None);

    assert_eq!(db.find(b"b"), Some(&b"x"[..]));
    assert_eq!(db.find_next(b"b"), None);
}

#[test]
fn interleaved_keys_keep_their_own_order() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("mix.mcdb");
    build(
        &path,
        &[
            (b"x", b"x1"),
            (b"y", b"y1"),
            (b"x", b"x2"),
            (b"y", b"y2"),
            (b"x", b"x3"),
        ],
    );

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(b"x"), Some(&b"x1"[..]));
    assert_eq!(db.find_next(b"x"), Some(&b"x2"[..]));
    assert_eq!(db.find_next(b"x"), Some(&b"x3"[..]));
    assert_eq!(db.find_next(b"x"), None);

    assert_eq!(db.find(b"y"), Some(&b"y1"[..]));
    assert_eq!(db.find_next(b"y"), Some(&b"y2"[..]));
    assert_eq!(db.find_next(b"y"), None);
}

#[test]
fn restarting_find_rewinds_the_chain() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rewind.mcdb");
    build(&path, &[(b"k", b"first"), (b"k", b"second")]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(b"k"), Some(&b"first"[..]));
    assert_eq!(db.find_next(b"k"), Some(&b"second"[..]));
    assert_eq!(db.find(b"k"), Some(&b"first"[..]));
    assert_eq!(db.find_next(b"k"), Some(&b"second"[..]));
    assert_eq!(db.find_next(b"k"), None);
}

#[test]
fn find_all_collects_the_whole_chain() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("all.mcdb");
    build(&path, &[(b"a", b"1"), (b"a", b"2"), (b"b", b"x")]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find_all(b"b"), vec![&b"x"[..]]);
    assert!(db.find_all(b"c").is_empty());
    assert_eq!(db.find_all(b"a"), vec![&b"1"[..], &b"2"[..]]);
    // The chain was exhausted by the collection.
    assert_eq!(db.find_next(b"a"), None);
}

#[test]
fn duplicate_empty_keys() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("dupe.mcdb");
    build(&path, &[(b"", b"v1"), (b"", b"v2")]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(b""), Some(&b"v1"[..]));
    assert_eq!(db.find_next(b""), Some(&b"v2"[..]));
    assert_eq!(db.find_next(b""), None);
}

#[test]
fn probe_counts_stay_within_the_bucket() {
    // Every record's find must examine at most its bucket's slot count.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("probes.mcdb");
    let records: Vec<(Vec<u8>, Vec<u8>)> = (0..500)
        .map(|i| (format!("k{:04}", i).into_bytes(), vec![b'v']))
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = records
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    build(&path, &borrowed);

    let snap = Mcdb::open(&path).unwrap();
    let mut finder = Mcdb::with_map(snap.snapshot());
    for (k, _) in snap.iter() {
        assert!(finder.find(k).is_some());
        let h = mcdb::hash::hash(mcdb::MCDB_HASH_INIT, k);
        let t = mcdb::format::table(finder.snapshot().bytes(), (h & 0xff) as usize);
        assert!(finder.probes() <= t.slots);
    }
}
