//! Snapshot stability and refresh: replacing the file never disturbs a
//! registered reader, refresh adopts the replacement, and concurrent
//! readers drain old generations safely.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use mcdb::{Mcdb, McdbWriter};
use tempfile::TempDir;

fn build(path: &Path, records: &[(&[u8], &[u8])]) {
    let mut w = McdbWriter::create(path).unwrap();
    for (k, v) in records {
        w.add(k, v).unwrap();
    }
    w.finish(true).unwrap();
}

/// Rebuild with a pause first, so the replacement's mtime is distinct even
/// on filesystems with coarse timestamps.
fn rebuild(path: &Path, records: &[(&[u8], &[u8])]) {
    thread::sleep(Duration::from_millis(50));
    build(path, records);
}

#[test]
fn refresh_sees_replacement_others_keep_snapshot() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.mcdb");
    build(&path, &[(b"k", b"old-value")]);

    let mut r1 = Mcdb::open(&path).unwrap();
    let mut r2 = Mcdb::with_map(r1.snapshot());

    rebuild(&path, &[(b"k", b"new-value"), (b"extra", b"row")]);

    // Before refresh both readers see the first snapshot.
    assert_eq!(r1.find(b"k"), Some(&b"old-value"[..]));
    assert_eq!(r2.find(b"k"), Some(&b"old-value"[..]));
    assert_eq!(r1.find(b"extra"), None);

    // r1 refreshes and crosses over; r2 stays on its registration.
    r1.refresh().unwrap();
    assert_eq!(r1.find(b"k"), Some(&b"new-value"[..]));
    assert_eq!(r1.find(b"extra"), Some(&b"row"[..]));
    assert_eq!(r1.num_recs(), 2);

    assert_eq!(r2.find(b"k"), Some(&b"old-value"[..]));
    assert_eq!(r2.find(b"extra"), None);
    assert_eq!(r2.num_recs(), 1);

    // r2 refreshes later and lands on the same new generation.
    r2.refresh().unwrap();
    assert_eq!(r2.find(b"k"), Some(&b"new-value"[..]));
}

#[test]
fn refresh_without_change_is_a_no_op() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.mcdb");
    build(&path, &[(b"k", b"v")]);

    let mut db = Mcdb::open(&path).unwrap();
    let before = db.snapshot();
    db.refresh().unwrap();
    assert!(Arc::ptr_eq(&before, &db.snapshot()));
}

#[test]
fn refresh_resets_a_find_chain() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.mcdb");
    build(&path, &[(b"k", b"1"), (b"k", b"2")]);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(b"k"), Some(&b"1"[..]));
    db.refresh().unwrap();
    // The chain restarts rather than resuming into a stale position.
    assert_eq!(db.find_next(b"k"), Some(&b"1"[..]));
}

#[test]
fn deleted_file_makes_refresh_fail_but_reader_survives() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.mcdb");
    build(&path, &[(b"k", b"v")]);

    let mut db = Mcdb::open(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert!(db.refresh().is_err());
    // The registered snapshot is still fully readable.
    assert_eq!(db.find(b"k"), Some(&b"v"[..]));
}

#[test]
fn many_threads_share_one_generation_while_it_is_replaced() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.mcdb");

    let records: Vec<(Vec<u8>, Vec<u8>)> = (0..1_000)
        .map(|i| {
            (
                format!("key{:04}", i).into_bytes(),
                format!("val{:04}", i).into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = records
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    build(&path, &borrowed);

    let seed = Mcdb::open(&path).unwrap();
    let snap = seed.snapshot();

    let mut handles = Vec::new();
    for t in 0..8 {
        let snap = Arc::clone(&snap);
        handles.push(thread::spawn(move || {
            let mut db = Mcdb::with_map(snap);
            for round in 0..50 {
                let i = (t * 131 + round * 17) % 1_000;
                let key = format!("key{:04}", i);
                let want = format!("val{:04}", i);
                assert_eq!(db.find(key.as_bytes()), Some(want.as_bytes()));
            }
        }));
    }

    // Replace the file while the readers run; their registered generation
    // must stay mapped until the last of them drops it.
    rebuild(&path, &[(b"fresh", b"contents")]);

    for h in handles {
        h.join().unwrap();
    }

    // Old generation still consistent afterwards for this holder.
    let mut old = Mcdb::with_map(Arc::clone(&snap));
    assert_eq!(old.find(b"key0000"), Some(&b"val0000"[..]));
    assert_eq!(old.num_recs(), 1_000);

    // A refresh from the old generation reaches the replacement.
    let mut fresh = Mcdb::with_map(snap.refreshed().unwrap());
    assert_eq!(fresh.find(b"fresh"), Some(&b"contents"[..]));
    assert_eq!(fresh.num_recs(), 1);
}

#[test]
fn concurrent_refreshers_agree_on_one_successor() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("db.mcdb");
    build(&path, &[(b"gen", b"1")]);

    let first = Mcdb::open(&path).unwrap().snapshot();
    rebuild(&path, &[(b"gen", b"2")]);

    let mut handles = Vec::new();
    for _ in 0..8 {
        let first = Arc::clone(&first);
        handles.push(thread::spawn(move || first.refreshed().unwrap()));
    }
    let maps: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    // Everyone adopted the same published successor.
    for m in &maps {
        assert!(Arc::ptr_eq(m, &maps[0]));
        let mut db = Mcdb::with_map(Arc::clone(m));
        assert_eq!(db.find(b"gen"), Some(&b"2"[..]));
    }
}
