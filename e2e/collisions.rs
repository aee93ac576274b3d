//! Lookup correctness at scale: every bucket populated many times over,
//! plus a randomized round-trip sweep.

use std::collections::HashMap;
use std::path::Path;

use mcdb::{Mcdb, McdbWriter};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::TempDir;

#[test]
fn ten_thousand_keys_all_resolve() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("big.mcdb");

    let mut w = McdbWriter::create(&path).unwrap();
    for i in 0..10_000 {
        let key = format!("k{:05}", i);
        let val = format!("value of {}", i);
        w.add(key.as_bytes(), val.as_bytes()).unwrap();
    }
    w.finish(true).unwrap();

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.num_recs(), 10_000);
    for i in 0..10_000 {
        let key = format!("k{:05}", i);
        let val = format!("value of {}", i);
        assert_eq!(db.find(key.as_bytes()), Some(val.as_bytes()));
        assert_eq!(db.find_next(key.as_bytes()), None);
    }
    assert_eq!(db.find(b"missing"), None);
    assert_eq!(db.find(b"k10000"), None);
}

#[test]
fn randomized_records_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rand.mcdb");
    let mut rng = StdRng::seed_from_u64(0x6d63_6462);

    // Random keys of random lengths; duplicates possible and expected.
    let mut records: Vec<(Vec<u8>, Vec<u8>)> = Vec::new();
    for _ in 0..2_000 {
        let klen = rng.gen_range(0..48);
        let dlen = rng.gen_range(0..256);
        let key: Vec<u8> = (0..klen).map(|_| rng.gen()).collect();
        let val: Vec<u8> = (0..dlen).map(|_| rng.gen()).collect();
        records.push((key, val));
    }

    let mut w = McdbWriter::create(&path).unwrap();
    for (k, v) in &records {
        w.add(k, v).unwrap();
    }
    w.finish(true).unwrap();

    // Group the expected values per key, preserving insertion order.
    let mut expect: HashMap<&[u8], Vec<&[u8]>> = HashMap::new();
    for (k, v) in &records {
        expect.entry(k).or_default().push(v);
    }

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.num_recs() as usize, records.len());
    for (key, values) in &expect {
        let mut got: Vec<Vec<u8>> = Vec::new();
        if let Some(v) = db.find(key) {
            got.push(v.to_vec());
            while let Some(v) = db.find_next(key) {
                got.push(v.to_vec());
            }
        }
        let want: Vec<Vec<u8>> = values.iter().map(|v| v.to_vec()).collect();
        assert_eq!(got, want, "key {:02x?}", key);
    }
}

fn build(path: &Path, records: &[(&[u8], &[u8])]) -> Mcdb {
    let mut w = McdbWriter::create(path).unwrap();
    for (k, v) in records {
        w.add(k, v).unwrap();
    }
    w.finish(false).unwrap();
    Mcdb::open(path).unwrap()
}

#[test]
fn same_bucket_different_keys_disambiguate() {
    // Keys engineered to land in one bucket: vary only bytes that keep the
    // hash's low byte equal by brute-force search.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bucket.mcdb");

    let mut keys: Vec<Vec<u8>> = Vec::new();
    let mut i: u32 = 0;
    while keys.len() < 40 {
        let cand = format!("cand-{}", i).into_bytes();
        if mcdb::hash::hash(mcdb::MCDB_HASH_INIT, &cand) & 0xff == 0x2a {
            keys.push(cand);
        }
        i += 1;
    }
    let records: Vec<(&[u8], Vec<u8>)> = keys
        .iter()
        .enumerate()
        .map(|(n, k)| (k.as_slice(), format!("v{}", n).into_bytes()))
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = records
        .iter()
        .map(|(k, v)| (*k, v.as_slice()))
        .collect();
    let mut db = build(&path, &borrowed);

    for (n, k) in keys.iter().enumerate() {
        let want = format!("v{}", n);
        assert_eq!(db.find(k), Some(want.as_bytes()));
        assert_eq!(db.find_next(k), None);
    }
}
