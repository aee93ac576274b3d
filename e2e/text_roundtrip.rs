//! Text boundary format: dump -> parse -> dump is byte-identical.

use std::io::Cursor;
use std::path::Path;

use mcdb::{textfmt, Mcdb, McdbWriter};
use tempfile::TempDir;

fn build(path: &Path, records: &[(&[u8], &[u8])]) {
    let mut w = McdbWriter::create(path).unwrap();
    for (k, v) in records {
        w.add(k, v).unwrap();
    }
    w.finish(false).unwrap();
}

fn dump_of(path: &Path) -> Vec<u8> {
    let db = Mcdb::open(path).unwrap();
    let mut out = Vec::new();
    textfmt::dump(&db, &mut out).unwrap();
    out
}

fn build_from_text(path: &Path, text: &[u8]) {
    let mut w = McdbWriter::create(path).unwrap();
    textfmt::parse_into(text, w.make_mut()).unwrap();
    w.finish(false).unwrap();
}

#[test]
fn known_dump_format() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("fmt.mcdb");
    build(&path, &[(b"one", b"Hello"), (b"two", b"World")]);
    assert_eq!(dump_of(&path), b"+3,5:one->Hello\n+3,5:two->World\n\n");
}

#[test]
fn text_to_db_to_text_is_identical() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rt.mcdb");
    let text = b"+3,5:one->Hello\n+3,5:two->World\n\n";
    build_from_text(&path, text);
    assert_eq!(dump_of(&path), text);
}

#[test]
fn db_to_text_to_db_preserves_every_record() {
    let dir = TempDir::new().unwrap();
    let first = dir.path().join("a.mcdb");
    let second = dir.path().join("b.mcdb");
    build(
        &first,
        &[
            (b"", b""),
            (b"dup", b"1"),
            (b"dup", b"2"),
            (b"bin\x00key", b"\xffdata\n"),
        ],
    );
    let text = dump_of(&first);
    build_from_text(&second, &text);
    assert_eq!(dump_of(&second), text);

    let mut db = Mcdb::open(&second).unwrap();
    assert_eq!(db.find(b"dup"), Some(&b"1"[..]));
    assert_eq!(db.find_next(b"dup"), Some(&b"2"[..]));
    assert_eq!(db.find_next(b"dup"), None);
    assert_eq!(db.find(b"bin\x00key"), Some(&b"\xffdata\n"[..]));
}

#[test]
fn empty_database_dumps_to_a_blank_line() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("empty.mcdb");
    build(&path, &[]);
    assert_eq!(dump_of(&path), b"\n");

    let again = dir.path().join("again.mcdb");
    build_from_text(&again, b"\n");
    assert_eq!(Mcdb::open(&again).unwrap().num_recs(), 0);
}

#[test]
fn large_values_cross_the_parser_buffer() {
    // Values larger than the parser's internal buffer arrive in pieces;
    // the incremental key hash and the data copy must both survive that.
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("large.mcdb");
    let key = vec![b'K'; 70 * 1024];
    let val = vec![b'V'; 200 * 1024];
    let mut text = Vec::new();
    {
        use std::io::Write;
        let mut c = Cursor::new(&mut text);
        write!(c, "+{},{}:", key.len(), val.len()).unwrap();
        c.write_all(&key).unwrap();
        c.write_all(b"->").unwrap();
        c.write_all(&val).unwrap();
        c.write_all(b"\n\n").unwrap();
    }
    build_from_text(&path, &text);

    let mut db = Mcdb::open(&path).unwrap();
    assert_eq!(db.find(&key), Some(val.as_slice()));
    assert_eq!(dump_of(&path), text);
}
