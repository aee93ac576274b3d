//! Drives the installed mcdbctl binary end to end: make, dump, get,
//! stats, uniq, and the exit-code contract (0 / 100 / 101 / 111).

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tempfile::TempDir;

fn mcdbctl() -> PathBuf {
    // Set by Cargo when running integration tests.
    PathBuf::from(env!("CARGO_BIN_EXE_mcdbctl"))
}

fn run(args: &[&str]) -> Output {
    Command::new(mcdbctl())
        .args(args)
        .output()
        .expect("spawn mcdbctl")
}

fn make_db(dir: &Path, name: &str, text: &[u8]) -> PathBuf {
    let input = dir.join(format!("{}.txt", name));
    let db = dir.join(format!("{}.mcdb", name));
    std::fs::write(&input, text).unwrap();
    let out = run(&["make", db.to_str().unwrap(), input.to_str().unwrap()]);
    assert!(out.status.success(), "make failed: {:?}", out);
    db
}

#[test]
fn make_then_dump_round_trips() {
    let dir = TempDir::new().unwrap();
    let text = b"+3,5:one->Hello\n+3,5:two->World\n\n";
    let db = make_db(dir.path(), "rt", text);

    let out = run(&["dump", db.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(out.stdout, text);
}

#[test]
fn make_from_stdin() {
    let dir = TempDir::new().unwrap();
    let db = dir.path().join("stdin.mcdb");

    let mut child = Command::new(mcdbctl())
        .args(["make", db.to_str().unwrap(), "-"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    {
        use std::io::Write;
        child
            .stdin
            .take()
            .unwrap()
            .write_all(b"+1,2:k->vv\n\n")
            .unwrap();
    }
    let out = child.wait_with_output().unwrap();
    assert_eq!(out.status.code(), Some(0), "stderr: {:?}", out.stderr);

    let get = run(&["get", db.to_str().unwrap(), "k"]);
    assert_eq!(get.status.code(), Some(0));
    assert_eq!(get.stdout, b"vv\n");
}

#[test]
fn get_sequences_and_all() {
    let dir = TempDir::new().unwrap();
    let db = make_db(
        dir.path(),
        "multi",
        b"+1,1:a->1\n+1,1:a->2\n+1,1:a->3\n+1,1:b->x\n\n",
    );
    let db = db.to_str().unwrap();

    assert_eq!(run(&["get", db, "a"]).stdout, b"1\n");
    assert_eq!(run(&["get", db, "a", "1"]).stdout, b"2\n");
    assert_eq!(run(&["get", db, "a", "2"]).stdout, b"3\n");
    assert_eq!(run(&["get", db, "a", "all"]).stdout, b"1\n2\n3\n");

    // Sequence past the end behaves like a missing key.
    let out = run(&["get", db, "a", "3"]);
    assert_eq!(out.status.code(), Some(100));
    assert!(out.stdout.is_empty());
    assert!(out.stderr.is_empty());
}

#[test]
fn missing_key_exits_100_silently() {
    let dir = TempDir::new().unwrap();
    let db = make_db(dir.path(), "miss", b"+1,1:k->v\n\n");
    let out = run(&["get", db.to_str().unwrap(), "absent"]);
    assert_eq!(out.status.code(), Some(100));
    assert!(out.stdout.is_empty());
    assert!(out.stderr.is_empty());
}

#[test]
fn usage_errors_exit_101() {
    let out = run(&["frobnicate", "x"]);
    assert_eq!(out.status.code(), Some(101));

    let out = run(&[]);
    assert_eq!(out.status.code(), Some(101));

    let dir = TempDir::new().unwrap();
    let db = make_db(dir.path(), "u", b"+1,1:k->v\n\n");
    let out = run(&["uniq", db.to_str().unwrap(), "sideways"]);
    assert_eq!(out.status.code(), Some(101));
}

#[test]
fn unreadable_database_exits_111() {
    let out = run(&["dump", "/nonexistent/path/db.mcdb"]);
    assert_eq!(out.status.code(), Some(111));
    assert!(!out.stderr.is_empty());
}

#[test]
fn malformed_text_input_exits_111_and_leaves_no_database() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("bad.txt");
    let db = dir.path().join("bad.mcdb");
    std::fs::write(&input, b"+3,5:one=>Hello\n\n").unwrap();

    let out = run(&["make", db.to_str().unwrap(), input.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(111));
    assert!(!db.exists());
    // No stray temp siblings either.
    let leftovers: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .map(|e| e.unwrap().file_name())
        .filter(|n| n.to_string_lossy().starts_with("bad.mcdb"))
        .collect();
    assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
}

#[test]
fn stats_reports_record_count_and_histogram() {
    let dir = TempDir::new().unwrap();
    let db = make_db(dir.path(), "st", b"+1,1:a->1\n+1,1:b->2\n+1,1:c->3\n\n");
    let out = run(&["stats", db.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    let text = String::from_utf8(out.stdout).unwrap();
    assert!(text.starts_with("records 3\n"), "got: {}", text);
    assert!(text.contains("\nd0"));
    assert!(text.contains("\n>9"));
}

#[test]
fn uniq_keeps_first_or_last_value() {
    let dir = TempDir::new().unwrap();
    let text = b"+1,1:a->1\n+1,1:a->2\n+1,1:b->9\n\n";

    let db = make_db(dir.path(), "uf", text);
    let out = run(&["uniq", db.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(
        run(&["dump", db.to_str().unwrap()]).stdout,
        b"+1,1:a->1\n+1,1:b->9\n\n"
    );

    let db = make_db(dir.path(), "ul", text);
    let out = run(&["uniq", db.to_str().unwrap(), "last"]);
    assert_eq!(out.status.code(), Some(0));
    assert_eq!(
        run(&["dump", db.to_str().unwrap()]).stdout,
        b"+1,1:a->2\n+1,1:b->9\n\n"
    );
}

#[test]
fn uniq_on_already_unique_database_rewrites_nothing() {
    let dir = TempDir::new().unwrap();
    let db = make_db(dir.path(), "nu", b"+1,1:a->1\n+1,1:b->2\n\n");
    let before = std::fs::metadata(&db).unwrap().modified().unwrap();
    std::thread::sleep(std::time::Duration::from_millis(50));
    let out = run(&["uniq", db.to_str().unwrap()]);
    assert_eq!(out.status.code(), Some(0));
    let after = std::fs::metadata(&db).unwrap().modified().unwrap();
    assert_eq!(before, after);
}

#[test]
fn make_replaces_atomically_for_open_readers() {
    let dir = TempDir::new().unwrap();
    let db = make_db(dir.path(), "at", b"+1,3:k->one\n\n");

    // A reader opened before the rebuild keeps the old contents.
    let mut reader = mcdb::Mcdb::open(&db).unwrap();
    assert_eq!(reader.find(b"k"), Some(&b"one"[..]));

    // Distinct mtime for the replacement, for refresh to notice it.
    std::thread::sleep(std::time::Duration::from_millis(50));
    let input = dir.path().join("at2.txt");
    std::fs::write(&input, b"+1,3:k->two\n\n").unwrap();
    let out = run(&["make", db.to_str().unwrap(), input.to_str().unwrap()]);
    assert!(out.status.success());

    assert_eq!(reader.find(b"k"), Some(&b"one"[..]));
    reader.refresh().unwrap();
    assert_eq!(reader.find(b"k"), Some(&b"two"[..]));
}
