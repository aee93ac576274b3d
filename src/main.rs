//! mcdbctl: build, inspect, and query mcdb files.
//!
//! ```text
//! mcdbctl make  <fname.mcdb> <datafile|->
//! mcdbctl dump  <fname.mcdb>
//! mcdbctl stats <fname.mcdb>
//! mcdbctl get   <fname.mcdb> <key> [seq|"all"]
//! mcdbctl uniq  <fname.mcdb> ["first"|"last"]
//! ```
//!
//! Exit codes: 0 on success, 100 when a queried key is absent, 101 on bad
//! usage, 111 on any other error. This binary is the one place errors are
//! rendered to stderr; the library only returns them.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::process;

use clap::{Arg, ArgMatches, Command};
use memmap2::Advice;

use mcdb::{textfmt, Error, Mcdb, McdbWriter};

fn cli() -> Command {
    Command::new("mcdbctl")
        .about("mcdb command line tool: make, get, dump, stats, uniq")
        .subcommand_required(true)
        .subcommand(
            Command::new("make")
                .about("Build a database from text input, atomically replacing the target")
                .arg(Arg::new("fname").required(true).help("database file to (re)create"))
                .arg(Arg::new("input").required(true).help("text input file, or - for stdin")),
        )
        .subcommand(
            Command::new("dump")
                .about("Write the whole database as text to stdout")
                .arg(Arg::new("fname").required(true)),
        )
        .subcommand(
            Command::new("stats")
                .about("Re-find every record and print a probe-depth histogram")
                .arg(Arg::new("fname").required(true)),
        )
        .subcommand(
            Command::new("get")
                .about("Print the value(s) stored under a key")
                .arg(Arg::new("fname").required(true))
                .arg(Arg::new("key").required(true))
                .arg(Arg::new("seq").help("0-based value index, or \"all\"")),
        )
        .subcommand(
            Command::new("uniq")
                .about("Rebuild keeping one value per key if duplicates exist")
                .arg(Arg::new("fname").required(true))
                .arg(Arg::new("keep").help("\"first\" (default) or \"last\"")),
        )
}

fn main() {
    let matches = match cli().try_get_matches() {
        Ok(m) => m,
        Err(e) => {
            // Help and version are not usage errors.
            let code = if e.use_stderr() { 101 } else { 0 };
            let _ = e.print();
            process::exit(code);
        }
    };
    let code = match run(&matches) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("mcdbctl: {}", e);
            e.exit_code()
        }
    };
    process::exit(code);
}

fn run(matches: &ArgMatches) -> Result<i32, Error> {
    let arg = |m: &ArgMatches, name: &str| -> String {
        m.get_one::<String>(name).cloned().unwrap_or_default()
    };
    match matches.subcommand() {
        Some(("make", m)) => cmd_make(&arg(m, "fname"), &arg(m, "input")),
        Some(("dump", m)) => cmd_dump(&arg(m, "fname")),
        Some(("stats", m)) => cmd_stats(&arg(m, "fname")),
        Some(("get", m)) => cmd_get(
            &arg(m, "fname"),
            &arg(m, "key"),
            m.get_one::<String>("seq").map(|s| s.as_str()),
        ),
        Some(("uniq", m)) => cmd_uniq(
            &arg(m, "fname"),
            m.get_one::<String>("keep").map(|s| s.as_str()),
        ),
        _ => Err(Error::Usage),
    }
}

fn cmd_make(fname: &str, input: &str) -> Result<i32, Error> {
    let mut writer = McdbWriter::create(fname)?;
    if input == "-" {
        textfmt::parse_into(io::stdin().lock(), writer.make_mut())?;
    } else {
        let file = File::open(input).map_err(|e| Error::read(&e))?;
        let len = file
            .metadata()
            .map_err(|e| Error::read(&e))?
            .len();
        if len == 0 {
            // A valid stream carries at least the blank terminator line.
            return Err(Error::ReadFormat);
        }
        let text = unsafe { memmap2::Mmap::map(&file) }.map_err(|e| Error::read(&e))?;
        let _ = text.advise(Advice::Sequential);
        let _ = text.advise(Advice::WillNeed);
        textfmt::parse_into(&text[..], writer.make_mut())?;
    }
    writer.finish(true)?;
    Ok(0)
}

fn cmd_dump(fname: &str) -> Result<i32, Error> {
    let db = Mcdb::open(fname)?;
    let _ = db.snapshot().advise(Advice::Sequential);
    let _ = db.snapshot().advise(Advice::WillNeed);
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    textfmt::dump(&db, &mut out)?;
    Ok(0)
}

fn cmd_stats(fname: &str) -> Result<i32, Error> {
    let db = Mcdb::open(fname)?;
    let _ = db.snapshot().advise(Advice::Sequential);
    let _ = db.snapshot().advise(Advice::WillNeed);
    db.validate_slots()?;

    // Re-find every record, counting how deep in its probe chain it sits.
    let mut finder = Mcdb::with_map(db.snapshot());
    let mut nrec: u64 = 0;
    let mut depth = [0u64; 11];
    let mut it = db.iter();
    while let Some((key, _)) = it.next() {
        let want = it.data_pos();
        let mut found = finder.find(key).is_some();
        while found && finder.data_pos() != want {
            found = finder.find_next(key).is_some();
        }
        if !found {
            return Err(Error::ReadFormat);
        }
        depth[(finder.probes() as usize - 1).min(10)] += 1;
        nrec += 1;
    }

    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    writeln!(out, "records {}", nrec).map_err(|e| Error::write(&e))?;
    for d in 0..10 {
        writeln!(out, "d{}      {}", d, depth[d]).map_err(|e| Error::write(&e))?;
    }
    writeln!(out, ">9      {}", depth[10]).map_err(|e| Error::write(&e))?;
    out.flush().map_err(|e| Error::write(&e))?;
    Ok(0)
}

fn cmd_get(fname: &str, key: &str, seq: Option<&str>) -> Result<i32, Error> {
    enum Which {
        Seq(u64),
        All,
    }
    let which = match seq {
        None => Which::Seq(0),
        Some("all") => Which::All,
        Some(s) => Which::Seq(s.parse().map_err(|_| Error::Usage)?),
    };

    let mut db = Mcdb::open(fname)?;
    let key = key.as_bytes();
    let stdout = io::stdout();
    let mut out = BufWriter::new(stdout.lock());
    match which {
        Which::Seq(seq) => {
            if db.find(key).is_none() {
                return Ok(100);
            }
            for _ in 0..seq {
                if db.find_next(key).is_none() {
                    return Ok(100);
                }
            }
            out.write_all(db.data()).map_err(|e| Error::write(&e))?;
            out.write_all(b"\n").map_err(|e| Error::write(&e))?;
        }
        Which::All => {
            if db.find(key).is_none() {
                return Ok(100);
            }
            loop {
                out.write_all(db.data()).map_err(|e| Error::write(&e))?;
                out.write_all(b"\n").map_err(|e| Error::write(&e))?;
                if db.find_next(key).is_none() {
                    break;
                }
            }
        }
    }
    out.flush().map_err(|e| Error::write(&e))?;
    Ok(0)
}

fn cmd_uniq(fname: &str, keep: Option<&str>) -> Result<i32, Error> {
    let keep_first = match keep {
        None | Some("first") => true,
        Some("last") => false,
        Some(_) => return Err(Error::Usage),
    };

    let db = Mcdb::open(fname)?;
    let _ = db.snapshot().advise(Advice::Sequential);
    let _ = db.snapshot().advise(Advice::WillNeed);
    db.validate_slots()?;

    if unique_keys(&db)? {
        return Ok(0);
    }
    rewrite_unique(&db, fname, keep_first)
}

fn unique_keys(db: &Mcdb) -> Result<bool, Error> {
    let mut finder = Mcdb::with_map(db.snapshot());
    for (key, _) in db.iter() {
        if finder.find(key).is_none() {
            // Every iterated record must be findable.
            return Err(Error::ReadFormat);
        }
        if finder.find_next(key).is_some() {
            return Ok(false);
        }
    }
    Ok(true)
}

fn rewrite_unique(db: &Mcdb, fname: &str, keep_first: bool) -> Result<i32, Error> {
    let snap = db.snapshot();
    let bytes = snap.bytes();
    let mut writer = McdbWriter::create(fname)?;
    let mut finder = Mcdb::with_map(db.snapshot());
    let mut it = db.iter();
    while let Some((key, data)) = it.next() {
        let pos = it.data_pos();
        if finder.find(key).is_none() {
            return Err(Error::ReadFormat);
        }
        if finder.data_pos() != pos {
            // Not the key's first record; it was handled when the first
            // occurrence came by.
            continue;
        }
        if keep_first {
            writer.add(key, data)?;
        } else {
            let mut last = (finder.data_pos(), finder.data_len());
            while finder.find_next(key).is_some() {
                last = (finder.data_pos(), finder.data_len());
            }
            let (dpos, dlen) = (last.0 as usize, last.1 as usize);
            writer.add(key, &bytes[dpos..dpos + dlen])?;
        }
    }
    writer.finish(true)?;
    Ok(0)
}
