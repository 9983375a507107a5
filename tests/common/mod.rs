#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::{Connection, params};

pub struct CmdResult {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
    pub log_path: PathBuf,
}

fn now_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}

fn resolve_bin_path() -> PathBuf {
    if let Ok(path) = std::env::var("CARGO_BIN_EXE_ddr") {
        return PathBuf::from(path);
    }

    let exe_name = if cfg!(windows) { "ddr.exe" } else { "ddr" };
    let fallback = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(PathBuf::from))
        .and_then(|deps| deps.parent().map(PathBuf::from))
        .map(|debug_dir| debug_dir.join(exe_name));

    match fallback {
        Some(path) if path.exists() => path,
        _ => panic!("unable to resolve ddr binary path for integration test"),
    }
}

/// Run the `ddr` binary with `home` as `$HOME`, capturing a transcript of
/// the invocation under the system temp dir.
pub fn run_cli_case(case_name: &str, home: &Path, args: &[&str]) -> CmdResult {
    let root = std::env::temp_dir().join("ddr-test-logs");
    fs::create_dir_all(&root).expect("create temp test log dir");

    let log_path = root.join(format!("{}-{}.log", sanitize(case_name), now_millis()));
    let bin_path = resolve_bin_path();

    let output = Command::new(&bin_path)
        .args(args)
        .env("HOME", home)
        .env_remove("DDR_OUTPUT_FORMAT")
        .env("RUST_BACKTRACE", "1")
        .output()
        .expect("execute ddr command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();

    let transcript = format!(
        "case={case_name}\nbin={}\nargs={args:?}\nstatus={}\n----- stdout -----\n{stdout}\n----- stderr -----\n{stderr}\n",
        bin_path.display(),
        output.status
    );
    fs::write(&log_path, transcript).expect("write test log");

    CmdResult {
        status: output.status,
        stdout,
        stderr,
        log_path,
    }
}

/// One `document_events` row: (id, entity tag, matter, contact, doc_dir).
pub type EventRow<'a> = (i64, &'a str, Option<&'a str>, Option<&'a str>, Option<&'a str>);

/// Create a practice database with a `DocumentRoot` setting and the given events.
pub fn seed_database(path: &Path, root: Option<&str>, events: &[EventRow<'_>]) {
    let conn = Connection::open(path).expect("create database");
    conn.execute_batch(
        "CREATE TABLE settings (key TEXT PRIMARY KEY, value TEXT);
         CREATE TABLE document_events (
             id INTEGER PRIMARY KEY,
             event_type INTEGER,
             entity_type TEXT,
             matter_id TEXT,
             contact_id TEXT,
             doc_dir TEXT,
             subject TEXT,
             notes TEXT
         );",
    )
    .expect("create schema");
    if let Some(root) = root {
        conn.execute(
            "INSERT INTO settings (key, value) VALUES ('DocumentRoot', ?1)",
            params![root],
        )
        .expect("insert root");
    }
    for (id, tag, matter, contact, doc_dir) in events {
        conn.execute(
            "INSERT INTO document_events VALUES (?1, 4, ?2, ?3, ?4, ?5, 'subject', 'note, with comma')",
            params![id, tag, matter, contact, doc_dir],
        )
        .expect("insert event");
    }
}

/// Write a config file pointing at `db` with outputs under `out_dir`.
pub fn write_config(dir: &Path, db: &Path, out_dir: &Path, extra: &str) -> PathBuf {
    let path = dir.join("ddr.toml");
    let body = format!(
        "[database]\npath = {db:?}\n\n[output]\ncsv_path = {csv:?}\nlog_path = {log:?}\n{extra}\n",
        db = db.display().to_string(),
        csv = out_dir.join("audit.csv").display().to_string(),
        log = out_dir.join("audit.log").display().to_string(),
    );
    fs::write(&path, body).expect("write config");
    path
}
