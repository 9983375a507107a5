//! End-to-end runs of the `ddr` binary against seeded databases.

mod common;

use std::fs;
use std::path::{Path, PathBuf};

use common::{EventRow, run_cli_case, seed_database, write_config};
use tempfile::TempDir;

struct Fixture {
    tmp: TempDir,
    docs: PathBuf,
    config: PathBuf,
}

impl Fixture {
    /// `<tmp>/docs/a.pdf` exists. `root` picks the `DocumentRoot` setting:
    /// `Some(None)` stores the docs dir, `Some(Some(v))` stores `v`, `None`
    /// stores nothing.
    fn new(root: Option<Option<&str>>, extra_config: &str) -> Self {
        let tmp = TempDir::new().unwrap();
        let docs = tmp.path().join("docs");
        fs::create_dir_all(&docs).unwrap();
        fs::write(docs.join("a.pdf"), b"%PDF").unwrap();

        let docs_str = docs.display().to_string();
        let a = format!("{docs_str}/a.pdf");
        let missing = format!("{docs_str}/missing.pdf");
        let events: Vec<EventRow<'_>> = vec![
            (1, "Matters", Some("M-1"), None, Some(a.as_str())),
            (2, "Contacts", None, Some("C-9"), Some("")),
            (3, "Matters", Some("M-2"), None, Some(missing.as_str())),
        ];
        let root_value = match root {
            Some(None) => Some(docs_str.as_str()),
            Some(Some(v)) => Some(v),
            None => None,
        };

        let db = tmp.path().join("practice.sqlite3");
        seed_database(&db, root_value, &events);
        let out = tmp.path().join("out");
        let config = write_config(tmp.path(), &db, &out, extra_config);
        Self { tmp, docs, config }
    }

    fn home(&self) -> &Path {
        self.tmp.path()
    }

    fn csv_path(&self) -> PathBuf {
        self.tmp.path().join("out").join("audit.csv")
    }

    fn log_path(&self) -> PathBuf {
        self.tmp.path().join("out").join("audit.log")
    }

    fn run(&self, case: &str, extra_args: &[&str]) -> common::CmdResult {
        let config = self.config.display().to_string();
        let mut args = vec!["--config", config.as_str(), "--json", "run"];
        args.extend_from_slice(extra_args);
        run_cli_case(case, self.home(), &args)
    }
}

fn exists_column(csv: &str) -> Vec<(String, String)> {
    let mut reader = csv::Reader::from_reader(csv.as_bytes());
    reader
        .records()
        .map(|r| {
            let r = r.unwrap();
            (r[0].to_string(), r[r.len() - 1].to_string())
        })
        .collect()
}

fn expected_flags() -> Vec<(String, String)> {
    vec![
        ("1".to_string(), "Y".to_string()),
        ("2".to_string(), "N".to_string()),
        ("3".to_string(), "N".to_string()),
    ]
}

#[test]
fn help_lists_subcommands() {
    let tmp = TempDir::new().unwrap();
    let result = run_cli_case("help", tmp.path(), &["--help"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    for cmd in ["run", "config", "completions"] {
        assert!(result.stdout.contains(cmd), "missing {cmd} in help");
    }
}

#[test]
fn run_with_root_reports_y_n_n() {
    let fx = Fixture::new(Some(None), "");
    let result = fx.run("run_with_root", &[]);
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let csv = fs::read_to_string(fx.csv_path()).unwrap();
    assert!(csv.starts_with(
        "id,event_type,entity_type,matter_id,contact_id,doc_dir,subject,notes,EXISTS\n"
    ));
    assert_eq!(exists_column(&csv), expected_flags());

    let log = fs::read_to_string(fx.log_path()).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.iter().filter(|l| l.starts_with("record ")).count(), 3);
    assert!(lines.last().unwrap().starts_with("RUN COMPLETE"));
    assert!(lines[0].contains(&fx.docs.display().to_string()));

    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["ok"], true);
    assert_eq!(payload["summary"]["strategy"], "indexed");
    assert_eq!(payload["summary"]["counts"]["found"], 1);
}

#[test]
fn run_without_root_stats_each_path() {
    let fx = Fixture::new(None, "");
    let result = fx.run("run_without_root", &[]);
    assert!(result.status.success(), "log: {}", result.log_path.display());

    let csv = fs::read_to_string(fx.csv_path()).unwrap();
    assert_eq!(exists_column(&csv), expected_flags());
    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["summary"]["strategy"], "direct-stat");
    assert_eq!(payload["summary"]["counts"]["via_index"], 0);
}

#[test]
fn missing_root_aborts_without_csv() {
    let fx = Fixture::new(Some(Some("/definitely/not/here/ddr-docs")), "");
    let result = fx.run("missing_root", &[]);
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    assert!(!fx.csv_path().exists());

    let log = fs::read_to_string(fx.log_path()).unwrap();
    assert!(!log.lines().any(|l| l.starts_with("record ")));
    let last = log.lines().last().unwrap();
    assert!(last.starts_with("RUN FAILED"), "{last}");
    assert!(last.contains("DDR-2001"), "{last}");

    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["ok"], false);
    assert_eq!(payload["code"], "DDR-2001");
    assert_eq!(payload["root_failure"], true);
}

#[test]
fn failed_run_keeps_previous_csv_untouched() {
    let fx = Fixture::new(Some(Some("/definitely/not/here/ddr-docs")), "");
    fs::create_dir_all(fx.csv_path().parent().unwrap()).unwrap();
    fs::write(fx.csv_path(), "previous report\n").unwrap();

    let result = fx.run("failed_run_keeps_csv", &[]);
    assert!(!result.status.success());
    assert_eq!(fs::read_to_string(fx.csv_path()).unwrap(), "previous report\n");
}

#[test]
fn missing_database_is_fatal_and_logged() {
    let fx = Fixture::new(Some(None), "");
    let bogus = fx.home().join("nope.sqlite3").display().to_string();
    let result = fx.run("missing_database", &["--db", &bogus]);
    assert_eq!(result.status.code(), Some(2), "log: {}", result.log_path.display());
    assert!(!fx.csv_path().exists());
    let log = fs::read_to_string(fx.log_path()).unwrap();
    assert!(log.lines().last().unwrap().contains("DDR-2101"));
}

#[test]
fn repeated_runs_produce_identical_csv() {
    let fx = Fixture::new(Some(None), "");
    assert!(fx.run("idempotent_1", &[]).status.success());
    let first = fs::read_to_string(fx.csv_path()).unwrap();
    assert!(fx.run("idempotent_2", &[]).status.success());
    let second = fs::read_to_string(fx.csv_path()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn no_index_flag_matches_indexed_output() {
    let fx = Fixture::new(Some(None), "");
    assert!(fx.run("indexed", &[]).status.success());
    let indexed = fs::read_to_string(fx.csv_path()).unwrap();

    let result = fx.run("no_index", &["--no-index", "--parallelism", "1"]);
    assert!(result.status.success(), "log: {}", result.log_path.display());
    let direct = fs::read_to_string(fx.csv_path()).unwrap();
    assert_eq!(indexed, direct);
}

#[test]
fn event_log_records_the_run() {
    let tmp_events = TempDir::new().unwrap();
    let events = tmp_events.path().join("events.jsonl");
    let extra = format!("event_log = {:?}", events.display().to_string());
    let fx = Fixture::new(Some(None), &extra);
    assert!(fx.run("event_log", &[]).status.success());

    let kinds: Vec<String> = fs::read_to_string(&events)
        .unwrap()
        .lines()
        .map(|l| {
            let v: serde_json::Value = serde_json::from_str(l).unwrap();
            v["event"].as_str().unwrap().to_string()
        })
        .collect();
    assert_eq!(kinds.first().map(String::as_str), Some("run_start"));
    assert_eq!(kinds.last().map(String::as_str), Some("run_complete"));
    assert!(kinds.iter().any(|k| k == "index_built"));
}

#[test]
fn invalid_config_exits_with_user_error() {
    let fx = Fixture::new(Some(None), "");
    let bad = fx.home().join("bad.toml");
    fs::write(&bad, "[reconcile]\nparallelism = 0\n").unwrap();
    let bad_str = bad.display().to_string();

    let result = run_cli_case(
        "invalid_config",
        fx.home(),
        &["--config", &bad_str, "--json", "config", "validate"],
    );
    assert_eq!(result.status.code(), Some(1), "log: {}", result.log_path.display());
    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    assert_eq!(payload["valid"], false);
}

#[test]
fn config_path_defaults_under_home() {
    let tmp = TempDir::new().unwrap();
    let result = run_cli_case("config_path", tmp.path(), &["--json", "config", "path"]);
    assert!(result.status.success());
    let payload: serde_json::Value = serde_json::from_str(result.stdout.trim()).unwrap();
    let expected = tmp.path().join(".config").join("ddr").join("config.toml");
    assert_eq!(payload["path"], expected.display().to_string());
    assert_eq!(payload["exists"], false);
}

#[test]
fn completions_generate_for_bash() {
    let tmp = TempDir::new().unwrap();
    let result = run_cli_case("completions", tmp.path(), &["completions", "bash"]);
    assert!(result.status.success());
    assert!(result.stdout.contains("ddr"));
}
