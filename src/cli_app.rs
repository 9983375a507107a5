//! Top-level CLI definition and dispatch.

use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{Shell as CompletionShell, generate};
use colored::{Colorize, control};
use serde_json::{Value, json};
use thiserror::Error;

use docdir_audit::core::config::Config;
use docdir_audit::core::errors::DdrError;
use docdir_audit::export::csv::CsvFile;
use docdir_audit::logger::LogSink;
use docdir_audit::logger::jsonl::{JsonlConfig, JsonlWriter};
use docdir_audit::logger::run_log::RunLogFile;
use docdir_audit::reconcile::engine::{EngineOptions, ReconciliationEngine};
use docdir_audit::reconcile::report::RunReport;
use docdir_audit::source::sqlite::SqliteSource;

/// DocDir audit: reconcile stored document paths against the filesystem.
#[derive(Debug, Parser)]
#[command(
    name = "ddr",
    author,
    version,
    about = "DocDir audit - check stored document paths against disk",
    long_about = None,
    arg_required_else_help = true
)]
pub struct Cli {
    /// Override config file path.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    /// Force JSON output mode.
    #[arg(long, global = true)]
    json: bool,
    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
    /// Increase verbosity.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,
    /// Quiet mode (errors only).
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Reconcile every document record and write the CSV report and run log.
    Run(RunArgs),
    /// Inspect configuration.
    Config(ConfigArgs),
    /// Generate shell completions.
    Completions(CompletionsArgs),
}

#[derive(Debug, Clone, Args, Default)]
struct RunArgs {
    /// Database to read document records from.
    #[arg(long, value_name = "PATH")]
    db: Option<PathBuf>,
    /// Destination of the CSV report.
    #[arg(long, value_name = "PATH")]
    csv: Option<PathBuf>,
    /// Destination of the run log.
    #[arg(long, value_name = "PATH")]
    log: Option<PathBuf>,
    /// Stat every record instead of indexing the document root.
    #[arg(long)]
    no_index: bool,
    /// Worker threads for indexing and existence checks.
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u16).range(1..))]
    parallelism: Option<u16>,
}

#[derive(Debug, Clone, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    command: Option<ConfigCommand>,
}

#[derive(Debug, Clone, Subcommand)]
enum ConfigCommand {
    /// Print resolved config file path.
    Path,
    /// Print the effective configuration.
    Show,
    /// Validate the configuration.
    Validate,
}

#[derive(Debug, Clone, Args)]
struct CompletionsArgs {
    /// Shell to generate completion script for.
    #[arg(value_enum)]
    shell: CompletionShell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputMode {
    Human,
    Json,
}

/// CLI error type with explicit exit-code mapping.
#[derive(Debug, Error)]
pub enum CliError {
    /// Invalid user input or configuration.
    #[error("{0}")]
    User(String),
    /// Environment/runtime failure, including a fatal run error.
    #[error("{0}")]
    Runtime(String),
    /// Internal bug or invariant violation.
    #[error("{0}")]
    Internal(String),
    /// JSON serialization failed.
    #[error("failed to serialize output: {0}")]
    Json(#[from] serde_json::Error),
    /// Output write failed.
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
}

impl CliError {
    /// Process exit code contract for the CLI.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::User(_) => 1,
            Self::Runtime(_) | Self::Io(_) => 2,
            Self::Internal(_) | Self::Json(_) => 3,
        }
    }
}

impl From<DdrError> for CliError {
    fn from(err: DdrError) -> Self {
        match err {
            DdrError::InvalidConfig { .. }
            | DdrError::MissingConfig { .. }
            | DdrError::ConfigParse { .. } => Self::User(err.to_string()),
            DdrError::ChannelClosed { .. } | DdrError::Runtime { .. } => {
                Self::Internal(err.to_string())
            }
            _ if err.is_root_failure() => Self::Runtime(format!(
                "{err} (check the document root setting in the database)"
            )),
            // Only auxiliary output fails without invalidating the run, so
            // seeing one here is a bug.
            _ if !err.is_fatal() => Self::Internal(err.to_string()),
            _ => Self::Runtime(err.to_string()),
        }
    }
}

/// Dispatch CLI commands.
pub fn run(cli: &Cli) -> Result<(), CliError> {
    if cli.no_color {
        control::set_override(false);
    }

    match &cli.command {
        Command::Run(args) => run_reconcile(cli, args),
        Command::Config(args) => run_config(cli, args),
        Command::Completions(args) => {
            let mut command = Cli::command();
            let binary_name = command.get_name().to_string();
            generate(args.shell, &mut command, binary_name, &mut io::stdout());
            Ok(())
        }
    }
}

fn run_reconcile(cli: &Cli, args: &RunArgs) -> Result<(), CliError> {
    let mut config = Config::load(cli.config.as_deref())?;
    apply_run_overrides(&mut config, args);
    config.validate()?;
    let hash = config.stable_hash()?;
    let mode = output_mode(cli);

    let mut log = RunLogFile::create(&config.output.log_path)?;
    let mut csv = CsvFile::new(&config.output.csv_path);
    let source = match SqliteSource::open(&config.database) {
        Ok(source) => source,
        Err(err) => return Err(startup_failure(mode, &config, &mut log, err)),
    };

    let mut engine = ReconciliationEngine::new(source, EngineOptions::from(&config.reconcile))
        .with_config_hash(hash);
    if let Some(path) = &config.output.event_log {
        engine = engine.with_events(JsonlWriter::shared(JsonlConfig::new(path)));
    }

    match engine.run(&mut csv, &mut log) {
        Ok(report) => {
            match mode {
                OutputMode::Human => {
                    if !cli.quiet {
                        print_run_summary(cli, &config, &report);
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "run",
                        "ok": true,
                        "csv": config.output.csv_path.to_string_lossy(),
                        "log": config.output.log_path.to_string_lossy(),
                        "summary": serde_json::to_value(report.summary())?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Err(err) => {
            if mode == OutputMode::Json {
                write_run_failure_json(&config, &err)?;
            }
            Err(err.into())
        }
    }
}

/// A failure before the engine starts still leaves a run log with one
/// failure line.
fn startup_failure(mode: OutputMode, config: &Config, log: &mut RunLogFile, err: DdrError) -> CliError {
    let mut report = RunReport::new();
    report.fail(&err.to_string(), Duration::ZERO);
    if let Err(log_err) = log.write_lines(report.log_lines()) {
        eprintln!("[DDR-LOG] could not write run log: {log_err}");
    }
    if mode == OutputMode::Json
        && let Err(out_err) = write_run_failure_json(config, &err)
    {
        return out_err;
    }
    err.into()
}

fn write_run_failure_json(config: &Config, err: &DdrError) -> Result<(), CliError> {
    let payload = json!({
        "command": "run",
        "ok": false,
        "code": err.code(),
        "error": err.to_string(),
        "root_failure": err.is_root_failure(),
        "log": config.output.log_path.to_string_lossy(),
    });
    write_json_line(&payload)
}

fn apply_run_overrides(config: &mut Config, args: &RunArgs) {
    if let Some(db) = &args.db {
        config.database.path.clone_from(db);
    }
    if let Some(csv) = &args.csv {
        config.output.csv_path.clone_from(csv);
    }
    if let Some(log) = &args.log {
        config.output.log_path.clone_from(log);
    }
    if args.no_index {
        config.reconcile.use_index = false;
    }
    if let Some(n) = args.parallelism {
        config.reconcile.parallelism = usize::from(n);
    }
}

fn print_run_summary(cli: &Cli, config: &Config, report: &RunReport) {
    let counts = report.counts();
    let summary = report.summary();

    println!("{}", "Reconciliation complete".bold().green());
    match report.root() {
        Some(root) => println!("  Root:      {}", root.display()),
        None => println!("  Root:      {}", "not configured".dimmed()),
    }
    println!("  Strategy:  {}", report.strategy());
    println!("  Records:   {}", counts.total);
    println!("  Found:     {}", counts.found.to_string().green());
    let missing = counts.missing.to_string();
    if counts.missing > 0 {
        println!("  Missing:   {}", missing.yellow());
    } else {
        println!("  Missing:   {missing}");
    }
    if counts.no_path > 0 {
        println!("    without a path: {}", counts.no_path);
    }
    if counts.unreadable > 0 {
        println!("    unreadable:     {}", counts.unreadable.to_string().red());
    }
    println!("  Elapsed:   {} ms", summary.elapsed_ms);
    println!("  CSV:       {}", config.output.csv_path.display());
    println!("  Log:       {}", config.output.log_path.display());

    if cli.verbose {
        if let Some(index) = &summary.index {
            println!(
                "  Index:     {} entries, {} directories, {} opaque, {} issues",
                index.entries, index.dirs_scanned, index.opaque, index.issues
            );
        }
        println!(
            "  Lookups:   {} via index, {} via stat",
            counts.via_index, counts.via_stat
        );
    }
}

fn run_config(cli: &Cli, args: &ConfigArgs) -> Result<(), CliError> {
    match &args.command {
        None | Some(ConfigCommand::Path) => {
            let path = cli.config.clone().unwrap_or_else(Config::default_path);
            let exists = path.exists();

            match output_mode(cli) {
                OutputMode::Human => {
                    println!("{}", path.display());
                    if !exists {
                        println!("  (file does not exist; defaults will be used)");
                    }
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config path",
                        "path": path.to_string_lossy(),
                        "exists": exists,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Show) => {
            let config = Config::load(cli.config.as_deref())?;

            match output_mode(cli) {
                OutputMode::Human => {
                    let toml_str = toml::to_string_pretty(&config)
                        .map_err(|e| CliError::Internal(format!("serialize config: {e}")))?;
                    println!("{toml_str}");
                }
                OutputMode::Json => {
                    let payload = json!({
                        "command": "config show",
                        "config": serde_json::to_value(&config)?,
                    });
                    write_json_line(&payload)?;
                }
            }
            Ok(())
        }
        Some(ConfigCommand::Validate) => match Config::load(cli.config.as_deref()) {
            Ok(config) => {
                let hash = config.stable_hash()?;

                match output_mode(cli) {
                    OutputMode::Human => {
                        println!("Configuration is valid.");
                        println!("  Source: {}", config.config_file.display());
                        println!("  Hash: {hash}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": true,
                            "path": config.config_file.to_string_lossy(),
                            "hash": hash,
                        });
                        write_json_line(&payload)?;
                    }
                }
                Ok(())
            }
            Err(e) => {
                match output_mode(cli) {
                    OutputMode::Human => {
                        eprintln!("Configuration is INVALID: {e}");
                    }
                    OutputMode::Json => {
                        let payload = json!({
                            "command": "config validate",
                            "valid": false,
                            "code": e.code(),
                            "error": e.to_string(),
                        });
                        write_json_line(&payload)?;
                    }
                }
                Err(CliError::User(format!("invalid config: {e}")))
            }
        },
    }
}

fn write_json_line(payload: &Value) -> Result<(), CliError> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer(&mut stdout, payload)?;
    writeln!(stdout)?;
    Ok(())
}

fn output_mode(cli: &Cli) -> OutputMode {
    let env_mode = std::env::var("DDR_OUTPUT_FORMAT").ok();
    resolve_output_mode(cli.json, env_mode.as_deref(), io::stdout().is_terminal())
}

fn resolve_output_mode(json_flag: bool, env_mode: Option<&str>, stdout_is_tty: bool) -> OutputMode {
    if json_flag {
        return OutputMode::Json;
    }

    let fallback = if stdout_is_tty {
        OutputMode::Human
    } else {
        OutputMode::Json
    };

    match env_mode
        .map(str::trim)
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("json") => OutputMode::Json,
        Some("human") => OutputMode::Human,
        _ => fallback,
    }
}
