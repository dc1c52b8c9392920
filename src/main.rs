use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use llm_router::doctor;
use llm_router::trace::TraceRecord;

#[derive(Parser)]
#[command(name = "llm-router", version, about = "LLM router diagnostics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate config file and environment; exit 0 if healthy
    Doctor {
        /// Path to config TOML
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
        /// Role to dry-run (default: config default_role)
        #[arg(long, value_name = "ROLE")]
        role: Option<String>,
    },
    /// Print example config TOML to stdout
    Template,
    /// Show recent trace summaries
    Trace {
        /// Number of traces to show
        #[arg(long, default_value_t = 10, value_name = "N")]
        last: usize,
        /// Trace directory (default: .llm-router/traces)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    load_env();

    let cli = Cli::parse();
    match cli.command {
        Command::Doctor { config, role } => Ok(run_doctor(&config, role.as_deref())),
        Command::Template => {
            print!("{}", doctor::template());
            Ok(ExitCode::SUCCESS)
        }
        Command::Trace { last, dir } => run_trace(dir, last),
    }
}

/// `.env` next to the binary, then the cargo project root for development
/// builds, then dotenvy's default CWD search.
fn load_env() {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(std::path::Path::to_path_buf));
    if let Some(dir) = exe_dir {
        for candidate in [dir.join(".env"), dir.join("../../.env")] {
            if candidate.exists() {
                dotenvy::from_path(&candidate).ok();
                return;
            }
        }
    }
    dotenvy::dotenv().ok();
}

fn run_doctor(config: &std::path::Path, role: Option<&str>) -> ExitCode {
    println!("LLM Router Doctor");
    println!("Config: {}", config.display());
    println!();

    let registry = llm_router::dispatch::registry::snapshot();
    let report = doctor::check_config(config, role, &registry);

    for w in &report.warnings {
        println!("  warn   {w}");
    }
    for e in &report.errors {
        eprintln!("  error  {e}");
    }

    if report.errors.is_empty() && report.warnings.is_empty() {
        println!("  ok     all checks passed");
    } else if report.errors.is_empty() {
        println!("\n  ok     {} warning(s), no blocking errors", report.warnings.len());
    }

    if report.is_healthy() {
        ExitCode::SUCCESS
    } else {
        eprintln!("\nStatus: {} error(s) found", report.errors.len());
        ExitCode::FAILURE
    }
}

fn run_trace(dir: Option<PathBuf>, last: usize) -> anyhow::Result<ExitCode> {
    let dir = dir.unwrap_or_else(doctor::default_trace_dir);
    if !dir.exists() {
        eprintln!("No trace directory found: {}", dir.display());
        return Ok(ExitCode::FAILURE);
    }

    let files = doctor::recent_trace_files(&dir, last)?;
    if files.is_empty() {
        println!("No traces found.");
        return Ok(ExitCode::SUCCESS);
    }

    for path in files {
        let parsed = std::fs::read_to_string(&path)
            .map_err(anyhow::Error::from)
            .and_then(|text| Ok(serde_json::from_str::<TraceRecord>(&text)?));
        match parsed {
            Ok(trace) => println!("{}", doctor::summarize(&trace)),
            Err(e) => eprintln!("  [could not parse {}: {e}]", path.display()),
        }
    }
    Ok(ExitCode::SUCCESS)
}
