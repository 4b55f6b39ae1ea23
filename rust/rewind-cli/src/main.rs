//! `rewind`: inspect and validate trace logs written by the recorder.

use clap::{Parser, Subcommand};
use rewind_recorder::trace::record::{Record, COMMENT_PREFIX};
use rewind_recorder::{verify_log, LogStats, VerifyError};
use std::path::{Path, PathBuf};
use std::process;

fn green(s: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", s)
}
fn red(s: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", s)
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{}\x1b[0m", s)
}
fn gray(s: &str) -> String {
    format!("\x1b[90m{}\x1b[0m", s)
}
fn status_label(label: &str) -> String {
    format!("\x1b[1;32m{:>12}\x1b[0m", label)
}

#[derive(Parser)]
#[command(name = "rewind", version, about = "Inspect execution trace logs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check that a log is well formed and print its statistics
    Check {
        /// Path to the .rewind log
        file: PathBuf,
        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print a log with line numbers, highlighting definitions and comments
    Show {
        /// Path to the .rewind log
        file: PathBuf,
        /// Only print records with this name (e.g. PUSH_FRAME)
        #[arg(long)]
        only: Option<String>,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("cannot read log '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{0}")]
    Verify(#[from] VerifyError),
    #[error("cannot encode statistics: {0}")]
    Json(#[from] serde_json::Error),
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Check { file, json } => cmd_check(&file, json),
        Commands::Show { file, only } => cmd_show(&file, only.as_deref()),
    };
    if let Err(e) = result {
        eprintln!("{} {}", red("error:"), e);
        process::exit(1);
    }
}

fn read_log(path: &Path) -> Result<String, CliError> {
    tracing::debug!(path = %path.display(), "reading trace log");
    std::fs::read_to_string(path).map_err(|source| CliError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn cmd_check(path: &Path, json: bool) -> Result<(), CliError> {
    let stats = verify_log(&read_log(path)?)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!("{} {}", status_label("Verified"), cyan(&path.display().to_string()));
        print!("{}", format_stats(&stats));
        println!("{} log is well formed", green("✓"));
    }
    Ok(())
}

fn format_stats(stats: &LogStats) -> String {
    format!(
        "  records:       {}\n  definitions:   {}\n  references:    {}\n  deallocations: {}\n  frames:        {} pushed, {} popped (max depth {})\n  comments:      {}\n  live at end:   {}\n",
        stats.records,
        stats.definitions,
        stats.references,
        stats.deallocations,
        stats.frames_pushed,
        stats.frames_popped,
        stats.max_depth,
        stats.comments,
        stats.live_tokens,
    )
}

fn cmd_show(path: &Path, only: Option<&str>) -> Result<(), CliError> {
    let content = read_log(path)?;
    println!("{} {}", status_label("Showing"), cyan(&path.display().to_string()));
    for (idx, line) in content.lines().enumerate() {
        if let Some(rendered) = render_line(line, only) {
            println!("{} {}", gray(&format!("{:>6}", idx + 1)), rendered);
        }
    }
    Ok(())
}

/// Highlighted form of one log line, or `None` if `only` filters it out.
fn render_line(line: &str, only: Option<&str>) -> Option<String> {
    if line.starts_with(COMMENT_PREFIX) {
        return only.is_none().then(|| gray(line));
    }
    let record = Record::parse(line).ok();
    let name = record.as_ref().map_or("", Record::name);
    if only.is_some_and(|wanted| wanted != name) {
        return None;
    }
    Some(match record {
        Some(r) if r.is_definition() => cyan(line),
        Some(_) => line.to_string(),
        None => red(line),
    })
}
