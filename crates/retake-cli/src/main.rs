//! Retake CLI
//!
//! Maintenance commands over a persisted review store: inspect what is due,
//! grade items by hand, manage the mistake ledger and render digests.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use retake_engine::{Config, EngineSnapshot, EngineState, MistakeRecord, Quality};
use retake_report::{json::JsonGenerator, MarkdownGenerator, ReviewDigest};
use tracing_subscriber::EnvFilter;

/// Retake - spaced review for practice items
///
/// Reads and updates the review store named by `storeFile` in retake.json.
#[derive(Parser, Debug)]
#[command(name = "retake")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (default: retake.json in current directory)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// Path to the review store, overriding the configured one
    #[arg(short, long, value_name = "FILE", global = true)]
    store: Option<String>,

    /// Enable verbose output (sets log level to debug)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List items that are due now
    Due,

    /// Show what grading an item would do, without saving
    Preview {
        /// Practice item id
        item: String,
        /// Score: 0-3 or forgot, struggled, good, perfect
        #[arg(value_parser = parse_quality)]
        quality: Quality,
    },

    /// Record an evaluation for an item
    Grade {
        /// Practice item id
        item: String,
        /// Score: 0-3 or forgot, struggled, good, perfect
        #[arg(value_parser = parse_quality)]
        quality: Quality,
        /// Seconds spent on the item
        #[arg(long, default_value_t = 0)]
        seconds: u32,
    },

    /// List ledger mistakes (unresolved only unless --all)
    Mistakes {
        /// Only show mistakes for this item
        #[arg(long, value_name = "ID")]
        item: Option<String>,
        /// Include resolved mistakes
        #[arg(long)]
        all: bool,
    },

    /// Mark a mistake as resolved
    Resolve {
        /// Mistake id, as shown by `retake mistakes`
        #[arg(value_name = "MISTAKE_ID")]
        id: String,
    },

    /// Render a review digest
    Report {
        /// Output format
        #[arg(long, value_enum, default_value_t = ReportFormat::Markdown)]
        format: ReportFormat,
        /// Write to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ReportFormat {
    Markdown,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // RUST_LOG wins over --verbose
    let filter = if args.verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    tracing::debug!(config = ?args.config, store = ?args.store, "Starting");

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref())?;
    let store_path = args
        .store
        .map_or_else(|| PathBuf::from(&config.store_file), PathBuf::from);
    let now = Utc::now();
    let mut state = load_state(&store_path).await?;

    match args.command {
        Command::Due => print_due(&state, now),
        Command::Preview { item, quality } => {
            let shown = state.schedule.preview(&item, quality, now);
            if shown.due {
                println!(
                    "{item}: quality {quality} -> every {} (next review {}, streak {})",
                    shown.interval,
                    format_date(shown.next_review),
                    shown.streak
                );
            } else {
                println!(
                    "{item}: not due until {}; grading now would not change its schedule",
                    format_date(shown.next_review)
                );
            }
        }
        Command::Grade {
            item,
            quality,
            seconds,
        } => {
            let record = state.schedule.record(&item, quality, now, seconds).clone();
            save_state(&state, &store_path, now).await?;
            tracing::info!(item_id = %item, quality = quality.value(), "Graded");
            println!(
                "{item}: every {}, next review {}, streak {}",
                record.interval,
                format_date(record.next_review),
                record.streak
            );
        }
        Command::Mistakes { item, all } => print_mistakes(&state, item.as_deref(), all),
        Command::Resolve { id } => {
            if !state.ledger.mark_resolved(&id) {
                anyhow::bail!(
                    "No mistake with id '{id}'\n\nSuggestion: Run `retake mistakes --all` to list ids"
                );
            }
            save_state(&state, &store_path, now).await?;
            println!("Resolved {id}");
        }
        Command::Report { format, output } => {
            let digest = ReviewDigest::from_state(&state, now, &config.report);
            write_report(&digest, format, output.as_deref())?;
        }
    }

    Ok(())
}

/// Loads configuration from the given path or the current directory.
fn load_config(config_path: Option<&str>) -> anyhow::Result<Config> {
    match config_path {
        Some(path_str) => {
            let path = Path::new(path_str);
            if !path.exists() {
                anyhow::bail!(
                    "Config file not found: '{}'\n\nSuggestion: Check the path or remove the --config flag to use defaults",
                    path.display()
                );
            }
            Config::load_from_file(path).map_err(|e| anyhow::anyhow!("{e}"))
        }
        None => Config::load().map_err(|e| anyhow::anyhow!("{e}")),
    }
}

/// Loads the store, starting empty when it does not exist yet.
async fn load_state(path: &Path) -> anyhow::Result<EngineState> {
    match EngineSnapshot::load(path).await {
        Ok(Some(snapshot)) => {
            tracing::debug!(
                path = %path.display(),
                items = snapshot.retention.len(),
                mistakes = snapshot.mistakes.len(),
                "Store loaded"
            );
            Ok(snapshot.into_state())
        }
        Ok(None) => {
            tracing::debug!(path = %path.display(), "No store yet, starting empty");
            Ok(EngineState::new())
        }
        Err(e) => Err(anyhow::anyhow!("{e}")),
    }
}

async fn save_state(state: &EngineState, path: &Path, now: DateTime<Utc>) -> anyhow::Result<()> {
    EngineSnapshot::capture(state, now)
        .save(path)
        .await
        .map_err(|e| {
            anyhow::anyhow!(
                "Failed to save store: {e}\n\nPath: {}\n\nSuggestion: Check that the directory is writable",
                path.display()
            )
        })
}

fn print_due(state: &EngineState, now: DateTime<Utc>) {
    let due = state.schedule.due_items(now);
    if due.is_empty() {
        println!("Nothing is due.");
        return;
    }

    println!("Due now ({}):", due.len());
    for record in due {
        let overdue = -record.days_until_due(now);
        let note = match overdue {
            0 => String::new(),
            1 => " (1 day overdue)".to_string(),
            d => format!(" ({d} days overdue)"),
        };
        println!(
            "  {}  every {}, streak {}{note}",
            record.item_id, record.interval, record.streak
        );
    }
}

fn print_mistakes(state: &EngineState, item: Option<&str>, all: bool) {
    let shown: Vec<&MistakeRecord> = state
        .ledger
        .records()
        .iter()
        .filter(|r| all || !r.is_resolved)
        .filter(|r| item.map_or(true, |id| r.item_id == id))
        .collect();

    if shown.is_empty() {
        println!("No mistakes recorded.");
        return;
    }

    for record in shown {
        let resolved = if record.is_resolved { " [resolved]" } else { "" };
        println!(
            "{}  {} ({}) x{}, last seen {}{resolved}",
            record.id,
            record.item_id,
            record.question_kind,
            record.failure_count,
            format_date(record.last_seen_at)
        );
        println!("    {}", record.context_snippet);
    }
}

fn write_report(
    digest: &ReviewDigest,
    format: ReportFormat,
    output: Option<&Path>,
) -> anyhow::Result<()> {
    match (format, output) {
        (ReportFormat::Json, Some(path)) => {
            JsonGenerator::new(digest).write_to_file(path, true)?;
            println!("JSON digest: {}", path.display());
        }
        (ReportFormat::Json, None) => {
            println!("{}", JsonGenerator::new(digest).generate_pretty()?);
        }
        (ReportFormat::Markdown, Some(path)) => {
            std::fs::write(path, MarkdownGenerator::new(digest).generate())?;
            println!("Markdown digest: {}", path.display());
        }
        (ReportFormat::Markdown, None) => {
            print!("{}", MarkdownGenerator::new(digest).generate());
        }
    }
    Ok(())
}

/// Accepts a score as a number or its name.
fn parse_quality(s: &str) -> Result<Quality, String> {
    match s.trim().to_lowercase().as_str() {
        "forgot" => Ok(Quality::Forgot),
        "struggled" => Ok(Quality::Struggled),
        "good" => Ok(Quality::Good),
        "perfect" => Ok(Quality::Perfect),
        other => other
            .parse::<u8>()
            .map_err(|_| format!("'{s}' is not a quality score"))
            .and_then(|value| Quality::try_from(value).map_err(|e| e.to_string())),
    }
}

fn format_date(dt: DateTime<Utc>) -> String {
    dt.format("%Y-%m-%d").to_string()
}
