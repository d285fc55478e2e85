//! tcdedup - deduplication engine for generated test cases
//!
//! CLI entry point with logging setup and global panic handler.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tcdedup::config::{tcdedup_home, Config};
use tcdedup::core::ProjectScope;
use tcdedup::error::exit_codes;
use tcdedup::storage::FileRecordStore;

/// Environment variable holding the log filter directives.
const LOG_ENV: &str = "TCDEDUP_LOG";

// =============================================================================
// CLI Definition
// =============================================================================

/// tcdedup - deduplication engine for generated test cases
#[derive(Parser)]
#[command(name = "tcdedup")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ingest a JSON file of generated test cases into a project
    Ingest {
        /// JSON file holding a record or an array of records
        file: PathBuf,
        /// Target project ID
        #[arg(long)]
        project: String,
        /// Project display name stored on new records
        #[arg(long)]
        project_name: Option<String>,
        /// Generator that produced the batch
        #[arg(long)]
        model: Option<String>,
        /// Source document name (repeatable)
        #[arg(long = "document")]
        documents: Vec<String>,
        /// Append to this session instead of starting a new one
        #[arg(long)]
        session: Option<String>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Remove near-duplicate records from stored projects
    Reconcile {
        /// Project ID, or "all" for every project
        #[arg(long, default_value = "all")]
        project: String,
        /// Maximum SimHash Hamming distance (default: from config)
        #[arg(long)]
        threshold: Option<u32>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Show the duplicate groups reconcile would act on
    Preview {
        /// Project ID, or "all" for every project
        #[arg(long, default_value = "all")]
        project: String,
        /// Maximum SimHash Hamming distance (default: from config)
        #[arg(long)]
        threshold: Option<u32>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Compute missing fingerprints and SimHash for stored records
    Backfill {
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Find stored records similar to a candidate
    Similar {
        /// JSON file holding the candidate record
        file: PathBuf,
        /// Project to search
        #[arg(long)]
        project: String,
        /// Minimum similarity score (default: from config)
        #[arg(long)]
        min: Option<f64>,
        /// Maximum number of matches
        #[arg(long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },

    /// Print fingerprints and SimHash for records in a file
    Fingerprint {
        /// JSON file holding a record or an array of records
        file: PathBuf,
        /// Output as JSON
        #[arg(long, short)]
        json: bool,
        /// Suppress output
        #[arg(long, short)]
        quiet: bool,
    },
}

// =============================================================================
// Main Entry Point
// =============================================================================

fn main() -> ExitCode {
    setup_panic_handler();
    init_tracing();

    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("tcdedup error: {}", e);
            ExitCode::from(exit_codes::ERROR as u8)
        }
    }
}

/// Install the stderr log subscriber.
///
/// Filter directives come from `TCDEDUP_LOG`; warnings only by default.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Set up the global panic handler.
///
/// On panic, logs to ~/.tcdedup/crash.log and exits with the error code.
fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|info| {
        eprintln!("tcdedup panic: {}", info);

        if let Some(home) = tcdedup_home() {
            let crash_log = home.join("crash.log");
            if let Ok(mut file) = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&crash_log)
            {
                let timestamp = chrono::Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
                let _ = writeln!(file, "[{}] {}", timestamp, info);
            }
        }

        std::process::exit(exit_codes::ERROR);
    }));
}

/// Run the CLI and return the exit code.
fn run() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = Config::load();

    match cli.command {
        Commands::Ingest {
            file,
            project,
            project_name,
            model,
            documents,
            session,
            json,
            quiet,
        } => {
            use tcdedup::cli::ingest::IngestCommandOptions;
            let options = IngestCommandOptions {
                json,
                quiet,
                project_id: project,
                project_name,
                model,
                documents,
                session_id: session,
            };
            run_ingest(&file, &options, config)
        }
        Commands::Reconcile {
            project,
            threshold,
            json,
            quiet,
        } => run_reconcile(&project, threshold, json, quiet, false, config),
        Commands::Preview {
            project,
            threshold,
            json,
            quiet,
        } => run_reconcile(&project, threshold, json, quiet, true, config),
        Commands::Backfill { json, quiet } => run_backfill(json, quiet, config),
        Commands::Similar {
            file,
            project,
            min,
            limit,
            json,
            quiet,
        } => run_similar(&file, project, min, limit, json, quiet, config),
        Commands::Fingerprint { file, json, quiet } => run_fingerprint(&file, json, quiet, &config),
    }
}

// =============================================================================
// Command Handlers
// =============================================================================

/// Convert a success boolean to an exit code.
fn success_to_exit_code(success: bool) -> ExitCode {
    if success {
        ExitCode::from(exit_codes::SUCCESS as u8)
    } else {
        ExitCode::from(exit_codes::ERROR as u8)
    }
}

/// Print formatted output unless it is empty.
fn emit(formatted: &str) {
    if !formatted.is_empty() {
        println!("{}", formatted);
    }
}

/// Open the file store at the configured data directory.
fn open_store(config: &Config) -> Result<FileRecordStore, Box<dyn std::error::Error>> {
    let dir = config
        .data_dir()
        .ok_or("could not determine data directory (no home directory)")?;
    Ok(FileRecordStore::with_dir(dir)?)
}

fn run_ingest(
    file: &Path,
    options: &tcdedup::cli::ingest::IngestCommandOptions,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tcdedup::cli::IngestCommand;

    let store = open_store(&config)?;
    let cmd = IngestCommand::new(store, config);

    let output = cmd.run(file, options);
    emit(&cmd.format_output(&output, options));

    Ok(success_to_exit_code(output.success))
}

fn run_reconcile(
    project: &str,
    threshold: Option<u32>,
    json: bool,
    quiet: bool,
    preview: bool,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tcdedup::cli::reconcile::{ReconcileCommand, ReconcileOptions};

    let store = open_store(&config)?;
    let cmd = ReconcileCommand::new(store, config);
    let options = ReconcileOptions {
        json,
        quiet,
        scope: ProjectScope::parse(project),
        threshold,
    };

    let success = if preview {
        let output = cmd.preview(&options);
        emit(&cmd.format_preview(&output, &options));
        output.success
    } else {
        let output = cmd.run(&options);
        emit(&cmd.format_output(&output, &options));
        output.success
    };

    Ok(success_to_exit_code(success))
}

fn run_backfill(
    json: bool,
    quiet: bool,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tcdedup::cli::backfill::{BackfillCommand, BackfillOptions};

    let store = open_store(&config)?;
    let cmd = BackfillCommand::new(store, config);
    let options = BackfillOptions { json, quiet };

    let output = cmd.run(&options);
    emit(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

#[allow(clippy::too_many_arguments)]
fn run_similar(
    file: &Path,
    project: String,
    min: Option<f64>,
    limit: Option<usize>,
    json: bool,
    quiet: bool,
    config: Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tcdedup::cli::inspect::{SimilarCommand, SimilarOptions};

    let store = open_store(&config)?;
    let cmd = SimilarCommand::new(store, config);
    let options = SimilarOptions {
        json,
        quiet,
        project_id: project,
        min_similarity: min,
        limit,
    };

    let output = cmd.run(file, &options);
    emit(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

fn run_fingerprint(
    file: &Path,
    json: bool,
    quiet: bool,
    config: &Config,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    use tcdedup::cli::inspect::{FingerprintCommand, FingerprintOptions};

    let cmd = FingerprintCommand::new(config);
    let options = FingerprintOptions { json, quiet };

    let output = cmd.run(file, &options);
    emit(&cmd.format_output(&output, &options));

    Ok(success_to_exit_code(output.success))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_success_to_exit_code() {
        assert_eq!(
            success_to_exit_code(true),
            ExitCode::from(exit_codes::SUCCESS as u8)
        );
        assert_eq!(
            success_to_exit_code(false),
            ExitCode::from(exit_codes::ERROR as u8)
        );
    }

    #[test]
    fn test_parse_ingest() {
        let cli = Cli::try_parse_from([
            "tcdedup",
            "ingest",
            "batch.json",
            "--project",
            "shop",
            "--document",
            "a.pdf",
            "--document",
            "b.pdf",
            "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                file,
                project,
                documents,
                json,
                session,
                ..
            } => {
                assert_eq!(file, PathBuf::from("batch.json"));
                assert_eq!(project, "shop");
                assert_eq!(documents, vec!["a.pdf", "b.pdf"]);
                assert!(json);
                assert!(session.is_none());
            }
            _ => panic!("expected ingest"),
        }
    }

    #[test]
    fn test_ingest_requires_project() {
        assert!(Cli::try_parse_from(["tcdedup", "ingest", "batch.json"]).is_err());
    }

    #[test]
    fn test_reconcile_defaults_to_all_projects() {
        let cli = Cli::try_parse_from(["tcdedup", "reconcile"]).unwrap();
        match cli.command {
            Commands::Reconcile {
                project, threshold, ..
            } => {
                assert_eq!(ProjectScope::parse(&project), ProjectScope::All);
                assert!(threshold.is_none());
            }
            _ => panic!("expected reconcile"),
        }
    }

    #[test]
    fn test_parse_similar() {
        let cli = Cli::try_parse_from([
            "tcdedup", "similar", "c.json", "--project", "shop", "--min", "0.8",
        ])
        .unwrap();
        match cli.command {
            Commands::Similar { min, limit, .. } => {
                assert_eq!(min, Some(0.8));
                assert!(limit.is_none());
            }
            _ => panic!("expected similar"),
        }
    }
}
