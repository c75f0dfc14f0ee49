//! Command-line surface: `seal`, `check`, `record` and `validate`, wired to
//! fixed, contractual exit codes so scripted callers can branch on them
//! without parsing output.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use crate::error::MhlError;
use crate::hash::HashFormat;
use crate::{check, manifest, record, seal};

pub const EXIT_OK: i32 = 0;
pub const EXIT_VERIFICATION_FAILURE: i32 = 12;
pub const EXIT_COMPLETENESS_FAILURE: i32 = 15;
/// `check`-only: files found on disk with no entry anywhere in history.
pub const EXIT_NEW_FILES_FOUND: i32 = 17;
/// `check`-only: the root has never been sealed.
pub const EXIT_NO_HISTORY: i32 = 20;

#[derive(Parser, Debug)]
#[command(name = "ascmhl")]
#[command(about = "Seal, check and record ASC MHL generations of a file tree")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Produce a new generation from the current state of a tree
    Seal {
        root_path: PathBuf,
        /// Raise log verbosity to debug
        #[arg(short, long)]
        verbose: bool,
        /// Also compute and record directory hashes
        #[arg(short = 'd', long = "directory-hashes")]
        directory_hashes: bool,
        /// Hash algorithm to use
        #[arg(short = 'h', long = "hash-format", value_name = "FORMAT", default_value = "xxh64")]
        format: String,
    },
    /// Verify a tree against its existing history without writing
    Check {
        root_path: PathBuf,
        #[arg(short, long)]
        verbose: bool,
    },
    /// Hash and record an explicit set of paths
    Record {
        root_path: PathBuf,
        paths: Vec<PathBuf>,
        #[arg(short, long)]
        verbose: bool,
        #[arg(short = 'h', long = "hash-format", value_name = "FORMAT", default_value = "xxh64")]
        format: String,
    },
    /// Validate a single manifest file's structure
    Validate { file_path: PathBuf },
}

/// Parses arguments from the process environment, runs the selected
/// command, and returns the process exit code.
pub fn run() -> i32 {
    let cli = Cli::parse();
    match cli.command {
        Command::Seal {
            root_path,
            verbose,
            directory_hashes,
            format,
        } => {
            crate::logging::init(verbose);
            run_seal(&root_path, &format, directory_hashes)
        }
        Command::Check { root_path, verbose } => {
            crate::logging::init(verbose);
            run_check(&root_path)
        }
        Command::Record {
            root_path,
            paths,
            verbose,
            format,
        } => {
            crate::logging::init(verbose);
            run_record(&root_path, &paths, &format)
        }
        Command::Validate { file_path } => run_validate(&file_path),
    }
}

fn run_seal(root_path: &std::path::Path, format: &str, directory_hashes: bool) -> i32 {
    let format = match HashFormat::from_str(format) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("{err}");
            return EXIT_VERIFICATION_FAILURE;
        }
    };

    match seal::seal(root_path, format, directory_hashes) {
        Ok(outcome) => {
            info!(
                generation = outcome.generation_number,
                mismatched = outcome.mismatched_paths.len(),
                missing = outcome.missing_paths.len(),
                "seal complete"
            );
            for path in &outcome.mismatched_paths {
                warn!(%path, "verification failed");
            }
            for path in &outcome.missing_paths {
                warn!(%path, "missing from filesystem");
            }
            for (path, message) in &outcome.io_failures {
                warn!(%path, %message, "unreadable");
            }
            if outcome.is_completeness_failure() {
                EXIT_COMPLETENESS_FAILURE
            } else if outcome.is_verification_failure() {
                EXIT_VERIFICATION_FAILURE
            } else {
                EXIT_OK
            }
        }
        Err(err) => {
            eprintln!("{err}");
            EXIT_VERIFICATION_FAILURE
        }
    }
}

fn run_check(root_path: &std::path::Path) -> i32 {
    match check::check(root_path) {
        Ok(outcome) => {
            info!(
                mismatched = outcome.mismatched_paths.len(),
                new_files = outcome.new_paths.len(),
                missing = outcome.missing_paths.len(),
                "check complete"
            );
            for path in &outcome.mismatched_paths {
                warn!(%path, "verification failed");
            }
            for path in &outcome.new_paths {
                warn!(%path, "new file, absent from history");
            }
            for path in &outcome.missing_paths {
                warn!(%path, "missing from filesystem");
            }
            for (path, message) in &outcome.io_failures {
                warn!(%path, %message, "unreadable");
            }
            if outcome.is_completeness_failure() {
                EXIT_COMPLETENESS_FAILURE
            } else if outcome.is_verification_failure() {
                EXIT_VERIFICATION_FAILURE
            } else if outcome.has_new_files() {
                EXIT_NEW_FILES_FOUND
            } else {
                EXIT_OK
            }
        }
        Err(MhlError::NoHistory(path)) => {
            eprintln!("no history found at {}", path.display());
            EXIT_NO_HISTORY
        }
        Err(err) => {
            eprintln!("{err}");
            EXIT_VERIFICATION_FAILURE
        }
    }
}

fn run_record(root_path: &std::path::Path, paths: &[PathBuf], format: &str) -> i32 {
    if paths.is_empty() {
        eprintln!("record requires at least one PATHS argument");
        return EXIT_VERIFICATION_FAILURE;
    }

    let format = match HashFormat::from_str(format) {
        Ok(f) => f,
        Err(err) => {
            eprintln!("{err}");
            return EXIT_VERIFICATION_FAILURE;
        }
    };

    match record::record(root_path, paths, format) {
        Ok(outcome) => {
            info!(generation = outcome.generation_number, "record complete");
            for path in &outcome.mismatched_paths {
                warn!(%path, "verification failed");
            }
            for (path, message) in &outcome.io_failures {
                warn!(%path, %message, "unreadable");
            }
            if outcome.is_verification_failure() {
                EXIT_VERIFICATION_FAILURE
            } else {
                EXIT_OK
            }
        }
        Err(err) => {
            eprintln!("{err}");
            EXIT_VERIFICATION_FAILURE
        }
    }
}

fn run_validate(file_path: &std::path::Path) -> i32 {
    let bytes = match std::fs::read(file_path) {
        Ok(b) => b,
        Err(source) => {
            eprintln!(
                "{}",
                MhlError::IoFailure {
                    path: file_path.to_path_buf(),
                    source,
                }
            );
            return EXIT_VERIFICATION_FAILURE;
        }
    };
    match manifest::validate_structure(file_path, &bytes) {
        Ok(()) => {
            info!(path = %file_path.display(), "manifest valid");
            EXIT_OK
        }
        Err(err) => {
            eprintln!("{err}");
            EXIT_VERIFICATION_FAILURE
        }
    }
}
