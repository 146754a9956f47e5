//! Compliance requirement coverage reports from a questions CSV.

mod cli;
mod questions;
mod report;
mod requirements;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use opscheck::{exit_codes, logging};

use crate::cli::ReportOptions;
use crate::questions::LoadError;

/// Exit code when the questions CSV has no usable tag column.
const MISSING_COLUMNS: i32 = 3;

#[derive(Parser)]
#[command(
    name = "coverage",
    version,
    about = "Requirement coverage of assessment questions"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write coverage_report.csv, missing_evidence.csv and coverage_summary.json.
    Report {
        #[arg(long, env = "QCSV", default_value = "Fixes/questions.csv")]
        questions: PathBuf,
        #[arg(long, env = "OUT", default_value = "Fixes/reports")]
        out: PathBuf,
        /// Only count CR mentions found in tag columns.
        #[arg(long)]
        no_text_fallback: bool,
        /// Exit 1 when any requirement is uncovered.
        #[arg(long)]
        strict: bool,
    },
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let result = match cli.command {
        Command::Report {
            questions,
            out,
            no_text_fallback,
            strict,
        } => cli::report(&ReportOptions {
            questions: &questions,
            out_dir: &out,
            text_fallback: !no_text_fallback,
            strict,
        }),
    };
    let code = match result {
        Ok(code) => code,
        Err(err) => {
            eprintln!("ERR: {err:#}");
            match err.downcast_ref::<LoadError>() {
                Some(LoadError::MissingColumns { .. }) => MISSING_COLUMNS,
                Some(LoadError::MissingFile(_)) | None => exit_codes::INVALID,
            }
        }
    };
    std::process::exit(code);
}
