mod config;

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use colored::Colorize;

use film_archive::archive::{ArchiveConfig, Archiver};
use film_archive::print_green;

#[derive(Parser)]
#[command(
    author,
    version,
    name = env!("CARGO_BIN_NAME"),
    about = "Classify film media files and copy them into a film archive layout"
)]
pub(crate) struct FilmSortArgs {
    /// Source directory to classify
    #[arg(value_hint = clap::ValueHint::DirPath)]
    source: Option<PathBuf>,

    /// Destination root for the sorted copies
    #[arg(short, long, value_hint = clap::ValueHint::DirPath)]
    destination: Option<PathBuf>,

    /// Film registry spreadsheet (xlsx, xls, ods or csv)
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    registry: Option<PathBuf>,

    /// Alternate titles JSON file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    titles: Option<PathBuf>,

    /// Decision cache JSON file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    cache: Option<PathBuf>,

    /// Audit log CSV file
    #[arg(short, long, value_hint = clap::ValueHint::FilePath)]
    log: Option<PathBuf>,

    /// Write an XLSX summary report
    #[arg(short = 'x', long, value_hint = clap::ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Number of files processed concurrently
    #[arg(short, long, name = "SIZE")]
    batch_size: Option<usize>,

    /// Override allowed file extensions
    #[arg(short, long, num_args = 1, action = clap::ArgAction::Append, name = "EXTENSION")]
    extension: Vec<String>,

    /// Additional ignore patterns
    #[arg(short, long, num_args = 1, action = clap::ArgAction::Append, name = "PATTERN")]
    ignore: Vec<String>,

    /// Enable the AI classifier fallback
    #[arg(short, long)]
    ai: bool,

    /// Plan and log everything without copying files
    #[arg(short, long)]
    print: bool,

    /// Print debug information
    #[arg(short = 'D', long)]
    debug: bool,

    /// Generate shell completion
    #[arg(short = 'L', long, name = "SHELL")]
    completion: Option<Shell>,

    /// Install shell completion instead of printing it
    #[arg(short = 'I', long, requires = "SHELL")]
    install: bool,

    /// Print verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = FilmSortArgs::parse();
    if let Some(ref shell) = args.completion {
        return film_archive::generate_shell_completion(
            *shell,
            FilmSortArgs::command(),
            args.install,
            env!("CARGO_BIN_NAME"),
        );
    }

    let user_config = ArchiveConfig::get_user_config()?;
    let config = config::build_config(args, user_config)?;

    let abort_flag = Arc::new(AtomicBool::new(false));
    let abort_flag_handler = Arc::clone(&abort_flag);
    ctrlc::set_handler(move || {
        if abort_flag_handler.load(Ordering::SeqCst) {
            // Second Ctrl+C exits without saving the decision cache.
            // The cache is saved after every AI decision, so only in-flight answers are lost
            // and they are recomputed on the next run.
            std::process::exit(130);
        }
        println!("\n{}", "Received Ctrl+C, finishing current batch...".yellow().bold());
        abort_flag_handler.store(true, Ordering::SeqCst);
    })?;

    let outcome = Archiver::new(config).with_abort_flag(abort_flag).run().await?;
    outcome.stats.print_summary(&outcome.log_path);
    if !outcome.aborted {
        print_green!("\n{outcome}");
    }
    Ok(())
}
