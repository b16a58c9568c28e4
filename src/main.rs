use std::path::PathBuf;

use clap::{Parser, Subcommand};
use roster_tools::workflow::{self, Summary};
use roster_tools::{Result, RunConfig, ToolError};
use tracing_subscriber::EnvFilter;

fn main() {
    let cli = Cli::parse();
    if let Err(error) = run(cli) {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    init_logging(cli.verbose)?;

    let summary = match cli.command {
        Command::Merge(args) => {
            let config = RunConfig::load(&args.config)?;
            workflow::merge_rosters(&config, &args.output)?
        }
        Command::Completion(args) => {
            let config = RunConfig::load(&args.config)?;
            workflow::completion_report(&config, &args.roster, &args.title, &args.output)?
        }
        Command::Grade(args) => {
            let config = RunConfig::load(&args.config)?;
            workflow::grade_writing(&config, &args.roster, &args.output)?
        }
    };
    print_summary(&summary);
    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| ToolError::Logging(error.to_string()))
}

fn print_summary(summary: &Summary) {
    println!("{summary}");
    if !summary.diagnostics.is_empty() {
        println!("See the Diagnostics sheet for rows that need review.");
    }
}

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Merge class rosters, track form completion and score ACE writing."
)]
struct Cli {
    /// Log progress at info level (overridden by RUST_LOG).
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Merge per-period gradebook exports into one master roster.
    Merge(MergeArgs),
    /// Report which students submitted a form.
    Completion(CompletionArgs),
    /// Score written responses with the ACE rubric.
    Grade(GradeArgs),
}

#[derive(clap::Args)]
struct MergeArgs {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Output workbook path.
    #[arg(long)]
    output: PathBuf,
}

#[derive(clap::Args)]
struct CompletionArgs {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Master roster (.xlsx or .csv).
    #[arg(long)]
    roster: PathBuf,

    /// Output workbook path.
    #[arg(long)]
    output: PathBuf,

    /// Assignment title used for the status column and sheet name.
    #[arg(long, default_value = "Assignment")]
    title: String,
}

#[derive(clap::Args)]
struct GradeArgs {
    /// Run configuration (JSON).
    #[arg(long)]
    config: PathBuf,

    /// Master roster (.xlsx or .csv).
    #[arg(long)]
    roster: PathBuf,

    /// Output workbook path.
    #[arg(long)]
    output: PathBuf,
}
