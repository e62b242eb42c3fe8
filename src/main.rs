//! Goroutine Trace Studio CLI
//!
//! Groups, names and filters goroutines from Go stack dumps and profiles.

use anyhow::Result;
use clap::{Parser, Subcommand};
use env_logger::Env;
use std::path::PathBuf;

use goroutine_trace_studio::commands::{
    display_settings, display_version, execute_analyze, validate_args, validate_report_file,
    AnalyzeArgs,
};

/// Goroutine Trace Studio - goroutine dump analysis
#[derive(Parser, Debug)]
#[command(name = "goroutine-trace")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

/// Available commands
#[derive(Subcommand, Debug)]
enum Commands {
    /// Load dumps and summarize their goroutines
    Analyze {
        /// Goroutine dumps, profiles or zip archives
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Settings TOML file
        #[arg(short, long, env = "GOROUTINE_TRACE_SETTINGS")]
        settings: Option<PathBuf>,

        /// Filter query, e.g. "lock wait:5+ state:select"
        #[arg(short, long)]
        filter: Option<String>,

        /// Number of stacks to list
        #[arg(long, default_value = "20")]
        top: usize,

        /// Output path for the JSON report
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print text summary to stdout
        #[arg(long)]
        summary: bool,
    },

    /// Validate a report JSON file
    Validate {
        /// Path to report JSON file
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Display settings information
    Settings {
        /// Print the default settings as TOML
        #[arg(long)]
        show: bool,
    },

    /// Display version information
    Version,
}

fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    // Execute command
    match cli.command {
        Commands::Analyze {
            files,
            settings,
            filter,
            top,
            output,
            summary,
        } => {
            let args = AnalyzeArgs {
                files,
                settings,
                filter,
                top,
                output,
                print_summary: summary,
            };

            // Validate args first
            validate_args(&args)?;

            execute_analyze(args)?;
        }

        Commands::Validate { file } => {
            validate_report_file(file)?;
        }

        Commands::Settings { show } => {
            display_settings(show)?;
        }

        Commands::Version => {
            display_version();
        }
    }

    Ok(())
}
