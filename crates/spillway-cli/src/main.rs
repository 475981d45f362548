//! Spillway CLI - exercise spill collections from the command line.
//!
//! Probes codecs and runs synthetic list and map workloads against a given
//! configuration, reporting what was spilled.

mod commands;
mod config;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Spillway spill engine tool.
///
/// Runs bounded-memory list and map workloads and reports spill activity,
/// so thresholds and codecs can be tried before wiring them into a job.
#[derive(Parser)]
#[command(name = "spillway")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    format: OutputFormat,

    /// Suppress progress and info messages
    #[arg(long, short, global = true)]
    quiet: bool,

    /// Enable verbose debug logging
    #[arg(long, short, global = true)]
    verbose: bool,

    /// JSON file with a spill configuration (defaults apply to missing fields)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override a `spill.*` property, e.g. `--set spill.list.threshold=500`
    #[arg(long = "set", global = true, value_name = "KEY=VALUE", value_parser = config::parse_property)]
    properties: Vec<(String, String)>,
}

/// Output format options.
#[derive(Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    /// Human-readable table format (default for TTY)
    #[default]
    Table,
    /// Machine-readable JSON format
    Json,
}

/// Available commands.
#[derive(Subcommand)]
enum Commands {
    /// Probe codec names and show which one a spill would use
    Codecs {
        /// Codec names to probe, in priority order (default: configured list)
        names: Vec<String>,
    },

    /// Append synthetic tuples to a spillable list and read them back
    List {
        /// Number of tuples to append
        #[arg(short = 'n', long, default_value_t = 100_000)]
        count: u64,
    },

    /// Group synthetic tuples by key in a spillable map and read them back
    Map {
        /// Number of tuples to put
        #[arg(short = 'n', long, default_value_t = 100_000)]
        count: u64,

        /// Number of distinct keys
        #[arg(short, long, default_value_t = 1_000)]
        keys: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(std::io::stderr)
            .init();
    } else if !cli.quiet {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::INFO)
            .with_writer(std::io::stderr)
            .init();
    }

    let result = config::load(cli.config.as_deref(), &cli.properties).and_then(|config| {
        match cli.command {
            Commands::Codecs { names } => commands::codecs::run(&config, &names, cli.format, cli.quiet),
            Commands::List { count } => commands::list::run(&config, count, cli.format, cli.quiet),
            Commands::Map { count, keys } => {
                commands::map::run(&config, count, keys, cli.format, cli.quiet)
            }
        }
    });

    if let Err(e) = result {
        output::error(&format!("{e:#}"));
        std::process::exit(1);
    }
}
