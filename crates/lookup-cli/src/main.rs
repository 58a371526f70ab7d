use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;
mod config;

use commands::*;
use config::{Config, OutputFormat};

#[derive(Parser)]
#[command(name = "lookup")]
#[command(author, version, about = "Caching database lookup over CSV row streams", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Display configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Do not print the banner
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a lookup step over a CSV input
    Run {
        /// Step configuration (JSON)
        #[arg(short, long)]
        step: PathBuf,

        /// Lookup tables to load (format: name=path.csv)
        #[arg(short, long, required = true)]
        table: Vec<String>,

        /// Input rows (CSV with header)
        #[arg(short, long)]
        input: PathBuf,

        /// Output format, overrides the display configuration
        #[arg(short, long, value_enum)]
        output: Option<OutputFormat>,
    },

    /// Describe a lookup table loaded from CSV
    Describe {
        /// Table to load (format: name=path.csv)
        #[arg(short, long)]
        table: String,
    },

    /// Validate a step configuration and show its SQL
    Validate {
        /// Step configuration (JSON)
        #[arg(short, long)]
        step: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.verbose)?;

    let mut config = if let Some(config_path) = &cli.config {
        Config::from_file(config_path)?
    } else {
        Config::default()
    };

    if !cli.quiet {
        print_banner();
    }

    match cli.command {
        Commands::Run {
            step,
            table,
            input,
            output,
        } => {
            if let Some(format) = output {
                config.output_format = format;
            }
            run_lookup(&config, &step, &table, &input)?;
        }
        Commands::Describe { table } => {
            describe_table(&table)?;
        }
        Commands::Validate { step } => {
            validate_step(&step)?;
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        "lookup_cli=debug,lookup_core=debug,lookup_cache=debug,lookup_step=debug,lookup_storage=debug"
    } else {
        "lookup_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    Ok(())
}

fn print_banner() {
    eprintln!(
        "{}",
        r#"
  _                _
 | |    ___   ___ | | ___   _ _ __
 | |   / _ \ / _ \| |/ / | | | '_ \
 | |__| (_) | (_) |   <| |_| | |_) |
 |_____\___/ \___/|_|\_\\__,_| .__/
                             |_|
    "#
        .bright_cyan()
    );
    eprintln!(
        "{}",
        format!("Caching Database Lookup v{}\n", env!("CARGO_PKG_VERSION")).bright_yellow()
    );
}
