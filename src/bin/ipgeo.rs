mod cli_utils;
mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

use commands::{cmd_build, cmd_bulk, cmd_inspect, cmd_query, cmd_watch};

#[derive(Parser)]
#[command(name = "ipgeo")]
#[command(
    about = "IP geolocation resolution engine",
    long_about = "ipgeo - IP geolocation resolution with longest-prefix matching\n\n\
    Build snapshots from CSV exports of network prefixes with geo metadata, then\n\
    resolve addresses (longest-prefix match) or CIDRs (exact match) against them.\n\n\
    Examples:\n\
      ipgeo build geoip.csv -o geoip.snap\n\
      ipgeo query geoip.snap '10.1.2.3'\n\
      ipgeo query geoip.snap '10.1.2.3,2001:db8::1'\n\
      ipgeo query geoip.csv '10.0.0.0/8' --csv\n\
      echo '[\"10.1.2.3\"]' | ipgeo bulk geoip.snap\n\
      ipgeo inspect geoip.snap --json\n\
      ipgeo watch geoip.csv --csv"
)]
#[command(version)]
struct Cli {
    /// Log debug detail (skipped rows, duplicates) to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a snapshot from CSV files
    Build {
        /// CSV files with a header row and a 'cidr' column (.gz supported, "-" for stdin)
        #[arg(value_name = "INPUT", required = true, env = "IPGEO_CSV_PATH")]
        inputs: Vec<PathBuf>,

        /// Output snapshot file
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Source name for rows without a 'source' column
        #[arg(long, default_value = ipgeo::builder::DEFAULT_SOURCE)]
        source: String,

        /// Confidence (0-100) for rows without a 'confidence' column
        #[arg(long, default_value_t = ipgeo::builder::DEFAULT_CONFIDENCE)]
        confidence: u8,

        /// Records committed to the index per batch
        #[arg(long, default_value_t = ipgeo::builder::DEFAULT_BATCH_SIZE)]
        batch_size: usize,
    },

    /// Resolve an address, a CIDR, or a comma-separated list
    Query {
        /// Snapshot file, or a CSV file with --csv
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Address, CIDR, or comma-separated list
        #[arg(value_name = "QUERY")]
        query: String,

        /// Build from the input as CSV rows instead of opening a snapshot
        #[arg(long)]
        csv: bool,

        /// Quiet mode - no output, only exit code (0 = found, 1 = not found)
        #[arg(short, long)]
        quiet: bool,
    },

    /// Resolve a JSON array of inputs read from stdin
    Bulk {
        /// Snapshot file
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,
    },

    /// Inspect a snapshot file
    Inspect {
        /// Snapshot file
        #[arg(value_name = "SNAPSHOT")]
        snapshot: PathBuf,

        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Serve queries from stdin while hot-reloading a watched file
    Watch {
        /// CSV or snapshot file to watch
        #[arg(value_name = "INPUT")]
        input: PathBuf,

        /// Treat the input as CSV rows instead of a snapshot
        #[arg(long)]
        csv: bool,

        /// Quiet period in milliseconds before reloading a changed file
        #[arg(long, default_value_t = 200)]
        debounce_ms: u64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    cli_utils::init_logging(cli.verbose);

    match cli.command {
        Commands::Build {
            inputs,
            output,
            source,
            confidence,
            batch_size,
        } => cmd_build(inputs, output, source, confidence, batch_size),
        Commands::Query {
            input,
            query,
            csv,
            quiet,
        } => cmd_query(input, csv, query, quiet),
        Commands::Bulk { snapshot } => cmd_bulk(snapshot),
        Commands::Inspect { snapshot, json } => cmd_inspect(snapshot, json),
        Commands::Watch {
            input,
            csv,
            debounce_ms,
        } => cmd_watch(input, csv, debounce_ms),
    }
}
