//! objgraph CLI: encode JSON documents to `.ogr` blobs and back, and inspect
//! or verify existing blobs.

mod commands;
mod config;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use tracing::Level;

#[derive(Parser)]
#[command(name = "objgraph", version, about = "Cyclic object-graph serializer")]
struct Cli {
    /// Codec configuration file (TOML with a [codec] table)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Fail on any checksum mismatch or unresolved pointer
    #[arg(long, global = true)]
    strict: bool,
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a JSON document into an .ogr blob
    Encode {
        /// Input JSON file
        input: PathBuf,
        /// Output .ogr file
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Decode an .ogr blob and print it as JSON
    Decode {
        /// Input .ogr file
        input: PathBuf,
        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Show the header, node table and optionally pointers and chunks
    Inspect {
        /// Input .ogr file
        input: PathBuf,
        /// List every pointer
        #[arg(long)]
        pointers: bool,
        /// List every chunk with its size and checksum
        #[arg(long)]
        chunks: bool,
    },
    /// Verify every chunk checksum and the graph's structure
    Verify {
        /// Input .ogr file
        input: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::WARN })
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let codec = config::load(cli.config.as_deref(), cli.strict)?;

    match cli.command {
        Commands::Encode { input, output } => commands::encode::run(&input, &output, &codec),
        Commands::Decode { input, pretty } => commands::decode::run(&input, pretty, &codec),
        Commands::Inspect {
            input,
            pointers,
            chunks,
        } => commands::inspect::run(&input, pointers, chunks),
        Commands::Verify { input } => commands::verify::run(&input),
    }
}
