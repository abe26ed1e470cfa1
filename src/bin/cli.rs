//! ByteVault CLI
//!
//! Runs a single command against a storage directory.

use std::path::PathBuf;
use std::process;

use bytevault::{Config, Engine, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// ByteVault CLI
#[derive(Parser, Debug)]
#[command(name = "bytevault-cli")]
#[command(about = "Command-line access to a ByteVault storage directory")]
#[command(version)]
struct Args {
    /// Storage directory
    #[arg(short, long, default_value = "./bytevault_data")]
    dir: PathBuf,

    /// Segment size limit in bytes before rotation
    #[arg(short = 's', long, default_value = "10240000")]
    segment_size: u64,

    /// Use the in-memory key directory instead of index.db
    #[arg(long)]
    no_index: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,
    },

    /// Remove a key
    Remove {
        /// The key to remove
        key: String,
    },

    /// Compact all sealed segments
    Merge,

    /// List segment files, oldest first
    Segments,
}

fn run(args: Args) -> Result<()> {
    let config = Config::builder()
        .storage_dir(&args.dir)
        .segment_size_limit(args.segment_size)
        .index_enabled(!args.no_index)
        .build()?;

    let engine = Engine::open(config)?;

    match args.command {
        Commands::Get { key } => {
            let value = engine.get(key.as_bytes())?;
            println!("{}", String::from_utf8_lossy(&value));
        }
        Commands::Set { key, value } => {
            engine.set(key.as_bytes(), value.as_bytes())?.wait()?;
            println!("OK");
        }
        Commands::Remove { key } => {
            engine.remove(key.as_bytes())?.wait()?;
            println!("OK");
        }
        Commands::Merge => {
            let stats = engine.merge()?;
            println!(
                "merged {} segments: {} live keys, {} -> {} bytes",
                stats.segments_merged, stats.live_keys, stats.bytes_before, stats.bytes_after
            );
        }
        Commands::Segments => {
            let active = engine.active_segment();
            for path in engine.segments()? {
                let marker = if path == active { " (active)" } else { "" };
                println!("{}{}", path.display(), marker);
            }
        }
    }

    engine.close()
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,bytevault=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}
