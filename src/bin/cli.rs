//! schunk CLI
//!
//! Inspect and maintain persisted super-chunks.

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use schunk::codec::cbuffer_sizes;
use schunk::{SChunk, StorageMode};
use tracing_subscriber::{fmt, EnvFilter};

/// schunk CLI
#[derive(Parser, Debug)]
#[command(name = "schunk-cli")]
#[command(about = "Inspect and maintain persisted super-chunks")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print store layout, sizes and parameters
    Info {
        /// Frame file or sparse directory
        path: PathBuf,

        /// Also list every chunk
        #[arg(short, long)]
        chunks: bool,
    },

    /// Write one decompressed chunk to stdout
    Cat {
        path: PathBuf,

        /// Chunk index
        index: usize,
    },

    /// List vlmeta keys with their stored sizes
    Vlmeta {
        path: PathBuf,

        /// Print the value of a single key to stdout instead
        #[arg(short, long)]
        key: Option<String>,
    },

    /// Reclaim dead space in a frame file
    Compact { path: PathBuf },
}

fn main() {
    // Logs go to stderr; stdout carries chunk data
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,schunk=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    if let Err(e) = run(args.command) {
        tracing::error!("{}", e);
        process::exit(1);
    }
}

fn run(command: Commands) -> schunk::Result<()> {
    match command {
        Commands::Info { path, chunks } => {
            let schunk = SChunk::open(&path)?;
            let cparams = schunk.cparams();

            println!("path:        {}", path.display());
            println!("mode:        {:?}", schunk.storage_mode());
            println!("chunk_size:  {}", schunk.chunk_size());
            println!("nchunks:     {}", schunk.nchunks());
            println!("nbytes:      {}", schunk.nbytes());
            println!("cbytes:      {}", schunk.cbytes());
            println!("cratio:      {:.2}", schunk.cratio());
            println!(
                "cparams:     codec={} clevel={} typesize={} splitmode={:?}",
                cparams.codec.name(),
                cparams.clevel,
                cparams.typesize,
                cparams.splitmode
            );
            println!("filters:     {:?}", cparams.filters);
            println!("vlmeta:      {} entries", schunk.vlmeta().len());

            if chunks {
                for index in 0..schunk.nchunks() {
                    let chunk = schunk.chunk(index)?;
                    let sizes = cbuffer_sizes(&chunk.data)?;
                    println!(
                        "  [{:>6}] nbytes={:<10} cbytes={:<10} blocksize={}{}",
                        index,
                        sizes.nbytes,
                        sizes.cbytes,
                        sizes.blocksize,
                        if chunk.is_last { " (last)" } else { "" }
                    );
                }
            }
        }

        Commands::Cat { path, index } => {
            let schunk = SChunk::open(&path)?;
            let data = schunk.decompress_chunk(index)?;
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(&data)?;
            stdout.flush()?;
        }

        Commands::Vlmeta { path, key } => {
            let schunk = SChunk::open(&path)?;
            let vlmeta = schunk.vlmeta();
            match key {
                Some(key) => {
                    let value = vlmeta.get(&key)?;
                    let mut stdout = std::io::stdout().lock();
                    stdout.write_all(&value)?;
                    stdout.flush()?;
                }
                None => {
                    for (key, compressed) in vlmeta.iter() {
                        let sizes = cbuffer_sizes(compressed)?;
                        println!("{}\t{}\t{}", key, sizes.nbytes, sizes.cbytes);
                    }
                }
            }
        }

        Commands::Compact { path } => {
            let mut schunk = SChunk::open(&path)?;
            if schunk.storage_mode() != StorageMode::Contiguous {
                tracing::info!(
                    mode = ?schunk.storage_mode(),
                    cbytes = schunk.cbytes(),
                    "nothing to compact"
                );
                return Ok(());
            }

            let before = std::fs::metadata(&path)?.len();
            schunk.compact()?;
            let after = std::fs::metadata(&path)?.len();
            tracing::info!(before, after, cbytes = schunk.cbytes(), "compaction done");
        }
    }
    Ok(())
}
