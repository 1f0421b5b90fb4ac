//! sqfs-pack
//!
//! Packs a directory into the data region of a SquashFS-style image,
//! followed by the serialized fragment table.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use sqfs_pack::{pack_directory, CompressionConfig, CompressionMethod, OutputSink, PackOptions};
use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "sqfs-pack")]
#[command(about = "Pack a directory tree into compressed data and fragment blocks")]
struct Args {
    /// Directory to pack
    source: PathBuf,

    /// Output file
    output: PathBuf,

    /// TOML file with packing options (command line flags override it)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Data block size in bytes
    #[arg(short = 'b', long)]
    block_size: Option<u32>,

    /// Block compressor (none, lz4, zstd)
    #[arg(short = 'X', long)]
    compressor: Option<String>,

    /// Compression level (zstd only)
    #[arg(short = 'l', long)]
    level: Option<i32>,

    /// Do not print a line for every packed file
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print packing statistics as JSON
    #[arg(long)]
    json: bool,
}

fn load_options(args: &Args) -> Result<PackOptions> {
    let mut options = match &args.config {
        Some(path) => PackOptions::from_toml_file(path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => PackOptions::default(),
    };

    if let Some(block_size) = args.block_size {
        options.block_size = block_size;
    }
    if let Some(name) = &args.compressor {
        let method = CompressionMethod::from_name(name).ok_or_else(|| {
            anyhow!(
                "Invalid compressor '{}'. Valid options: none, lz4, zstd",
                name
            )
        })?;
        if method != options.compression.method {
            options.compression = match method {
                CompressionMethod::None => CompressionConfig::none(),
                CompressionMethod::Lz4 => CompressionConfig::lz4(),
                CompressionMethod::Zstd => CompressionConfig::zstd(),
            };
        }
    }
    if let Some(level) = args.level {
        options.compression.level = level;
    }
    options.quiet |= args.quiet;

    options.validate()?;
    Ok(options)
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let options = load_options(&args)?;

    if !args.source.is_dir() {
        bail!("{} is not a directory", args.source.display());
    }

    info!(
        "Packing {:?} into {:?} (block size {}, {})",
        args.source,
        args.output,
        options.block_size,
        options.compression.method.name()
    );

    let file = File::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    let image = pack_directory(&args.source, BufWriter::new(file), &options)
        .with_context(|| format!("packing {}", args.source.display()))?;

    let mut sink = image.region.sink;
    let table_start = sink.bytes_used();
    sink.append(&image.region.fragments.to_bytes())
        .context("writing fragment table")?;
    sink.into_inner().context("flushing output")?;

    let stats = image.region.stats;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "{} files, {} blocks ({} raw), {} fragment blocks ({} raw)",
            stats.files,
            stats.blocks,
            stats.raw_blocks,
            stats.fragment_blocks,
            stats.raw_fragment_blocks
        );
        println!(
            "data: {} bytes, fragment table at {} ({} entries), flags {:#06x}",
            image.region.bytes_used,
            table_start,
            image.region.fragments.len(),
            image.region.flags.bits()
        );
    }

    Ok(())
}
