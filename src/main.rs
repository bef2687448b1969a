//! PDF Image Shrinker CLI
//!
//! Command-line interface for recompressing the images in PDFs, inspecting
//! them, and serving the HTTP endpoint.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use shrink_pdf::server::{self, ServerConfig};
use shrink_pdf::{describe_pdf_images, file_ops::compress_pdf_file, CompressOptions, QualityTier};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Shrink PDFs by recompressing their embedded images
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbosity level (-v, -vv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recompress the images of a PDF file
    Compress(CompressArgs),
    /// List the images each page of a PDF uses
    Inspect(InspectArgs),
    /// Serve the compression endpoint over HTTP
    Serve(ServeArgs),
}

#[derive(Args, Debug)]
struct CompressArgs {
    /// Input PDF file path
    #[arg(short, long)]
    input: PathBuf,

    /// Output PDF file path
    #[arg(short, long)]
    output: PathBuf,

    /// Quality between 0.1 and 1.0; lower values shrink images harder
    #[arg(short, long, default_value_t = QualityTier::default())]
    quality: QualityTier,

    /// Leave uncompressed PDF streams as they are
    #[arg(long)]
    no_compress_streams: bool,
}

#[derive(Args, Debug)]
struct InspectArgs {
    /// Input PDF file path
    input: PathBuf,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, env = "SHRINK_PDF_BIND", default_value = "127.0.0.1:3000")]
    bind: SocketAddr,

    /// Largest accepted upload, in megabytes
    #[arg(long, env = "SHRINK_PDF_MAX_UPLOAD_MB", default_value = "50")]
    max_upload_mb: usize,

    /// Leave uncompressed PDF streams as they are
    #[arg(long, env = "SHRINK_PDF_NO_COMPRESS_STREAMS")]
    no_compress_streams: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .parse_default_env()
        .init();

    match cli.command {
        Command::Compress(args) => compress(args),
        Command::Inspect(args) => inspect(args),
        Command::Serve(args) => serve(args),
    }
}

fn compress(args: CompressArgs) -> Result<()> {
    let options = CompressOptions {
        quality: args.quality,
        compress_streams: !args.no_compress_streams,
    };

    let report = compress_pdf_file(&args.input, &args.output, &options)
        .with_context(|| format!("Failed to compress {}", args.input.display()))?;

    println!(
        "Processed {} images: {} recompressed, {} skipped",
        report.total_images,
        report.recompressed_images,
        report.skipped.len()
    );
    for skipped in &report.skipped {
        println!("  {} {}: {}", skipped.id.0, skipped.id.1, skipped.reason);
    }
    println!("Output saved to: {}", args.output.display());

    Ok(())
}

fn inspect(args: InspectArgs) -> Result<()> {
    let bytes = std::fs::read(&args.input)
        .with_context(|| format!("Failed to read input file: {}", args.input.display()))?;
    let pages = describe_pdf_images(&bytes)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&pages)?);
        return Ok(());
    }

    for page in &pages {
        println!("Page {}", page.page_number);
        for img in &page.images {
            println!(
                "  {} {}: {}x{} {} {}bpc {} ({} bytes)",
                img.object_id.0,
                img.object_id.1,
                img.width,
                img.height,
                img.color_space,
                img.bits_per_component,
                img.filter,
                img.size_bytes
            );
        }
    }

    Ok(())
}

fn serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig {
        bind: args.bind,
        max_upload_bytes: args.max_upload_mb.saturating_mul(1024 * 1024),
        compress_streams: !args.no_compress_streams,
    };

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?
        .block_on(server::serve(config))
        .context("Server error")
}
