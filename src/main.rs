use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::PathBuf,
};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use segmentation_viewer::{DirectoryStore, SegmentationService};
use serde::Serialize;

/// Segmentation metadata and volume payloads for items stored as directories.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Directory whose subdirectories are items
    #[arg(long, default_value = ".")]
    root: PathBuf,
    /// Pretty-print JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,
    /// Write JSON to this file instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the item and its segmentation metadata
    Show { item: String },
    /// Record every decodable file of the item as an image
    DetectImages { item: String },
    SetBaseImage { item: String, file: String },
    ClearBaseImage { item: String },
    /// Record a newly added file if it is an image
    Attach { item: String, file: String },
    /// Forget a removed file
    Detach { item: String, file: String },
    /// Payload of the item's base image
    BaseImage { item: String },
    /// Payload of a segmentation on the item's base image
    Segmentation { item: String, file: String },
    /// Absolute difference of two segmentations
    Diff {
        item: String,
        first: String,
        second: String,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();

    let mut service = SegmentationService::new(DirectoryStore::new(&args.root));

    match &args.command {
        Command::Show { item } => emit(&args, &service.item(item)?),
        Command::DetectImages { item } => {
            let info = service
                .detect_images(item)
                .with_context(|| format!("detecting images of '{item}'"))?;
            emit(&args, &info)
        }
        Command::SetBaseImage { item, file } => {
            let info = service
                .set_base_image(item, file)
                .with_context(|| format!("setting base image of '{item}'"))?;
            emit(&args, &info)
        }
        Command::ClearBaseImage { item } => emit(&args, &service.clear_base_image(item)?),
        Command::Attach { item, file } => {
            let attached = service.attach_if_decodable(item, file)?;
            emit(&args, &serde_json::json!({ "attached": attached }))
        }
        Command::Detach { item, file } => {
            let detached = service.detach_file(item, file)?;
            emit(&args, &serde_json::json!({ "detached": detached }))
        }
        Command::BaseImage { item } => {
            let payload = service
                .base_image_payload(item)
                .with_context(|| format!("building base image payload of '{item}'"))?;
            emit(&args, &payload)
        }
        Command::Segmentation { item, file } => {
            let payload = service
                .segmentation_payload(item, file)
                .with_context(|| format!("building overlay payload of '{file}'"))?;
            emit(&args, &payload)
        }
        Command::Diff {
            item,
            first,
            second,
        } => {
            let payload = service
                .difference_payload(item, first, second)
                .with_context(|| format!("building difference of '{first}' and '{second}'"))?;
            emit(&args, &payload)
        }
    }
}

fn emit(args: &Args, value: &impl Serialize) -> Result<()> {
    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    if args.pretty {
        serde_json::to_writer_pretty(&mut writer, value)?;
    } else {
        serde_json::to_writer(&mut writer, value)?;
    }
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}
