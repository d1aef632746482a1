//! Nameplate Scan - equipment nameplate extraction engine
//!
//! Command-line front end: full scans, text-only extraction and upload
//! preparation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use nameplate_scan::capture;
use nameplate_scan::config::{load_or_default, API_KEY_ENV};
use nameplate_scan::vision::{prepare, EngineId};
use nameplate_scan::{extract, ExtractionProfile, ScanService};

/// Nameplate Scan - read equipment labels into inventory records
#[derive(Parser, Debug)]
#[command(name = "nameplate-scan")]
#[command(about = "Extracts brand, model, serial and rating from equipment nameplate photos")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the full pipeline on a photo and print the outcome as JSON
    Scan {
        /// Photo of the nameplate
        image: PathBuf,

        /// Installation to assign the device to
        #[arg(long)]
        installation: Option<String>,

        /// Use the quick extraction profile
        #[arg(long)]
        quick: bool,

        /// Preferred recognition engine
        #[arg(long)]
        engine: Option<u8>,

        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },

    /// Extract fields from already recognized text ("-" reads stdin)
    Parse {
        text_file: String,

        /// Use the quick extraction profile
        #[arg(long)]
        quick: bool,
    },

    /// Bring a photo within the upload budget and write it out
    Prepare {
        image: PathBuf,
        out: PathBuf,

        /// Config file (defaults to the user config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    match args.command {
        Command::Scan {
            image,
            installation,
            quick,
            engine,
            config,
        } => scan(&image, installation, quick, engine, config.as_deref()).await,
        Command::Parse { text_file, quick } => parse(&text_file, quick),
        Command::Prepare { image, out, config } => prepare_file(&image, &out, config.as_deref()),
    }
}

async fn scan(
    image: &Path,
    installation: Option<String>,
    quick: bool,
    engine: Option<u8>,
    config: Option<&Path>,
) -> Result<()> {
    let mut config = load_or_default(config)?;
    if quick {
        config.extraction.strict = false;
    }
    if let Some(engine) = engine {
        config.ocr.engine = engine;
    }
    if config.ocr.api_key.is_none() {
        info!("No API key configured; set {} or ocr.api_key", API_KEY_ENV);
    }

    let service = ScanService::from_config(&config)?;
    let captured = capture::load_from_path(image)?;

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    info!(engine = %EngineId(config.ocr.engine), "Scanning {:?}", image);
    let outcome = service.scan(&captured, installation.as_deref(), &cancel).await?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

fn parse(text_file: &str, quick: bool) -> Result<()> {
    let text = if text_file == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read stdin")?;
        buf
    } else {
        std::fs::read_to_string(text_file).with_context(|| format!("Failed to read {}", text_file))?
    };

    let record = extract(&text, &ExtractionProfile::from_strict(!quick));
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

fn prepare_file(image: &Path, out: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_or_default(config)?;
    let captured = capture::load_from_path(image)?;

    let prepared = prepare(&captured, &config.preprocess.options())?;
    std::fs::write(out, &prepared.data).with_context(|| format!("Failed to write {:?}", out))?;

    info!(
        "Wrote {:?} ({} bytes, {}x{}, {})",
        out,
        prepared.size(),
        prepared.width,
        prepared.height,
        prepared.mime
    );
    Ok(())
}
