//! imgbatch - Batch image conversion from the command line
//!
//! Main entry point for the headless front end.
//!
//! # Execution Flow
//!
//! 1. Parse arguments and load `imgbatch.yaml` from the config directory
//! 2. Initialize logging (daily rotating file + console)
//! 3. Create the tokio runtime
//! 4. Load the given files, add them to the store, and convert them
//! 5. Wait until no image is converting, then report failures
//! 6. Export every converted image to a zip archive (and, with
//!    `--individual`, each converted file on its own)
//! 7. Log the metrics summary and shut the runtime down
//!
//! Command-line options override the values in `imgbatch.yaml`.

use anyhow::{Context, Result, bail};
use camino::Utf8PathBuf;
use clap::Parser;
use imgbatch::config::ConfigManager;
use imgbatch::services::{DirectorySaveSink, ExportCoordinator, ImageCodec, load_sources};
use imgbatch::{
    APP_NAME, BatchController, ConversionSettings, OutputFormat, SettingsPatch, StateManager,
    UserConfig, VERSION,
};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "imgbatch")]
#[command(version, about = "Convert a batch of images and bundle the results into a zip archive", long_about = None)]
struct Cli {
    /// Images to convert (.jpg, .jpeg, .png, .webp, .avif)
    #[arg(value_name = "FILES", required = true)]
    files: Vec<Utf8PathBuf>,

    /// Output format: jpeg, png, webp or avif
    #[arg(short, long)]
    format: Option<OutputFormat>,

    /// Encoder quality (1-100)
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Maximum width in pixels (100-3840)
    #[arg(long, value_parser = clap::value_parser!(u32).range(100..=3840))]
    max_width: Option<u32>,

    /// Maximum height in pixels (100-2160)
    #[arg(long, value_parser = clap::value_parser!(u32).range(100..=2160))]
    max_height: Option<u32>,

    /// Directory the archive and downloads are written to
    #[arg(short, long)]
    output_dir: Option<Utf8PathBuf>,

    /// Directory holding imgbatch.yaml
    #[arg(long, default_value = ".")]
    config_dir: Utf8PathBuf,

    /// Also write each converted image as its own file
    #[arg(long)]
    individual: bool,

    /// Write the effective conversion settings back to imgbatch.yaml
    #[arg(long)]
    save_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

impl Cli {
    fn settings_patch(&self) -> SettingsPatch {
        SettingsPatch {
            format: self.format,
            quality: self.quality,
            max_width: self.max_width,
            max_height: self.max_height,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_manager = ConfigManager::new(&cli.config_dir)?;
    let mut user_config = config_manager.load_user_config()?;

    let debug = cli.debug || user_config.logging.debug_mode;
    let _guard = imgbatch::logging::setup_logging_with_console(
        &user_config.logging.log_dir,
        "imgbatch",
        debug,
        true,
    )?;

    tracing::info!("Starting {} v{}", APP_NAME, VERSION);

    let settings = user_config
        .conversion_settings()
        .merged(&cli.settings_patch())
        .context("Invalid conversion settings")?;

    if cli.save_config {
        user_config.set_conversion_settings(&settings);
        config_manager.save_user_config(&user_config)?;
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("imgbatch-worker")
        .build()?;

    let result = runtime.block_on(run(&cli, &user_config, settings, runtime.handle().clone()));

    runtime.shutdown_timeout(Duration::from_secs(5));
    tracing::info!("Shutdown complete");

    result
}

async fn run(
    cli: &Cli,
    user_config: &UserConfig,
    settings: ConversionSettings,
    runtime: tokio::runtime::Handle,
) -> Result<()> {
    let (sources, rejected) = load_sources(&cli.files).await;
    for skipped in &rejected {
        tracing::warn!("Skipped {}: {}", skipped.path, skipped.reason);
    }
    if sources.is_empty() {
        bail!("None of the given files could be loaded");
    }

    let exporter = Arc::new(ExportCoordinator::new(
        user_config.export.archive_name.clone(),
        user_config.export.compress_archive,
    ));
    let controller = BatchController::new(
        StateManager::with_settings(settings),
        Arc::new(ImageCodec::new()),
        exporter,
        runtime,
    );
    let notifier = controller.spawn_notifier();

    tracing::info!(
        "Converting {} image(s) to {} (quality {}, max {}x{})",
        sources.len(),
        settings.format,
        settings.quality,
        settings.max_width,
        settings.max_height
    );
    if !settings.format.honors_quality() {
        tracing::info!("Quality setting has no effect on {} output", settings.format);
    }

    let tasks = controller.add_images(sources);
    let ids: Vec<_> = tasks.iter().map(|task| task.id).collect();
    controller.wait_until_idle().await;

    let (converted, failed) = controller
        .state()
        .read(|s| (s.converted_count(), s.failed_count()));
    tracing::info!("{} converted, {} failed", converted, failed);

    let output_dir = cli
        .output_dir
        .clone()
        .unwrap_or_else(|| Utf8PathBuf::from(&user_config.export.output_dir));
    let sink = DirectorySaveSink::new(&output_dir)?;

    if cli.individual {
        for id in ids {
            controller.save_download(id, &sink)?;
        }
    }

    let outcome = if converted > 0 {
        controller.save_archive(&sink).await.map(|path| {
            tracing::info!("Archive written to {}", path);
        })
    } else {
        Err(anyhow::anyhow!("No images were converted"))
    };

    controller.metrics().log_summary();
    notifier.abort();

    outcome
}
