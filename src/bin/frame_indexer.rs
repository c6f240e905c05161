//! frame_indexer - sample a video once per second, detect objects, write
//! annotated frames and a JSON detection index.
//!
//! Settings resolve as: built-in defaults, then `FRAME_INDEXER_CONFIG`
//! (JSON or TOML), then `FRAME_INDEXER_*` environment variables, then flags.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use frame_indexer::{IndexerConfig, Pipeline};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Input video file (or stub://... for a synthetic source).
    #[arg(long)]
    video_path: Option<String>,
    /// Detection model weights (.onnx, or stub:// for no detections).
    #[arg(long)]
    model_path: Option<String>,
    /// Folder receiving frame_<second>.jpg images.
    #[arg(long)]
    output_folder: Option<PathBuf>,
    /// JSON metadata destination.
    #[arg(long)]
    metadata_file: Option<PathBuf>,
    /// Newline-delimited class names (defaults to the COCO table).
    #[arg(long)]
    labels_path: Option<PathBuf>,
    /// Also append each frame's detections to this NDJSON journal as it is processed.
    #[arg(long)]
    journal_path: Option<PathBuf>,
    /// TrueType font for box labels (defaults to the embedded DejaVu Sans Bold).
    #[arg(long)]
    font_path: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

impl Args {
    fn apply(self, cfg: &mut IndexerConfig) {
        if let Some(path) = self.video_path {
            cfg.video_path = path;
        }
        if let Some(path) = self.model_path {
            cfg.model_path = path;
        }
        if let Some(path) = self.output_folder {
            cfg.output_folder = path;
        }
        if let Some(path) = self.metadata_file {
            cfg.metadata_file = path;
        }
        if let Some(path) = self.labels_path {
            cfg.labels_path = Some(path);
        }
        if let Some(path) = self.journal_path {
            cfg.journal_path = Some(path);
        }
        if let Some(path) = self.font_path {
            cfg.font_path = Some(path);
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let is_tty = std::io::stderr().is_terminal();
    let stdout_is_tty = std::io::stdout().is_terminal();
    let ui = ui::Ui::new(ui::UiMode::parse(&args.ui), is_tty, !stdout_is_tty);

    let mut cfg = IndexerConfig::load()?;
    args.apply(&mut cfg);
    cfg.validate()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping after the current second");
            stop.store(true, Ordering::SeqCst);
        })
        .context("failed to install interrupt handler")?;
    }

    let pipeline = {
        let _stage = ui.stage("Open video and load model");
        Pipeline::open(&cfg)?
    };
    let info = pipeline.sampler().info();
    log::info!(
        "video {}: {} fps, {} frames, {} second(s) to sample",
        info.path,
        info.frame_rate,
        info.frame_count,
        info.duration_seconds
    );

    let mut progress = ui.seconds(info.duration_seconds);
    let summary = {
        let _stage = ui.stage("Index frames");
        pipeline
            .with_stop_flag(stop)
            .run_with(|report| progress.record(report))?
    };
    progress.finish();

    if summary.interrupted {
        log::warn!(
            "run interrupted: {} of {} second(s) indexed",
            summary.processed,
            summary.duration_seconds
        );
    }
    if !summary.skipped.is_empty() {
        log::warn!("skipped seconds: {:?}", summary.skipped);
    }
    log::info!(
        "{} frame(s), {} detection(s), {} distinct object id(s)",
        summary.processed,
        summary.detections,
        summary.distinct_objects
    );
    println!(
        "Processing complete. Images saved to '{}' and metadata to '{}'.",
        summary.output_folder.display(),
        summary.metadata_file.display()
    );
    Ok(())
}
