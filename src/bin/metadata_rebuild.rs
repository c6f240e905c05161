//! metadata_rebuild - turn a frame_indexer NDJSON journal into the final JSON
//! metadata document (for runs that were killed before their final flush).

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;

use frame_indexer::MetadataDocument;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Journal written by frame_indexer --journal-path.
    #[arg(long)]
    journal: PathBuf,
    /// Destination JSON file.
    #[arg(long, default_value = "metadata.json")]
    output: PathBuf,
    /// Overwrite an existing output file.
    #[arg(long)]
    force: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if args.output.exists() && !args.force {
        return Err(anyhow!(
            "{} already exists (pass --force to overwrite)",
            args.output.display()
        ));
    }

    let doc = MetadataDocument::from_journal(&args.journal)?;
    doc.flush(&args.output)?;
    log::info!(
        "rebuilt {} frame(s), {} detection(s) from {}",
        doc.len(),
        doc.detection_count(),
        args.journal.display()
    );
    println!("Metadata written to '{}'.", args.output.display());
    Ok(())
}
