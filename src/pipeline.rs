//! Per-second indexing pipeline.
//!
//! For each second `0..duration`:
//! Seek -> Decode -> Detect -> Identify & Annotate -> Persist image ->
//! Accumulate metadata. A second whose frame cannot be decoded is logged and
//! skipped: no image, no metadata key. After the last second the metadata
//! document is flushed once and the video source is released.
//!
//! Everything is sequential; one frame is alive at a time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::annotate::{self, AnnotationStyle, Annotator};
use crate::config::IndexerConfig;
use crate::detect::{self, ClassNames, DetectorBackend};
use crate::identity::IdentityTable;
use crate::ingest::VideoSampler;
use crate::output::{self, FrameEntry, MetadataDocument, MetadataJournal};

/// Where a run writes its results.
#[derive(Clone, Debug)]
pub struct OutputSettings {
    pub output_folder: PathBuf,
    pub metadata_file: PathBuf,
    pub journal_path: Option<PathBuf>,
}

impl OutputSettings {
    pub fn new(output_folder: impl Into<PathBuf>, metadata_file: impl Into<PathBuf>) -> Self {
        Self {
            output_folder: output_folder.into(),
            metadata_file: metadata_file.into(),
            journal_path: None,
        }
    }

    pub fn with_journal(mut self, journal_path: impl Into<PathBuf>) -> Self {
        self.journal_path = Some(journal_path.into());
        self
    }
}

impl From<&IndexerConfig> for OutputSettings {
    fn from(cfg: &IndexerConfig) -> Self {
        Self {
            output_folder: cfg.output_folder.clone(),
            metadata_file: cfg.metadata_file.clone(),
            journal_path: cfg.journal_path.clone(),
        }
    }
}

/// What happened to one second.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecondOutcome {
    Written { detections: usize },
    Skipped,
}

/// Progress notification handed to the observer after every second.
#[derive(Clone, Copy, Debug)]
pub struct SecondReport {
    pub second: u64,
    pub duration_seconds: u64,
    pub outcome: SecondOutcome,
}

/// Totals for a finished run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub duration_seconds: u64,
    pub processed: u64,
    pub skipped: Vec<u64>,
    pub detections: usize,
    pub distinct_objects: usize,
    pub interrupted: bool,
    pub output_folder: PathBuf,
    pub metadata_file: PathBuf,
}

pub struct Pipeline<D: DetectorBackend> {
    sampler: VideoSampler,
    detector: D,
    identities: IdentityTable,
    annotator: Annotator,
    metadata: MetadataDocument,
    journal: Option<MetadataJournal>,
    outputs: OutputSettings,
    stop: Option<Arc<AtomicBool>>,
}

impl Pipeline<Box<dyn DetectorBackend>> {
    /// Open every resource named by `cfg`.
    ///
    /// Order matters: the video is opened first and the model loaded second,
    /// so either failure aborts before the output folder exists.
    pub fn open(cfg: &IndexerConfig) -> Result<Self> {
        let sampler = VideoSampler::open(&cfg.video_path)?;
        let names = match &cfg.labels_path {
            Some(path) => ClassNames::load(path)?,
            None => ClassNames::coco(),
        };
        let detector = detect::load_backend(&cfg.model_path, &cfg.detector, names)?;
        let font = match &cfg.font_path {
            Some(path) => annotate::load_font(path)?,
            None => annotate::embedded_font()?,
        };
        let annotator = Annotator::with_font(AnnotationStyle::default(), font);
        Ok(Self::new(sampler, detector, OutputSettings::from(cfg))?.with_annotator(annotator))
    }
}

impl<D: DetectorBackend> Pipeline<D> {
    /// Assemble a pipeline from an opened source and a loaded detector.
    /// Creates the output folder and, when configured, the journal.
    pub fn new(sampler: VideoSampler, detector: D, outputs: OutputSettings) -> Result<Self> {
        output::ensure_output_folder(&outputs.output_folder)?;
        let journal = match &outputs.journal_path {
            Some(path) => Some(MetadataJournal::create(path)?),
            None => None,
        };
        Ok(Self {
            sampler,
            detector,
            identities: IdentityTable::new(),
            annotator: Annotator::new(AnnotationStyle::default())?,
            metadata: MetadataDocument::new(),
            journal,
            outputs,
            stop: None,
        })
    }

    pub fn with_annotator(mut self, annotator: Annotator) -> Self {
        self.annotator = annotator;
        self
    }

    /// Stop after the current second once `flag` becomes true.
    pub fn with_stop_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop = Some(flag);
        self
    }

    pub fn sampler(&self) -> &VideoSampler {
        &self.sampler
    }

    pub fn detector(&self) -> &D {
        &self.detector
    }

    pub fn identities(&self) -> &IdentityTable {
        &self.identities
    }

    pub fn metadata(&self) -> &MetadataDocument {
        &self.metadata
    }

    /// Process a single second.
    pub fn process_second(&mut self, second: u64) -> Result<SecondOutcome> {
        let Some(mut frame) = self.sampler.read_frame_at_second(second) else {
            log::warn!("could not read frame at second {}, skipping", second);
            return Ok(SecondOutcome::Skipped);
        };

        let detections = self
            .detector
            .detect(&frame)
            .with_context(|| format!("detection failed at second {}", second))?;
        let records = self.identities.assign(detections);

        self.annotator.annotate(&mut frame, &records);
        let path = output::write_image(&frame, &self.outputs.output_folder)?;

        let entry = FrameEntry::new(second, records);
        if let Some(journal) = self.journal.as_mut() {
            journal.append(&entry)?;
        }
        let count = entry.detections.len();
        self.metadata.push(entry);

        log::info!(
            "second {}: {} detection(s) -> {}",
            second,
            count,
            path.display()
        );
        Ok(SecondOutcome::Written { detections: count })
    }

    /// Run every second, flush metadata, release the source.
    pub fn run(self) -> Result<RunSummary> {
        self.run_with(|_| {})
    }

    /// Like [`Pipeline::run`], calling `observer` after each second.
    pub fn run_with<F: FnMut(&SecondReport)>(mut self, mut observer: F) -> Result<RunSummary> {
        let duration_seconds = self.sampler.duration_seconds();
        log::info!(
            "sampling {}: {} fps, {} frames, {} second(s)",
            self.sampler.path(),
            self.sampler.frame_rate(),
            self.sampler.frame_count(),
            duration_seconds
        );

        let mut processed = 0u64;
        let mut skipped = Vec::new();
        let mut interrupted = false;

        for second in 0..duration_seconds {
            if self.stop_requested() {
                log::warn!("interrupted before second {}", second);
                interrupted = true;
                break;
            }
            let outcome = self.process_second(second)?;
            match outcome {
                SecondOutcome::Written { .. } => processed += 1,
                SecondOutcome::Skipped => skipped.push(second),
            }
            observer(&SecondReport {
                second,
                duration_seconds,
                outcome,
            });
        }

        self.flush_metadata()?;

        Ok(RunSummary {
            duration_seconds,
            processed,
            skipped,
            detections: self.metadata.detection_count(),
            distinct_objects: self.identities.len(),
            interrupted,
            output_folder: self.outputs.output_folder.clone(),
            metadata_file: self.outputs.metadata_file.clone(),
        })
    }

    fn stop_requested(&self) -> bool {
        self.stop
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn flush_metadata(&self) -> Result<()> {
        let path: &Path = &self.outputs.metadata_file;
        self.metadata.flush(path)?;
        log::info!(
            "metadata for {} frame(s) written to {}",
            self.metadata.len(),
            path.display()
        );
        Ok(())
    }
}
