//! Frame Indexer
//!
//! Samples one frame per second of a video, runs an object detector on each
//! sampled frame, draws the detections, and writes annotated JPEGs plus a JSON
//! document listing every detection per frame.
//!
//! # Architecture
//!
//! A single sequential pipeline, data flowing strictly forward:
//!
//! 1. **Video sampler** (`ingest`): opens the source, derives integer fps and
//!    whole-second duration, decodes the frame at index `second * fps`.
//! 2. **Detector** (`detect`): `DetectorBackend` trait over a pretrained model.
//! 3. **Identity** (`identity`): `<label>_<x1>_<y1>_<x2>_<y2>` identifiers and
//!    a per-run identifier → label table. This is not object tracking.
//! 4. **Annotate & write** (`annotate`, `output`): boxes and labels drawn in
//!    place, `frame_<second>.jpg` images, metadata flushed once at the end
//!    (optionally mirrored to an NDJSON journal as it grows).
//!
//! # Module Structure
//!
//! - `config`: defaults, config file and environment layering
//! - `frame`: decoded frame container
//! - `pipeline`: per-second orchestration and run summary

pub mod annotate;
pub mod config;
pub mod detect;
pub mod frame;
pub mod identity;
pub mod ingest;
pub mod output;
pub mod pipeline;

pub use annotate::{AnnotationStyle, Annotator};
pub use config::{DetectorSettings, IndexerConfig};
pub use detect::{load_backend, BoundingBox, ClassNames, Detection, DetectorBackend, StubBackend};
#[cfg(feature = "backend-tract")]
pub use detect::TractBackend;
pub use frame::{frame_key, Frame};
pub use identity::{object_id, IdentityTable};
pub use ingest::{VideoInfo, VideoSampler};
pub use output::{DetectionRecord, FrameEntry, MetadataDocument, MetadataJournal};
pub use pipeline::{OutputSettings, Pipeline, RunSummary, SecondOutcome, SecondReport};
