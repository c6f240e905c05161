//! Video sources.
//!
//! This module provides the per-second video sampler:
//! - Local video files (feature: ingest-ffmpeg)
//! - Synthetic `stub://` source (testing, dry runs)
//!
//! All sources produce `Frame` instances tagged with their second index.
//! The ingestion layer is responsible for:
//! - Computing integer frame rate and whole-second duration
//! - Seeking by frame index and decoding to RGB
//! - Reporting unreadable seconds as `None`, not as errors

pub mod file;
#[cfg(feature = "ingest-ffmpeg")]
pub(crate) mod file_ffmpeg;

pub use file::{VideoInfo, VideoSampler, STUB_VIDEO_PREFIX};
