//! Local video file sampler.
//!
//! `VideoSampler` opens a video once and reads one frame per whole second of
//! video by seeking to frame index `second * fps`. It is responsible for:
//! - Failing fast (with the path in the error) when the source cannot be opened
//! - Reporting integer fps, frame count and duration in whole seconds
//! - Turning per-second seek/decode failures into `None` instead of errors
//!
//! `stub://` paths select a synthetic source used by tests and dry runs.

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{Rgb, RgbImage};

#[cfg(feature = "ingest-ffmpeg")]
use super::file_ffmpeg::FfmpegVideoSource;
use crate::frame::Frame;

/// Path prefix selecting the synthetic source.
pub const STUB_VIDEO_PREFIX: &str = "stub://";

/// Summary of an opened source, for logging.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoInfo {
    pub path: String,
    pub frame_rate: u32,
    pub frame_count: u64,
    pub duration_seconds: u64,
}

/// Opened video source sampled one frame per second.
pub struct VideoSampler {
    path: String,
    frame_rate: u32,
    frame_count: u64,
    backend: VideoBackend,
}

enum VideoBackend {
    Synthetic(SyntheticVideoSource),
    #[cfg(feature = "ingest-ffmpeg")]
    Ffmpeg(FfmpegVideoSource),
}

impl VideoSampler {
    /// Open a video source.
    ///
    /// Fails when the path is not a local file, does not exist, cannot be
    /// demuxed, has no video stream or reports no usable frame rate.
    pub fn open(path: &str) -> Result<Self> {
        if !is_local_file_path(path) {
            return Err(anyhow!(
                "failed to open video source '{}': only local paths are supported",
                path
            ));
        }
        if path.starts_with(STUB_VIDEO_PREFIX) {
            let source = SyntheticVideoSource::parse(path)
                .with_context(|| format!("failed to open video source '{}'", path))?;
            return Ok(Self {
                path: path.to_string(),
                frame_rate: source.fps,
                frame_count: source.frames,
                backend: VideoBackend::Synthetic(source),
            });
        }
        if !Path::new(path).is_file() {
            return Err(anyhow!(
                "failed to open video source '{}': file not found",
                path
            ));
        }
        Self::open_file(path)
    }

    #[cfg(feature = "ingest-ffmpeg")]
    fn open_file(path: &str) -> Result<Self> {
        let source = FfmpegVideoSource::new(path)
            .with_context(|| format!("failed to open video source '{}'", path))?;
        let frame_rate = source.frame_rate();
        if frame_rate == 0 {
            return Err(anyhow!(
                "failed to open video source '{}': stream reports no usable frame rate",
                path
            ));
        }
        Ok(Self {
            path: path.to_string(),
            frame_rate,
            frame_count: source.frame_count(),
            backend: VideoBackend::Ffmpeg(source),
        })
    }

    #[cfg(not(feature = "ingest-ffmpeg"))]
    fn open_file(path: &str) -> Result<Self> {
        Err(anyhow!(
            "failed to open video source '{}': file decoding requires the ingest-ffmpeg feature",
            path
        ))
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Integer frames per second (always > 0).
    pub fn frame_rate(&self) -> u32 {
        self.frame_rate
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// `frame_count / frame_rate`, truncated. Under one second of video yields 0.
    pub fn duration_seconds(&self) -> u64 {
        self.frame_count / self.frame_rate as u64
    }

    pub fn info(&self) -> VideoInfo {
        VideoInfo {
            path: self.path.clone(),
            frame_rate: self.frame_rate,
            frame_count: self.frame_count,
            duration_seconds: self.duration_seconds(),
        }
    }

    /// Seek to frame `second * fps` and decode it.
    ///
    /// Returns `None` when the seek or decode fails; that is a per-second
    /// condition for the caller to skip, never a fatal error.
    pub fn read_frame_at_second(&mut self, second: u64) -> Option<Frame> {
        let index = second * self.frame_rate as u64;
        let result = match &mut self.backend {
            VideoBackend::Synthetic(source) => source.read_frame(index, second),
            #[cfg(feature = "ingest-ffmpeg")]
            VideoBackend::Ffmpeg(source) => source.read_frame(index, second),
        };
        match result {
            Ok(frame) => frame,
            Err(e) => {
                log::debug!("decode of frame {} (second {}) failed: {:#}", index, second, e);
                None
            }
        }
    }
}

impl Drop for VideoSampler {
    fn drop(&mut self) {
        log::debug!("released video source {}", self.path);
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

/// `stub://<name>?fps=<n>&frames=<n>&width=<n>&height=<n>&fail=<s1,s2,...>`
///
/// Produces deterministic gradient frames. Seconds listed in `fail` behave as
/// undecodable; indices at or past `frames` read as end of stream.
struct SyntheticVideoSource {
    fps: u32,
    frames: u64,
    width: u32,
    height: u32,
    fail_seconds: BTreeSet<u64>,
}

impl SyntheticVideoSource {
    fn parse(path: &str) -> Result<Self> {
        let rest = path.strip_prefix(STUB_VIDEO_PREFIX).unwrap_or(path);
        let mut source = Self {
            fps: 10,
            frames: 100,
            width: 320,
            height: 240,
            fail_seconds: BTreeSet::new(),
        };
        let Some((_, query)) = rest.split_once('?') else {
            return Ok(source);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub parameter '{}' is missing a value", pair))?;
            match key {
                "fps" => source.fps = parse_number(key, value)?,
                "frames" => source.frames = parse_number(key, value)?,
                "width" => source.width = parse_number(key, value)?,
                "height" => source.height = parse_number(key, value)?,
                "fail" => {
                    for second in value.split(',').filter(|s| !s.trim().is_empty()) {
                        source.fail_seconds.insert(parse_number(key, second.trim())?);
                    }
                }
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        if source.fps == 0 {
            return Err(anyhow!("stream reports no usable frame rate"));
        }
        if source.width == 0 || source.height == 0 {
            return Err(anyhow!("stub frame dimensions must be non-zero"));
        }
        Ok(source)
    }

    fn read_frame(&mut self, index: u64, second: u64) -> Result<Option<Frame>> {
        if self.fail_seconds.contains(&second) {
            return Err(anyhow!("synthetic decode failure"));
        }
        if index >= self.frames {
            return Ok(None);
        }
        let shift = (index % 256) as u32;
        let image = RgbImage::from_fn(self.width, self.height, |x, y| {
            Rgb([
                ((x + shift) % 256) as u8,
                ((y + shift) % 256) as u8,
                ((x + y) % 256) as u8,
            ])
        });
        Ok(Some(Frame::new(image, second)))
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("stub parameter '{}' has invalid value '{}'", key, value))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with(STUB_VIDEO_PREFIX) {
        return true;
    }
    !path.contains("://")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthetic_source_reports_rate_and_duration() {
        let sampler = VideoSampler::open("stub://clip?fps=30&frames=300").unwrap();
        assert_eq!(sampler.frame_rate(), 30);
        assert_eq!(sampler.frame_count(), 300);
        assert_eq!(sampler.duration_seconds(), 10);
    }

    #[test]
    fn duration_truncates_partial_seconds() {
        let sampler = VideoSampler::open("stub://clip?fps=25&frames=24").unwrap();
        assert_eq!(sampler.duration_seconds(), 0);
        let sampler = VideoSampler::open("stub://clip?fps=25&frames=74").unwrap();
        assert_eq!(sampler.duration_seconds(), 2);
    }

    #[test]
    fn reads_frames_and_skips_failures() {
        let mut sampler =
            VideoSampler::open("stub://clip?fps=5&frames=50&width=16&height=8&fail=2").unwrap();
        let frame = sampler.read_frame_at_second(1).expect("frame at second 1");
        assert_eq!(frame.second(), 1);
        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert!(sampler.read_frame_at_second(2).is_none());
        assert!(sampler.read_frame_at_second(10).is_none());
    }

    #[test]
    fn frames_differ_between_seconds() {
        let mut sampler = VideoSampler::open("stub://clip?fps=3&frames=30").unwrap();
        let a = sampler.read_frame_at_second(0).unwrap();
        let b = sampler.read_frame_at_second(1).unwrap();
        assert_ne!(a.pixels(), b.pixels());
    }

    #[test]
    fn rejects_remote_and_missing_paths() {
        let err = VideoSampler::open("rtsp://camera/1").err().unwrap();
        assert!(err.to_string().contains("rtsp://camera/1"));

        let err = VideoSampler::open("missing.mp4").err().unwrap();
        assert!(err.to_string().contains("missing.mp4"));
    }

    #[test]
    fn rejects_bad_stub_parameters() {
        assert!(VideoSampler::open("stub://clip?fps=0").is_err());
        assert!(VideoSampler::open("stub://clip?speed=2").is_err());
        assert!(VideoSampler::open("stub://clip?frames=ten").is_err());
    }
}
