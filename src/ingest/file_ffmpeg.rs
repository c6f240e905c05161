//! Local video file decoding using FFmpeg.
//!
//! Frames are decoded in-memory and converted to packed RGB24. Random access
//! is a seek to the nearest keyframe at or before the target time followed by
//! forward decoding to the first frame at or after the target index.

use anyhow::{anyhow, Context, Result};
use ffmpeg_next as ffmpeg;

use crate::frame::Frame;

const MICROS_PER_SECOND: f64 = 1_000_000.0;

pub(crate) struct FfmpegVideoSource {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    time_base: f64,
    /// First pts of the stream, in `time_base` units.
    start_pts: i64,
    decoder: ffmpeg::codec::decoder::Video,
    scaler: ffmpeg::software::scaling::Context,
    exact_rate: f64,
    frame_count: u64,
}

impl FfmpegVideoSource {
    pub(crate) fn new(path: &str) -> Result<Self> {
        ffmpeg::init().context("initialize ffmpeg")?;
        let input = ffmpeg::format::input(&path)
            .with_context(|| format!("failed to open '{}' with ffmpeg", path))?;
        let input_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| anyhow!("file has no video track"))?;
        let stream_index = input_stream.index();
        let time_base = f64::from(input_stream.time_base());
        let start_pts = match input_stream.start_time() {
            ffmpeg::ffi::AV_NOPTS_VALUE => 0,
            start => start,
        };

        let mut exact_rate = f64::from(input_stream.avg_frame_rate());
        if !exact_rate.is_finite() || exact_rate <= 0.0 {
            exact_rate = f64::from(input_stream.rate());
        }
        if !exact_rate.is_finite() || exact_rate < 0.0 {
            exact_rate = 0.0;
        }

        let frame_count = if input_stream.frames() > 0 {
            input_stream.frames() as u64
        } else {
            let duration_secs = if input_stream.duration() > 0 {
                input_stream.duration() as f64 * time_base
            } else {
                input.duration().max(0) as f64 / MICROS_PER_SECOND
            };
            (duration_secs * exact_rate).round() as u64
        };

        let context = ffmpeg::codec::context::Context::from_parameters(input_stream.parameters())
            .context("load video decoder parameters")?;
        let decoder = context
            .decoder()
            .video()
            .context("open ffmpeg video decoder")?;

        let scaler = ffmpeg::software::scaling::context::Context::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            ffmpeg::util::format::pixel::Pixel::RGB24,
            decoder.width(),
            decoder.height(),
            ffmpeg::software::scaling::flag::Flags::BILINEAR,
        )
        .context("create ffmpeg scaler")?;

        log::info!(
            "video: {} ({}x{}, {:.3} fps, {} frames)",
            path,
            decoder.width(),
            decoder.height(),
            exact_rate,
            frame_count
        );

        Ok(Self {
            input,
            stream_index,
            time_base,
            start_pts,
            decoder,
            scaler,
            exact_rate,
            frame_count,
        })
    }

    /// Whole frames per second, truncated.
    pub(crate) fn frame_rate(&self) -> u32 {
        self.exact_rate as u32
    }

    pub(crate) fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub(crate) fn read_frame(&mut self, index: u64, second: u64) -> Result<Option<Frame>> {
        if self.exact_rate <= 0.0 || self.time_base <= 0.0 {
            return Err(anyhow!("stream has no usable timing information"));
        }
        let SeekTarget {
            pts: target_pts,
            tolerance,
            seek_ts,
        } = SeekTarget::for_index(index, self.exact_rate, self.time_base, self.start_pts);

        self.input
            .seek(seek_ts, ..seek_ts)
            .with_context(|| format!("seek to frame {}", index))?;
        self.decoder.flush();

        let mut decoded = ffmpeg::frame::Video::empty();
        let mut rgb_frame = ffmpeg::frame::Video::empty();

        for (stream, packet) in self.input.packets() {
            if stream.index() != self.stream_index {
                continue;
            }
            self.decoder
                .send_packet(&packet)
                .context("send packet to ffmpeg decoder")?;
            while self.decoder.receive_frame(&mut decoded).is_ok() {
                if is_before_target(&decoded, target_pts, tolerance) {
                    continue;
                }
                self.scaler
                    .run(&decoded, &mut rgb_frame)
                    .context("scale frame to RGB")?;
                return frame_from_rgb(&rgb_frame, second).map(Some);
            }
        }

        // End of stream: drain whatever the decoder still holds.
        self.decoder.send_eof().context("flush ffmpeg decoder")?;
        while self.decoder.receive_frame(&mut decoded).is_ok() {
            if is_before_target(&decoded, target_pts, tolerance) {
                continue;
            }
            self.scaler
                .run(&decoded, &mut rgb_frame)
                .context("scale frame to RGB")?;
            return frame_from_rgb(&rgb_frame, second).map(Some);
        }

        Ok(None)
    }
}

/// Where frame `index` lives, in stream and seek (AV_TIME_BASE) units.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SeekTarget {
    pts: i64,
    tolerance: i64,
    seek_ts: i64,
}

impl SeekTarget {
    fn for_index(index: u64, exact_rate: f64, time_base: f64, start_pts: i64) -> Self {
        let offset_secs = index as f64 / exact_rate;
        let start_secs = start_pts as f64 * time_base;
        Self {
            pts: start_pts.saturating_add((offset_secs / time_base).round() as i64),
            tolerance: ((0.5 / exact_rate) / time_base).floor() as i64,
            seek_ts: ((start_secs + offset_secs) * MICROS_PER_SECOND) as i64,
        }
    }
}

fn is_before_target(frame: &ffmpeg::frame::Video, target_pts: i64, tolerance: i64) -> bool {
    match frame.timestamp().or_else(|| frame.pts()) {
        Some(pts) => pts < target_pts - tolerance,
        None => false,
    }
}

fn frame_from_rgb(frame: &ffmpeg::frame::Video, second: u64) -> Result<Frame> {
    let width = frame.width();
    let height = frame.height();
    let row_bytes = (width as usize) * 3;
    let stride = frame.stride(0);
    let data = frame.data(0);

    if stride == row_bytes {
        let len = row_bytes * height as usize;
        let pixels = data
            .get(..len)
            .context("ffmpeg frame is shorter than expected")?
            .to_vec();
        return Frame::from_rgb(pixels, width, height, second);
    }

    let mut pixels = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = row * stride;
        let end = start + row_bytes;
        pixels.extend_from_slice(
            data.get(start..end)
                .context("ffmpeg frame row is out of bounds")?,
        );
    }

    Frame::from_rgb(pixels, width, height, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_counts_from_stream_start() {
        // MPEG-TS: 1/90000 time base, first pts 126000 (1.4 s).
        let target = SeekTarget::for_index(90, 30.0, 1.0 / 90_000.0, 126_000);
        assert_eq!(target.pts, 126_000 + 270_000);
        assert!((1_499..=1_500).contains(&target.tolerance));
        assert!((target.seek_ts - 4_400_000).abs() <= 1);
    }

    #[test]
    fn zero_start_matches_plain_offset() {
        let target = SeekTarget::for_index(50, 25.0, 1.0 / 12_800.0, 0);
        assert_eq!(target.pts, 25_600);
        assert!((target.seek_ts - 2_000_000).abs() <= 1);
    }
}
