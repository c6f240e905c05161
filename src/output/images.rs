use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::frame::{frame_key, Frame};

/// JPEG quality for annotated frames.
pub const JPEG_QUALITY: u8 = 95;

/// `<folder>/frame_<second>.jpg`.
pub fn image_path(folder: &Path, second: u64) -> PathBuf {
    folder.join(format!("{}.jpg", frame_key(second)))
}

/// Create the output folder if it does not exist. Safe to call repeatedly.
pub fn ensure_output_folder(folder: &Path) -> Result<()> {
    std::fs::create_dir_all(folder)
        .with_context(|| format!("failed to create output folder {}", folder.display()))
}

/// Encode `frame` as JPEG into `folder`, returning the written path.
pub fn write_image(frame: &Frame, folder: &Path) -> Result<PathBuf> {
    ensure_output_folder(folder)?;
    let path = image_path(folder, frame.second());
    let file = File::create(&path)
        .with_context(|| format!("failed to create image {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY);
    frame
        .image()
        .write_with_encoder(encoder)
        .with_context(|| format!("failed to encode image {}", path.display()))?;
    writer
        .flush()
        .with_context(|| format!("failed to write image {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_jpeg_named_by_second() {
        let dir = tempfile::tempdir().unwrap();
        let folder = dir.path().join("out");
        let frame = Frame::filled(32, 24, 4, [10, 200, 30]);

        let path = write_image(&frame, &folder).unwrap();
        assert_eq!(path, folder.join("frame_4.jpg"));

        let bytes = std::fs::read(&path).unwrap();
        assert!(bytes.len() > 2);
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);

        // Folder already exists: still fine.
        write_image(&frame, &folder).unwrap();
    }
}
