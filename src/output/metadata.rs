//! Per-frame detection metadata.
//!
//! `MetadataDocument` keeps frame entries in insertion (second) order and
//! serializes as one JSON object keyed by `frame_<second>`. It lives in memory
//! until [`MetadataDocument::flush`]; a [`MetadataJournal`] can mirror every
//! entry to an NDJSON file as it is added so a killed run can be recovered
//! with [`MetadataDocument::from_journal`].

use std::collections::HashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::de::{MapAccess, Visitor};
use serde::ser::Serializer;
use serde::{Deserialize, Deserializer, Serialize};
use tempfile::NamedTempFile;

use crate::detect::BoundingBox;
use crate::frame::frame_key;

/// One detection as written to the metadata file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    pub object_id: String,
    pub label: String,
    pub confidence: f32,
    #[serde(rename = "box")]
    pub bbox: BoundingBox,
}

/// Detections for one sampled second. Also the NDJSON journal line format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameEntry {
    #[serde(rename = "frame")]
    pub key: String,
    pub detections: Vec<DetectionRecord>,
}

impl FrameEntry {
    pub fn new(second: u64, detections: Vec<DetectionRecord>) -> Self {
        Self {
            key: frame_key(second),
            detections,
        }
    }
}

/// Ordered mapping `frame_<second>` -> detections.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetadataDocument {
    entries: Vec<FrameEntry>,
    /// key -> position in `entries`
    index: HashMap<String, usize>,
}

impl MetadataDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the detections for `second`.
    pub fn insert(&mut self, second: u64, detections: Vec<DetectionRecord>) {
        self.push(FrameEntry::new(second, detections));
    }

    /// Append an entry. A repeated key replaces the earlier entry in place.
    pub fn push(&mut self, entry: FrameEntry) {
        match self.index.get(&entry.key) {
            Some(&pos) => self.entries[pos] = entry,
            None => {
                self.index.insert(entry.key.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&[DetectionRecord]> {
        self.index
            .get(key)
            .map(|&pos| self.entries[pos].detections.as_slice())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.key.as_str())
    }

    pub fn entries(&self) -> &[FrameEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total detections across all frames.
    pub fn detection_count(&self) -> usize {
        self.entries.iter().map(|e| e.detections.len()).sum()
    }

    /// JSON with four-space indentation.
    pub fn to_json_pretty(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        self.serialize(&mut ser)
            .context("failed to serialize metadata")?;
        Ok(buf)
    }

    /// Write the whole document to `path`.
    ///
    /// The JSON goes to a temporary file next to `path` and is renamed into
    /// place, so readers see either the previous file or the complete new one.
    pub fn flush(&self, path: &Path) -> Result<()> {
        let json = self.to_json_pretty()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create metadata directory {}", dir.display()))?;
        let mut tmp = NamedTempFile::new_in(&dir)
            .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
        tmp.write_all(&json)
            .with_context(|| format!("failed to write metadata for {}", path.display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("failed to sync metadata for {}", path.display()))?;
        tmp.persist(path)
            .with_context(|| format!("failed to write metadata file {}", path.display()))?;
        Ok(())
    }

    /// Read a metadata file written by [`MetadataDocument::flush`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read metadata file {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid metadata file {}", path.display()))
    }

    /// Rebuild a document from an NDJSON journal.
    ///
    /// Blank lines are ignored. An unparsable final line (a write cut short by
    /// a crash) is skipped with a warning; an unparsable line anywhere else is
    /// an error.
    pub fn from_journal(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read journal {}", path.display()))?;
        let lines: Vec<(usize, &str)> = raw
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .collect();
        let mut doc = Self::new();
        for (pos, (line_no, line)) in lines.iter().enumerate() {
            match serde_json::from_str::<FrameEntry>(line) {
                Ok(entry) => doc.push(entry),
                Err(e) if pos + 1 == lines.len() => {
                    log::warn!(
                        "journal {}: skipping truncated final line {}: {}",
                        path.display(),
                        line_no + 1,
                        e
                    );
                }
                Err(e) => {
                    return Err(anyhow!(
                        "journal {}: invalid entry on line {}: {}",
                        path.display(),
                        line_no + 1,
                        e
                    ));
                }
            }
        }
        Ok(doc)
    }
}

impl Serialize for MetadataDocument {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.entries.iter().map(|e| (&e.key, &e.detections)))
    }
}

impl<'de> Deserialize<'de> for MetadataDocument {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct DocumentVisitor;

        impl<'de> Visitor<'de> for DocumentVisitor {
            type Value = MetadataDocument;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a map of frame keys to detection lists")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut doc = MetadataDocument::new();
                while let Some((key, detections)) =
                    map.next_entry::<String, Vec<DetectionRecord>>()?
                {
                    doc.push(FrameEntry { key, detections });
                }
                Ok(doc)
            }
        }

        deserializer.deserialize_map(DocumentVisitor)
    }
}

/// Append-only NDJSON mirror of a [`MetadataDocument`].
pub struct MetadataJournal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl MetadataJournal {
    /// Create (or truncate) the journal at `path`.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create journal directory {}", parent.display())
            })?;
        }
        let file = File::create(path)
            .with_context(|| format!("failed to create journal {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Write one entry as a line and flush it to the OS.
    pub fn append(&mut self, entry: &FrameEntry) -> Result<()> {
        serde_json::to_writer(&mut self.writer, entry)
            .with_context(|| format!("failed to append to journal {}", self.path.display()))?;
        self.writer
            .write_all(b"\n")
            .and_then(|_| self.writer.flush())
            .with_context(|| format!("failed to append to journal {}", self.path.display()))?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
