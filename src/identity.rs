//! Object identifiers.
//!
//! An identifier is `<label>_<x1>_<y1>_<x2>_<y2>`: a pure function of the class
//! label and the exact integer box. It is NOT a tracking ID. The same physical
//! object gets a new identifier whenever its box shifts by a single pixel, and
//! the four coordinates are always the last four `_` fields, so labels that
//! contain `_<digits>` still yield distinct identifiers. If the same
//! identifier ever arrives with a different label, the first label wins.

use std::collections::HashMap;

use crate::detect::{BoundingBox, Detection};
use crate::output::DetectionRecord;

/// Build the identifier for a label and box corners.
pub fn object_id(label: &str, x1: i32, y1: i32, x2: i32, y2: i32) -> String {
    format!("{}_{}_{}_{}_{}", label, x1, y1, x2, y2)
}

/// Convenience wrapper over [`object_id`] for a [`BoundingBox`].
pub fn object_id_for(label: &str, bbox: &BoundingBox) -> String {
    object_id(label, bbox.x1, bbox.y1, bbox.x2, bbox.y2)
}

/// Identifier → first-seen label, owned by a single run.
///
/// Grows monotonically; existing entries are never replaced.
#[derive(Debug, Default)]
pub struct IdentityTable {
    labels: HashMap<String, String>,
}

impl IdentityTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `identifier` on first sight and return its stored label.
    ///
    /// Later calls for the same identifier return the first label regardless
    /// of the `label` argument.
    pub fn resolve(&mut self, identifier: &str, label: &str) -> &str {
        self.labels
            .entry(identifier.to_string())
            .or_insert_with(|| label.to_string())
            .as_str()
    }

    /// Turn a frame's detections into metadata records, resolving each label
    /// through the table. Order is preserved.
    pub fn assign(&mut self, detections: Vec<Detection>) -> Vec<DetectionRecord> {
        detections
            .into_iter()
            .map(|d| {
                let object_id = object_id_for(&d.label, &d.bbox);
                let label = self.resolve(&object_id, &d.label).to_string();
                DetectionRecord {
                    object_id,
                    label,
                    confidence: d.confidence,
                    bbox: d.bbox,
                }
            })
            .collect()
    }

    pub fn get(&self, identifier: &str) -> Option<&str> {
        self.labels.get(identifier).map(String::as_str)
    }

    /// Number of distinct identifiers seen so far.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}
