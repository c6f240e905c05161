//! Persisted outputs: annotated JPEGs and the metadata document.

pub mod images;
pub mod metadata;

pub use images::{ensure_output_folder, image_path, write_image, JPEG_QUALITY};
pub use metadata::{DetectionRecord, FrameEntry, MetadataDocument, MetadataJournal};
