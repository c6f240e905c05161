use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_VIDEO_PATH: &str = "input.mp4";
const DEFAULT_MODEL_PATH: &str = "yolov8s.onnx";
const DEFAULT_OUTPUT_FOLDER: &str = "frames";
const DEFAULT_METADATA_FILE: &str = "metadata.json";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_SCORE_FLOOR: f32 = 0.25;
const DEFAULT_NMS_IOU: f32 = 0.7;
const DEFAULT_MAX_DETECTIONS: usize = 300;

#[derive(Debug, Deserialize, Default)]
struct IndexerConfigFile {
    video_path: Option<String>,
    model_path: Option<String>,
    output_folder: Option<PathBuf>,
    metadata_file: Option<PathBuf>,
    labels_path: Option<PathBuf>,
    journal_path: Option<PathBuf>,
    font_path: Option<PathBuf>,
    detector: Option<DetectorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    input_size: Option<u32>,
    score_floor: Option<f32>,
    nms_iou: Option<f32>,
    max_detections: Option<usize>,
}

/// Fully resolved run configuration.
#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub video_path: String,
    pub model_path: String,
    pub output_folder: PathBuf,
    pub metadata_file: PathBuf,
    pub labels_path: Option<PathBuf>,
    pub journal_path: Option<PathBuf>,
    /// TrueType font for box labels; the embedded DejaVu Sans Bold otherwise.
    pub font_path: Option<PathBuf>,
    pub detector: DetectorSettings,
}

/// Settings of the model's own post-processing.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorSettings {
    /// Square model input edge in pixels.
    pub input_size: u32,
    /// Score below which the network output is not considered a detection.
    pub score_floor: f32,
    pub nms_iou: f32,
    pub max_detections: usize,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            input_size: DEFAULT_INPUT_SIZE,
            score_floor: DEFAULT_SCORE_FLOOR,
            nms_iou: DEFAULT_NMS_IOU,
            max_detections: DEFAULT_MAX_DETECTIONS,
        }
    }
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            video_path: DEFAULT_VIDEO_PATH.to_string(),
            model_path: DEFAULT_MODEL_PATH.to_string(),
            output_folder: PathBuf::from(DEFAULT_OUTPUT_FOLDER),
            metadata_file: PathBuf::from(DEFAULT_METADATA_FILE),
            labels_path: None,
            journal_path: None,
            font_path: None,
            detector: DetectorSettings::default(),
        }
    }
}

impl IndexerConfig {
    /// Defaults, then the file named by `FRAME_INDEXER_CONFIG`, then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("FRAME_INDEXER_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env();
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: IndexerConfigFile) -> Self {
        let defaults = Self::default();
        let detector_file = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            input_size: detector_file
                .input_size
                .unwrap_or(defaults.detector.input_size),
            score_floor: detector_file
                .score_floor
                .unwrap_or(defaults.detector.score_floor),
            nms_iou: detector_file.nms_iou.unwrap_or(defaults.detector.nms_iou),
            max_detections: detector_file
                .max_detections
                .unwrap_or(defaults.detector.max_detections),
        };
        Self {
            video_path: file.video_path.unwrap_or(defaults.video_path),
            model_path: file.model_path.unwrap_or(defaults.model_path),
            output_folder: file.output_folder.unwrap_or(defaults.output_folder),
            metadata_file: file.metadata_file.unwrap_or(defaults.metadata_file),
            labels_path: file.labels_path,
            journal_path: file.journal_path,
            font_path: file.font_path,
            detector,
        }
    }

    fn apply_env(&mut self) {
        if let Some(path) = env_value("FRAME_INDEXER_VIDEO_PATH") {
            self.video_path = path;
        }
        if let Some(path) = env_value("FRAME_INDEXER_MODEL_PATH") {
            self.model_path = path;
        }
        if let Some(path) = env_value("FRAME_INDEXER_OUTPUT_FOLDER") {
            self.output_folder = PathBuf::from(path);
        }
        if let Some(path) = env_value("FRAME_INDEXER_METADATA_FILE") {
            self.metadata_file = PathBuf::from(path);
        }
        if let Some(path) = env_value("FRAME_INDEXER_LABELS_PATH") {
            self.labels_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("FRAME_INDEXER_JOURNAL_PATH") {
            self.journal_path = Some(PathBuf::from(path));
        }
        if let Some(path) = env_value("FRAME_INDEXER_FONT_PATH") {
            self.font_path = Some(PathBuf::from(path));
        }
    }

    /// Check paths and detector settings. Called by `load`; call again after
    /// applying command-line overrides.
    pub fn validate(&self) -> Result<()> {
        if self.video_path.trim().is_empty() {
            return Err(anyhow!("video_path must not be empty"));
        }
        if self.model_path.trim().is_empty() {
            return Err(anyhow!("model_path must not be empty"));
        }
        if self.output_folder.as_os_str().is_empty() {
            return Err(anyhow!("output_folder must not be empty"));
        }
        if self.metadata_file.as_os_str().is_empty() {
            return Err(anyhow!("metadata_file must not be empty"));
        }
        let det = &self.detector;
        if det.input_size == 0 || det.input_size % 32 != 0 {
            return Err(anyhow!(
                "detector.input_size must be a positive multiple of 32 (got {})",
                det.input_size
            ));
        }
        if !(det.score_floor > 0.0 && det.score_floor <= 1.0) {
            return Err(anyhow!("detector.score_floor must be in (0, 1]"));
        }
        if !(det.nms_iou > 0.0 && det.nms_iou <= 1.0) {
            return Err(anyhow!("detector.nms_iou must be in (0, 1]"));
        }
        if det.max_detections == 0 {
            return Err(anyhow!("detector.max_detections must be greater than zero"));
        }
        Ok(())
    }
}

fn env_value(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

fn read_config_file(path: &Path) -> Result<IndexerConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}
