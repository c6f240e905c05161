use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::Builder;

use frame_indexer::config::IndexerConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "FRAME_INDEXER_CONFIG",
        "FRAME_INDEXER_VIDEO_PATH",
        "FRAME_INDEXER_MODEL_PATH",
        "FRAME_INDEXER_OUTPUT_FOLDER",
        "FRAME_INDEXER_METADATA_FILE",
        "FRAME_INDEXER_LABELS_PATH",
        "FRAME_INDEXER_JOURNAL_PATH",
        "FRAME_INDEXER_FONT_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_json_config_with_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    let json = r#"{
        "video_path": "clips/parking_lot.mp4",
        "model_path": "weights/yolov8n.onnx",
        "output_folder": "out/frames",
        "metadata_file": "out/parking_lot.json",
        "detector": {
            "input_size": 320,
            "score_floor": 0.4,
            "nms_iou": 0.5,
            "max_detections": 50
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("FRAME_INDEXER_CONFIG", file.path());
    std::env::set_var("FRAME_INDEXER_VIDEO_PATH", "clips/override.mp4");
    std::env::set_var("FRAME_INDEXER_JOURNAL_PATH", "out/journal.ndjson");
    std::env::set_var("FRAME_INDEXER_MODEL_PATH", "   ");
    std::env::set_var("FRAME_INDEXER_FONT_PATH", "fonts/NotoSansCJK.ttc");

    let cfg = IndexerConfig::load().expect("load config");

    assert_eq!(cfg.video_path, "clips/override.mp4");
    assert_eq!(cfg.model_path, "weights/yolov8n.onnx");
    assert_eq!(cfg.output_folder, PathBuf::from("out/frames"));
    assert_eq!(cfg.metadata_file, PathBuf::from("out/parking_lot.json"));
    assert_eq!(cfg.journal_path, Some(PathBuf::from("out/journal.ndjson")));
    assert_eq!(cfg.labels_path, None);
    assert_eq!(cfg.font_path, Some(PathBuf::from("fonts/NotoSansCJK.ttc")));
    assert_eq!(cfg.detector.input_size, 320);
    assert_eq!(cfg.detector.score_floor, 0.4);
    assert_eq!(cfg.detector.nms_iou, 0.5);
    assert_eq!(cfg.detector.max_detections, 50);

    clear_env();
}

#[test]
fn loads_toml_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".toml").tempfile().expect("temp config");
    let toml = r#"
video_path = "dock.mp4"
labels_path = "labels.txt"

[detector]
nms_iou = 0.6
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");
    std::env::set_var("FRAME_INDEXER_CONFIG", file.path());

    let cfg = IndexerConfig::load().expect("load config");
    assert_eq!(cfg.video_path, "dock.mp4");
    assert_eq!(cfg.labels_path, Some(PathBuf::from("labels.txt")));
    assert_eq!(cfg.detector.nms_iou, 0.6);
    assert_eq!(cfg.detector.input_size, 640);
    assert_eq!(cfg.metadata_file, PathBuf::from("metadata.json"));

    clear_env();
}

#[test]
fn rejects_invalid_detector_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = Builder::new().suffix(".json").tempfile().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"detector": {"input_size": 100}}"#)
        .expect("write config");
    std::env::set_var("FRAME_INDEXER_CONFIG", file.path());

    let err = IndexerConfig::load().err().expect("invalid input size");
    assert!(err.to_string().contains("input_size"));

    clear_env();
}

#[test]
fn missing_config_file_is_an_error() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("FRAME_INDEXER_CONFIG", "/nonexistent/frame_indexer.json");
    let err = IndexerConfig::load().err().expect("missing file");
    assert!(err.to_string().contains("/nonexistent/frame_indexer.json"));

    clear_env();
}
