mod backend;
mod backends;
pub mod labels;
mod result;
pub mod yolo;

use anyhow::{anyhow, Context, Result};

use crate::config::DetectorSettings;

pub use backend::DetectorBackend;
pub use backends::StubBackend;
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::ClassNames;
pub use result::{BoundingBox, Detection};

/// Model path prefix selecting the scripted stub backend.
pub const STUB_MODEL_PREFIX: &str = "stub://";

/// Load the detector for `model_path`.
///
/// `stub://...` selects [`StubBackend`], scripted by the path's query; anything else is
/// treated as an ONNX file for the tract backend. Every failure names the
/// model path so a bad weights file aborts the run with a clear message.
pub fn load_backend(
    model_path: &str,
    settings: &DetectorSettings,
    names: ClassNames,
) -> Result<Box<dyn DetectorBackend>> {
    if model_path.starts_with(STUB_MODEL_PREFIX) {
        let backend = StubBackend::parse(model_path)
            .with_context(|| format!("failed to load detection model '{}'", model_path))?;
        log::info!("detector: stub backend ({})", model_path);
        return Ok(Box::new(backend));
    }
    if !std::path::Path::new(model_path).is_file() {
        return Err(anyhow!(
            "failed to load detection model '{}': file not found",
            model_path
        ));
    }
    load_onnx(model_path, settings, names)
        .with_context(|| format!("failed to load detection model '{}'", model_path))
}

#[cfg(feature = "backend-tract")]
fn load_onnx(
    model_path: &str,
    settings: &DetectorSettings,
    names: ClassNames,
) -> Result<Box<dyn DetectorBackend>> {
    let mut backend = TractBackend::new(model_path, settings.clone(), names)?;
    backend.warm_up().context("model warm-up failed")?;
    log::info!(
        "detector: tract backend, input {}x{}",
        settings.input_size,
        settings.input_size
    );
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn load_onnx(
    _model_path: &str,
    _settings: &DetectorSettings,
    _names: ClassNames,
) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("ONNX inference requires the backend-tract feature"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_prefix_selects_stub_backend() {
        let backend = load_backend("stub://", &DetectorSettings::default(), ClassNames::coco())
            .expect("stub backend");
        assert_eq!(backend.name(), "stub");
    }

    #[test]
    fn scripted_stub_path_reports_its_detections() {
        let mut backend = load_backend(
            "stub://?det=car,0.9,10,10,50,50",
            &DetectorSettings::default(),
            ClassNames::coco(),
        )
        .expect("stub backend");
        let found = backend.detect(&crate::frame::Frame::filled(8, 8, 0, [0; 3])).unwrap();
        assert_eq!(found, vec![Detection::new("car", 0.9, BoundingBox::new(10, 10, 50, 50))]);
    }

    #[test]
    fn malformed_stub_path_names_model() {
        let err = load_backend("stub://?det=car", &DetectorSettings::default(), ClassNames::coco())
            .err()
            .expect("malformed stub must fail");
        assert!(format!("{:#}", err).contains("stub://?det=car"));
    }

    #[test]
    fn missing_model_error_names_path() {
        let err = load_backend(
            "definitely/not/here.onnx",
            &DetectorSettings::default(),
            ClassNames::coco(),
        )
        .err()
        .expect("missing model must fail");
        assert!(format!("{:#}", err).contains("definitely/not/here.onnx"));
    }
}
