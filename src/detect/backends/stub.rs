use std::collections::HashMap;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

/// Scripted backend for testing and dry runs.
///
/// Returns the same detections for every frame, unless a per-second schedule
/// entry overrides them for that frame's second.
///
/// Scriptable from a model path:
/// `stub://?det=car,0.9,10,10,50,50&det=traffic+light,0.6,1,2,3,4&at=3:`
/// - `det=<label>,<conf>,<x1>,<y1>,<x2>,<y2>` adds a detection to every frame
///   (`+` in a label is a space)
/// - `at=<second>:<detection>` adds a detection to that second only, and
///   `at=<second>:` alone makes that second report nothing
#[derive(Clone, Debug, Default)]
pub struct StubBackend {
    detections: Vec<Detection>,
    schedule: HashMap<u64, Vec<Detection>>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report `detections` on every frame.
    pub fn with_detections(detections: Vec<Detection>) -> Self {
        Self {
            detections,
            ..Self::default()
        }
    }

    /// Override the detections reported for one second.
    pub fn at_second(mut self, second: u64, detections: Vec<Detection>) -> Self {
        self.schedule.insert(second, detections);
        self
    }

    /// Build a backend from a `stub://` model path.
    pub fn parse(model_path: &str) -> Result<Self> {
        let mut backend = Self::new();
        let Some((_, query)) = model_path.split_once('?') else {
            return Ok(backend);
        };
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (key, value) = pair
                .split_once('=')
                .ok_or_else(|| anyhow!("stub parameter '{}' is missing a value", pair))?;
            match key {
                "det" => backend.detections.push(parse_detection(value)?),
                "at" => {
                    let (second, det) = value
                        .split_once(':')
                        .ok_or_else(|| anyhow!("stub 'at' expects <second>:<detection>, got '{}'", value))?;
                    let second: u64 = second
                        .trim()
                        .parse()
                        .map_err(|_| anyhow!("invalid stub second '{}'", second))?;
                    let scheduled = backend.schedule.entry(second).or_default();
                    if !det.is_empty() {
                        scheduled.push(parse_detection(det)?);
                    }
                }
                other => return Err(anyhow!("unknown stub parameter '{}'", other)),
            }
        }
        Ok(backend)
    }

    /// Number of frames this backend has been asked to process.
    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        Ok(self
            .schedule
            .get(&frame.second())
            .unwrap_or(&self.detections)
            .clone())
    }
}

/// `<label>,<conf>,<x1>,<y1>,<x2>,<y2>`; the label is everything before the
/// last five fields.
fn parse_detection(text: &str) -> Result<Detection> {
    let fields: Vec<&str> = text.rsplitn(6, ',').collect();
    if fields.len() != 6 || fields[5].is_empty() {
        return Err(anyhow!(
            "stub detection '{}' must be <label>,<conf>,<x1>,<y1>,<x2>,<y2>",
            text
        ));
    }
    let coord = |s: &str| {
        s.trim()
            .parse::<i32>()
            .map_err(|_| anyhow!("invalid coordinate '{}' in stub detection '{}'", s, text))
    };
    let confidence: f32 = fields[4]
        .trim()
        .parse()
        .map_err(|_| anyhow!("invalid confidence '{}' in stub detection '{}'", fields[4], text))?;
    let bbox = BoundingBox::new(
        coord(fields[3])?,
        coord(fields[2])?,
        coord(fields[1])?,
        coord(fields[0])?,
    );
    Ok(Detection::new(fields[5].replace('+', " "), confidence, bbox))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_follows_schedule() {
        let car = Detection::new("car", 0.9, BoundingBox::new(10, 10, 50, 50));
        let mut backend = StubBackend::with_detections(vec![car.clone()]).at_second(3, vec![]);

        let r0 = backend.detect(&Frame::filled(8, 8, 0, [0; 3])).unwrap();
        assert_eq!(r0, vec![car]);

        let r3 = backend.detect(&Frame::filled(8, 8, 3, [0; 3])).unwrap();
        assert!(r3.is_empty());
        assert_eq!(backend.calls(), 2);
    }

    #[test]
    fn parses_scripted_model_path() {
        let mut backend = StubBackend::parse(
            "stub://?det=car,0.9,10,10,50,50&det=traffic+light,0.6,1,2,3,4&at=3:&at=4:dog,0.5,-1,0,8,8",
        )
        .unwrap();
        let every = backend.detect(&Frame::filled(8, 8, 0, [0; 3])).unwrap();
        assert_eq!(
            every,
            vec![
                Detection::new("car", 0.9, BoundingBox::new(10, 10, 50, 50)),
                Detection::new("traffic light", 0.6, BoundingBox::new(1, 2, 3, 4)),
            ]
        );
        assert!(backend.detect(&Frame::filled(8, 8, 3, [0; 3])).unwrap().is_empty());
        assert_eq!(
            backend.detect(&Frame::filled(8, 8, 4, [0; 3])).unwrap(),
            vec![Detection::new("dog", 0.5, BoundingBox::new(-1, 0, 8, 8))]
        );
    }

    #[test]
    fn bare_stub_path_reports_nothing() {
        let mut backend = StubBackend::parse("stub://").unwrap();
        assert!(backend.detect(&Frame::filled(8, 8, 0, [0; 3])).unwrap().is_empty());
    }

    #[test]
    fn malformed_stub_detection_is_rejected() {
        assert!(StubBackend::parse("stub://?det=car,0.9,10,10").is_err());
        assert!(StubBackend::parse("stub://?det=car,high,1,2,3,4").is_err());
        assert!(StubBackend::parse("stub://?at=x:car,0.9,1,2,3,4").is_err());
        assert!(StubBackend::parse("stub://?speed=2").is_err());
    }
}
