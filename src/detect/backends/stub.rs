use crate::detect::backend::{InferenceBackend, Thresholds};
use crate::detect::result::{BoundingBox, Detection};
use crate::detect::yolo::non_max_suppression;
use crate::error::InferenceError;
use crate::frame::Frame;

/// Stub backend for bench runs and tests.
///
/// Replays a fixed script of per-frame detections, one entry per call,
/// wrapping around at the end. Thresholds are applied the same way a real
/// model applies them.
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::with_script(default_script())
    }

    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self { script, cursor: 0 }
    }

    /// Number of calls served so far.
    pub fn calls(&self) -> usize {
        self.cursor
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn infer(
        &mut self,
        _frame: &Frame,
        thresholds: Thresholds,
    ) -> Result<Vec<Detection>, InferenceError> {
        if self.script.is_empty() {
            self.cursor += 1;
            return Ok(Vec::new());
        }
        let entry = &self.script[self.cursor % self.script.len()];
        self.cursor += 1;

        let passing: Vec<Detection> = entry
            .iter()
            .filter(|d| d.confidence >= thresholds.confidence)
            .cloned()
            .collect();
        Ok(non_max_suppression(passing, thresholds.iou))
    }
}

fn default_script() -> Vec<Vec<Detection>> {
    let b = BoundingBox::new;
    vec![
        vec![
            Detection::coco(0, 0.92, b(40.0, 60.0, 200.0, 460.0)),
            Detection::coco(2, 0.81, b(300.0, 220.0, 620.0, 400.0)),
            Detection::coco(16, 0.40, b(220.0, 380.0, 300.0, 470.0)),
        ],
        Vec::new(),
        vec![Detection::coco(15, 0.67, b(100.0, 100.0, 260.0, 240.0))],
        vec![
            Detection::coco(0, 0.55, b(10.0, 20.0, 110.0, 300.0)),
            Detection::coco(0, 0.88, b(12.0, 18.0, 112.0, 302.0)),
            Detection::coco(1, 0.71, b(320.0, 200.0, 520.0, 420.0)),
            Detection::coco(9, 0.61, b(560.0, 10.0, 600.0, 90.0)),
        ],
        Vec::new(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::ChannelOrder;

    fn frame() -> Frame {
        Frame::new(vec![0u8; 12], 2, 2, ChannelOrder::Rgb, 0).unwrap()
    }

    #[test]
    fn stub_applies_thresholds_and_wraps() {
        let mut backend = StubBackend::new();
        let thresholds = Thresholds::default();

        let first = backend.infer(&frame(), thresholds).unwrap();
        let names: Vec<&str> = first.iter().map(|d| d.class_name.as_str()).collect();
        assert_eq!(names, vec!["person", "car"]);

        assert!(backend.infer(&frame(), thresholds).unwrap().is_empty());
        assert_eq!(backend.infer(&frame(), thresholds).unwrap().len(), 1);

        // Overlapping people collapse to the stronger box.
        let crowded = backend.infer(&frame(), thresholds).unwrap();
        assert_eq!(crowded.len(), 3);
        assert_eq!(crowded[0].confidence, 0.88);

        backend.infer(&frame(), thresholds).unwrap();
        let wrapped = backend.infer(&frame(), thresholds).unwrap();
        assert_eq!(wrapped.len(), 2);
        assert_eq!(backend.calls(), 6);
    }

    #[test]
    fn empty_script_yields_no_detections() {
        let mut backend = StubBackend::with_script(Vec::new());
        assert!(backend
            .infer(&frame(), Thresholds::default())
            .unwrap()
            .is_empty());
    }
}
