//! YOLOv8 head decoding and non-maximum suppression.
//!
//! Kept free of any inference runtime so it can be exercised without a model.

use anyhow::{anyhow, Result};

use super::coco;
use super::result::{BoundingBox, Detection};

/// Upper bound on boxes kept after suppression.
pub const MAX_DETECTIONS: usize = 300;

/// Row-major view of a `[4 + classes, candidates]` output tensor.
pub struct YoloOutput<'a> {
    data: &'a [f32],
    channels: usize,
    candidates: usize,
}

impl<'a> YoloOutput<'a> {
    pub fn new(data: &'a [f32], channels: usize, candidates: usize) -> Result<Self> {
        if channels <= 4 {
            return Err(anyhow!(
                "output has {} channels, expected 4 box coordinates plus class scores",
                channels
            ));
        }
        let expected = channels
            .checked_mul(candidates)
            .ok_or_else(|| anyhow!("output shape overflows"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "output length {} does not match shape [{}, {}]",
                data.len(),
                channels,
                candidates
            ));
        }
        Ok(Self {
            data,
            channels,
            candidates,
        })
    }

    pub fn classes(&self) -> usize {
        self.channels - 4
    }

    fn at(&self, channel: usize, candidate: usize) -> f32 {
        self.data[channel * self.candidates + candidate]
    }

    /// Best-scoring candidates above `confidence`, with boxes scaled by
    /// `(sx, sy)` from model input space to frame space.
    pub fn decode(&self, confidence: f32, sx: f32, sy: f32) -> Vec<Detection> {
        let mut detections = Vec::new();
        for i in 0..self.candidates {
            let mut best_class = 0;
            let mut best_score = f32::NEG_INFINITY;
            for class in 0..self.classes() {
                let score = self.at(4 + class, i);
                if score > best_score {
                    best_score = score;
                    best_class = class;
                }
            }
            if best_score.is_nan() || best_score < confidence {
                continue;
            }
            let bbox = BoundingBox::from_center(
                self.at(0, i),
                self.at(1, i),
                self.at(2, i),
                self.at(3, i),
            )
            .scaled(sx, sy);
            let class_name = coco::class_name(best_class)
                .map(str::to_string)
                .unwrap_or_else(|| format!("class{}", best_class));
            detections.push(Detection::new(best_class, class_name, best_score, bbox));
        }
        detections
    }
}

/// Class-aware greedy suppression. Output is ordered by confidence, highest first.
pub fn non_max_suppression(mut detections: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    detections.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let mut kept: Vec<Detection> = Vec::with_capacity(detections.len().min(MAX_DETECTIONS));
    for candidate in detections {
        let overlaps = kept.iter().any(|k| {
            k.class_id == candidate.class_id && k.bbox.iou(&candidate.bbox) > iou_threshold
        });
        if !overlaps {
            kept.push(candidate);
            if kept.len() == MAX_DETECTIONS {
                break;
            }
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Two candidates, two classes: channels = 6.
    fn output_data() -> Vec<f32> {
        vec![
            // cx
            50.0, 200.0, //
            // cy
            50.0, 100.0, //
            // w
            20.0, 40.0, //
            // h
            10.0, 40.0, //
            // class 0 (person)
            0.9, 0.2, //
            // class 1 (bicycle)
            0.1, 0.3,
        ]
    }

    #[test]
    fn decode_filters_by_best_class_score() -> Result<()> {
        let data = output_data();
        let output = YoloOutput::new(&data, 6, 2)?;
        let detections = output.decode(0.5, 2.0, 1.0);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].class_name, "person");
        assert_eq!(detections[0].bbox, BoundingBox::new(80.0, 45.0, 120.0, 55.0));

        let loose = output.decode(0.25, 1.0, 1.0);
        assert_eq!(loose.len(), 2);
        assert_eq!(loose[1].class_name, "bicycle");
        Ok(())
    }

    #[test]
    fn rejects_mismatched_shape() {
        let data = output_data();
        assert!(YoloOutput::new(&data, 6, 3).is_err());
        assert!(YoloOutput::new(&data[..8], 4, 2).is_err());
    }

    #[test]
    fn nms_suppresses_overlaps_within_a_class_only() {
        let a = Detection::coco(0, 0.8, BoundingBox::new(0.0, 0.0, 10.0, 10.0));
        let b = Detection::coco(0, 0.9, BoundingBox::new(1.0, 0.0, 11.0, 10.0));
        let c = Detection::coco(2, 0.7, BoundingBox::new(1.0, 0.0, 11.0, 10.0));
        let d = Detection::coco(0, 0.6, BoundingBox::new(50.0, 50.0, 60.0, 60.0));

        let kept = non_max_suppression(vec![a, b, c, d], 0.45);
        let scores: Vec<f32> = kept.iter().map(|d| d.confidence).collect();
        assert_eq!(scores, vec![0.9, 0.7, 0.6]);
    }
}
