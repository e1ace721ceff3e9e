//! Confidence ranking of one frame's detections.

use crate::detect::Detection;

/// A frame's detections chosen for display: confidence-descending and no
/// longer than the display's label capacity.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RankedDetections {
    entries: Vec<Detection>,
}

impl RankedDetections {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn top(&self) -> Option<&Detection> {
        self.entries.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.entries.iter()
    }

    pub fn as_slice(&self) -> &[Detection] {
        &self.entries
    }
}

impl<'a> IntoIterator for &'a RankedDetections {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Stateless ranker configured with the display's label capacity.
#[derive(Clone, Copy, Debug)]
pub struct DetectionRanker {
    max_labels: usize,
}

impl DetectionRanker {
    pub fn new(max_labels: usize) -> Self {
        Self { max_labels }
    }

    pub fn max_labels(&self) -> usize {
        self.max_labels
    }

    /// Sort by confidence, highest first, and keep at most `max_labels`.
    ///
    /// The sort is stable: equal confidences keep their input order. A NaN
    /// confidence ranks below every real score.
    pub fn rank(&self, mut detections: Vec<Detection>) -> RankedDetections {
        detections.sort_by(|a, b| sort_key(b.confidence).total_cmp(&sort_key(a.confidence)));
        detections.truncate(self.max_labels);
        RankedDetections {
            entries: detections,
        }
    }
}

fn sort_key(confidence: f32) -> f32 {
    if confidence.is_nan() {
        f32::NEG_INFINITY
    } else {
        confidence
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn det(name: &str, confidence: f32) -> Detection {
        Detection::new(0, name, confidence, BoundingBox::default())
    }

    fn names(ranked: &RankedDetections) -> Vec<&str> {
        ranked.iter().map(|d| d.class_name.as_str()).collect()
    }

    #[test]
    fn empty_input_ranks_empty() {
        let ranked = DetectionRanker::new(3).rank(Vec::new());
        assert!(ranked.is_empty());
        assert!(ranked.top().is_none());
    }

    #[test]
    fn sorts_descending_and_truncates() {
        let input = vec![
            det("dog", 0.40),
            det("person", 0.92),
            det("cup", 0.55),
            det("car", 0.81),
        ];
        let ranked = DetectionRanker::new(3).rank(input.clone());
        assert_eq!(names(&ranked), vec!["person", "car", "cup"]);

        let ranked = DetectionRanker::new(2).rank(input);
        assert_eq!(names(&ranked), vec!["person", "car"]);
    }

    #[test]
    fn length_is_min_of_input_and_capacity() {
        for n in 0..6 {
            let input: Vec<Detection> = (0..n).map(|i| det("x", i as f32 / 10.0)).collect();
            for cap in 1..4 {
                let ranked = DetectionRanker::new(cap).rank(input.clone());
                assert_eq!(ranked.len(), n.min(cap));
                for pair in ranked.as_slice().windows(2) {
                    assert!(pair[0].confidence >= pair[1].confidence);
                }
            }
        }
    }

    #[test]
    fn ties_keep_input_order() {
        let input = vec![
            det("first", 0.7),
            det("low", 0.2),
            det("second", 0.7),
            det("third", 0.7),
        ];
        let ranked = DetectionRanker::new(3).rank(input);
        assert_eq!(names(&ranked), vec!["first", "second", "third"]);
    }

    #[test]
    fn area_does_not_affect_order() {
        let small = Detection::new(0, "small", 0.6, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        let large = Detection::new(0, "large", 0.6, BoundingBox::new(0.0, 0.0, 500.0, 500.0));
        let ranked = DetectionRanker::new(2).rank(vec![small, large]);
        assert_eq!(names(&ranked), vec!["small", "large"]);
    }

    #[test]
    fn nan_confidence_sorts_last() {
        let ranked = DetectionRanker::new(3).rank(vec![det("nan", f32::NAN), det("real", 0.1)]);
        assert_eq!(names(&ranked), vec!["real", "nan"]);
    }
}
