use crate::error::InferenceError;
use crate::frame::{ChannelOrder, Frame};

use super::result::Detection;

/// Score cut-offs passed on every inference call.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Thresholds {
    /// Minimum class confidence for a detection to be reported.
    pub confidence: f32,
    /// Overlap above which lower-scored boxes of the same class are suppressed.
    pub iou: f32,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            confidence: 0.5,
            iou: 0.45,
        }
    }
}

/// Inference backend trait.
///
/// The pipeline treats the model as opaque: one frame in, zero or more
/// detections out. Implementations own whatever state the model needs and
/// must not retain the frame beyond the call.
pub trait InferenceBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Channel order the backend expects; the driver converts frames to it.
    fn channel_order(&self) -> ChannelOrder {
        ChannelOrder::Rgb
    }

    /// Run detection on a frame.
    fn infer(
        &mut self,
        frame: &Frame,
        thresholds: Thresholds,
    ) -> Result<Vec<Detection>, InferenceError>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<(), InferenceError> {
        Ok(())
    }
}
