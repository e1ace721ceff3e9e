//! Panel Detector
//!
//! Runs an object detector over a single camera and shows the strongest
//! detections on a tiny I2C display: a 128×64 OLED panel or a 16×2
//! character LCD.
//!
//! # Architecture
//!
//! One synchronous loop, owned by [`PipelineDriver`]:
//!
//! 1. **Capture**: one frame from the [`FrameSource`], or back off and retry.
//! 2. **Infer**: the [`InferenceBackend`] returns thresholded, NMS-filtered detections.
//! 3. **Rank**: [`DetectionRanker`] sorts by confidence and keeps what the display can show.
//! 4. **Display**: a [`DisplayComposer`] lays out localized labels and the FPS readout.
//!
//! Failures are isolated by peripheral. The model and the camera are
//! required; the display is not, and a broken display never stops the loop.
//!
//! # Module Structure
//!
//! - `config`: immutable runtime configuration (file, env, CLI overrides)
//! - `ingest`: camera variants and pixel-format normalization
//! - `detect`: inference backends, YOLO decoding, COCO classes
//! - `rank`, `labels`, `fps`: per-frame policy
//! - `display`: layouts for both surfaces and their sinks
//! - `pipeline`: startup, the run loop and shutdown

pub mod config;
pub mod detect;
pub mod display;
pub mod error;
pub mod fps;
pub mod frame;
pub mod ingest;
pub mod labels;
pub mod pipeline;
pub mod rank;

pub use config::{CameraKind, DetectorConfig, DisplayBackend, DisplayKind, ModelBackend};
pub use detect::{BoundingBox, Detection, InferenceBackend, StubBackend, Thresholds};
pub use display::{CharDisplay, DisplayComposer, DisplaySink, PixelPanel};
pub use error::{CaptureError, DisplayError, ErrorKind, InferenceError, PipelineError};
pub use fps::FpsEstimator;
pub use frame::{ChannelOrder, Frame};
pub use ingest::{Camera, FrameSource};
pub use labels::{LabelLang, Localizer};
pub use pipeline::{
    Peripherals, PipelineDriver, PipelineState, RunSummary, StopReason, SystemPeripherals,
};
pub use rank::{DetectionRanker, RankedDetections};
