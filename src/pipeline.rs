//! The capture → infer → rank → display loop.
//!
//! [`PipelineDriver`] owns every piece of cross-frame state: the peripheral
//! handles, the FPS estimator and the run counters. Startup is sequential
//! and stops at the first fatal failure (model, then camera); the display is
//! optional and a failure to open it only degrades output.
//!
//! Once running, peripheral failures stay inside the iteration: a capture
//! error is a missed frame and an inference error is an empty frame. Only
//! faults outside the peripherals (a panic included) stop the loop, and
//! cleanup runs on every way out.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::anyhow;

use crate::config::{CameraSettings, DetectorConfig, DisplaySettings, ModelSettings};
use crate::detect::{self, Detection, InferenceBackend};
use crate::display::{self, DisplayComposer, DisplaySink};
use crate::error::{CaptureError, DisplayError, FailureLog, InferenceError, PipelineError};
use crate::fps::FpsEstimator;
use crate::ingest::{Camera, FrameSource};
use crate::labels::Localizer;
use crate::rank::{DetectionRanker, RankedDetections};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PipelineState {
    Uninitialized,
    ModelReady,
    CameraReady,
    Running,
    ShuttingDown,
    Stopped,
}

/// Constructors for the three peripherals.
///
/// The driver never builds hardware handles itself, so tests and bench runs
/// can substitute scripted ones.
pub trait Peripherals {
    fn open_backend(
        &self,
        model: &ModelSettings,
    ) -> Result<Box<dyn InferenceBackend>, InferenceError>;

    fn open_camera(&self, camera: &CameraSettings) -> Result<Box<dyn FrameSource>, CaptureError>;

    fn open_display(&self, display: &DisplaySettings) -> Result<DisplaySink, DisplayError>;
}

/// Peripherals selected by configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemPeripherals;

impl Peripherals for SystemPeripherals {
    fn open_backend(
        &self,
        model: &ModelSettings,
    ) -> Result<Box<dyn InferenceBackend>, InferenceError> {
        detect::open_backend(model)
    }

    fn open_camera(&self, camera: &CameraSettings) -> Result<Box<dyn FrameSource>, CaptureError> {
        Ok(Box::new(Camera::open(camera)?))
    }

    fn open_display(&self, display: &DisplaySettings) -> Result<DisplaySink, DisplayError> {
        display::open_sink(display)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The cancellation flag was raised.
    Interrupted,
    /// `max_frames` frames were processed.
    FrameLimit,
    /// An unrecoverable error ended the loop.
    Failed,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RunSummary {
    pub frames_processed: u64,
    pub frames_missed: u64,
    pub inference_failures: u64,
    pub last_fps: f32,
    pub reason: StopReason,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames processed, {} missed, {} inference failures, last FPS {:.1} ({:?})",
            self.frames_processed,
            self.frames_missed,
            self.inference_failures,
            self.last_fps,
            self.reason
        )
    }
}

/// What one loop iteration did.
#[derive(Clone, Debug, PartialEq)]
pub enum Iteration {
    /// No frame was available; the driver backed off.
    NoFrame,
    Processed { ranked: RankedDetections, fps: f32 },
}

pub struct PipelineDriver {
    config: DetectorConfig,
    state: PipelineState,
    backend: Option<Box<dyn InferenceBackend>>,
    camera: Option<Box<dyn FrameSource>>,
    composer: Option<Box<dyn DisplayComposer>>,
    ranker: DetectionRanker,
    localizer: Localizer,
    fps: FpsEstimator,
    frames_processed: u64,
    frames_missed: u64,
    inference_failures: u64,
    capture_log: FailureLog,
    inference_log: FailureLog,
}

impl PipelineDriver {
    pub fn new(config: DetectorConfig) -> Self {
        let ranker = DetectionRanker::new(config.display.max_labels());
        let localizer = Localizer::new(config.display.label_lang());
        Self {
            config,
            state: PipelineState::Uninitialized,
            backend: None,
            camera: None,
            composer: None,
            ranker,
            localizer,
            fps: FpsEstimator::new(),
            frames_processed: 0,
            frames_missed: 0,
            inference_failures: 0,
            capture_log: FailureLog::with_level(log::Level::Warn),
            inference_log: FailureLog::default(),
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// True once a display composer exists and has a working sink.
    pub fn display_attached(&self) -> bool {
        self.composer
            .as_ref()
            .map(|composer| composer.is_attached())
            .unwrap_or(false)
    }

    /// Run all three startup stages in order.
    pub fn initialize(&mut self, peripherals: &dyn Peripherals) -> Result<(), PipelineError> {
        self.load_model(peripherals)?;
        self.open_camera(peripherals)?;
        self.open_display(peripherals)
    }

    pub fn load_model(&mut self, peripherals: &dyn Peripherals) -> Result<(), PipelineError> {
        self.expect_state(PipelineState::Uninitialized)?;
        log::info!(
            "loading model {} ({:?} backend)",
            self.config.model.name,
            self.config.model.backend
        );
        match peripherals.open_backend(&self.config.model) {
            Ok(backend) => {
                self.backend = Some(backend);
                self.state = PipelineState::ModelReady;
                Ok(())
            }
            Err(err) => {
                log::error!("{} ({})", err, err.hint());
                Err(PipelineError::Model(err))
            }
        }
    }

    pub fn open_camera(&mut self, peripherals: &dyn Peripherals) -> Result<(), PipelineError> {
        self.expect_state(PipelineState::ModelReady)?;
        log::info!(
            "opening {} at {}",
            self.config.camera.kind.label(),
            self.config.camera.device
        );
        match peripherals.open_camera(&self.config.camera) {
            Ok(camera) => {
                log::info!("frame source: {}", camera.describe());
                self.camera = Some(camera);
                self.state = PipelineState::CameraReady;
                Ok(())
            }
            Err(err) => {
                log::error!("{} ({})", err, err.hint());
                Err(PipelineError::Camera(err))
            }
        }
    }

    /// Attach the display. Never fails past the state check: without a sink
    /// the composer turns every call into a no-op.
    pub fn open_display(&mut self, peripherals: &dyn Peripherals) -> Result<(), PipelineError> {
        self.expect_state(PipelineState::CameraReady)?;
        let sink = match peripherals.open_display(&self.config.display) {
            Ok(sink) => Some(sink),
            Err(err) => {
                log::error!("{} ({})", err, err.hint());
                log::warn!("continuing without display");
                None
            }
        };
        let mut composer = display::build_composer(&self.config.display, sink);
        composer.show_starting();
        self.composer = Some(composer);
        Ok(())
    }

    /// Loop until `stop` is raised, `max_frames` is reached, or an iteration
    /// fails or panics. Cleanup always runs before this returns.
    pub fn run(&mut self, stop: &AtomicBool) -> Result<RunSummary, PipelineError> {
        self.expect_state(PipelineState::CameraReady)?;
        if self.composer.is_none() {
            self.composer = Some(display::build_composer(&self.config.display, None));
        }
        self.state = PipelineState::Running;
        self.fps = FpsEstimator::new();
        log::info!("detection loop started");

        let mut failure = None;
        let reason = loop {
            if stop.load(Ordering::SeqCst) {
                log::info!("interrupt received, shutting down");
                break StopReason::Interrupted;
            }
            if let Some(limit) = self.config.run.max_frames {
                if self.frames_processed >= limit {
                    log::info!("processed {} frames, stopping", limit);
                    break StopReason::FrameLimit;
                }
            }
            let err = match panic::catch_unwind(AssertUnwindSafe(|| self.run_iteration())) {
                Ok(Ok(_)) => continue,
                Ok(Err(err)) => err,
                Err(payload) => anyhow!("frame processing panicked: {}", panic_message(&*payload)),
            };
            log::error!("detection loop failed: {:#}", err);
            failure = Some(err);
            break StopReason::Failed;
        };

        let summary = self.shutdown_with(reason);
        match failure {
            Some(err) => Err(PipelineError::Runtime(err)),
            None => Ok(summary),
        }
    }

    /// One pass of the loop body. Peripheral failures are absorbed here:
    /// any capture error counts as a missed frame and any inference error
    /// as a frame without detections. Only driver misuse is returned.
    pub fn run_iteration(&mut self) -> anyhow::Result<Iteration> {
        if self.state != PipelineState::Running {
            return Err(anyhow!("iteration requested in state {:?}", self.state));
        }
        let (Some(camera), Some(backend)) = (self.camera.as_mut(), self.backend.as_mut()) else {
            return Err(anyhow!("pipeline running without camera or model"));
        };

        let frame = match camera.acquire_frame() {
            Ok(Some(frame)) => {
                self.capture_log.recovered("frame capture");
                Some(frame)
            }
            Ok(None) => {
                log::debug!("no frame available from {}", camera.describe());
                None
            }
            Err(err) => {
                self.capture_log.record("frame capture", &err, err.hint());
                None
            }
        };
        let Some(mut frame) = frame else {
            self.frames_missed += 1;
            std::thread::sleep(self.config.run.frame_retry_delay);
            return Ok(Iteration::NoFrame);
        };

        frame.convert_to(backend.channel_order());
        let detections = match backend.infer(&frame, self.config.model.thresholds) {
            Ok(detections) => {
                self.inference_log.recovered("inference");
                detections
            }
            Err(err) => {
                self.inference_failures += 1;
                self.inference_log
                    .record("inference", &err, "frame treated as having no detections");
                Vec::new()
            }
        };
        drop(frame);

        let ranked = self.ranker.rank(detections);
        if let Some(rate) = self.fps.tick() {
            log::debug!("fps window closed: {:.2}", rate);
        }
        let fps = self.fps.current_fps();

        if let Some(composer) = self.composer.as_mut() {
            composer.compose(&ranked, fps);
        }
        if !ranked.is_empty() {
            log::info!(
                "detected: {} | FPS: {:.1}",
                describe_detections(&self.localizer, ranked.as_slice()),
                fps
            );
        }
        self.frames_processed += 1;

        if !self.config.run.loop_yield.is_zero() {
            std::thread::sleep(self.config.run.loop_yield);
        }
        Ok(Iteration::Processed { ranked, fps })
    }

    /// Release the camera and put the display into its stopped state.
    ///
    /// Each step is attempted regardless of the other's outcome. Calling this
    /// on a driver that never ran, or more than once, is harmless.
    pub fn shutdown(&mut self) -> RunSummary {
        self.shutdown_with(StopReason::Interrupted)
    }

    fn shutdown_with(&mut self, reason: StopReason) -> RunSummary {
        if self.state != PipelineState::Stopped {
            self.state = PipelineState::ShuttingDown;
            log::info!("cleaning up resources");

            if let Some(camera) = self.camera.as_mut() {
                match camera.release() {
                    Ok(()) => log::info!("camera released"),
                    Err(err) => log::error!("{} ({})", err, err.hint()),
                }
            }
            if let Some(composer) = self.composer.as_mut() {
                composer.show_stopped();
            }
            self.state = PipelineState::Stopped;
        }

        let summary = self.summary(reason);
        log::info!("stopped: {}", summary);
        summary
    }

    fn summary(&self, reason: StopReason) -> RunSummary {
        RunSummary {
            frames_processed: self.frames_processed,
            frames_missed: self.frames_missed,
            inference_failures: self.inference_failures,
            last_fps: self.fps.current_fps(),
            reason,
        }
    }

    fn expect_state(&self, expected: PipelineState) -> Result<(), PipelineError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(PipelineError::State(self.state, expected))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// `Person(0.92), Car(0.81)`
fn describe_detections(localizer: &Localizer, detections: &[Detection]) -> String {
    detections
        .iter()
        .map(|d| format!("{}({:.2})", localizer.localize(&d.class_name), d.confidence))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, StubBackend};
    use crate::labels::LabelLang;
    use std::time::Duration;

    fn config() -> DetectorConfig {
        let mut cfg = DetectorConfig::default();
        cfg.camera.device = "stub://unit".into();
        cfg.camera.width = 8;
        cfg.camera.height = 8;
        cfg.camera.warmup = Duration::ZERO;
        cfg.model.backend = crate::config::ModelBackend::Stub;
        cfg.display.backend = crate::config::DisplayBackend::Memory;
        cfg.display.stopped_hold = Duration::ZERO;
        cfg.run.frame_retry_delay = Duration::ZERO;
        cfg.run.loop_yield = Duration::ZERO;
        cfg
    }

    #[test]
    fn states_advance_in_order() {
        let mut driver = PipelineDriver::new(config());
        assert_eq!(driver.state(), PipelineState::Uninitialized);
        assert!(matches!(
            driver.open_camera(&SystemPeripherals),
            Err(PipelineError::State(PipelineState::Uninitialized, PipelineState::ModelReady))
        ));

        driver.load_model(&SystemPeripherals).unwrap();
        assert_eq!(driver.state(), PipelineState::ModelReady);
        driver.open_camera(&SystemPeripherals).unwrap();
        assert_eq!(driver.state(), PipelineState::CameraReady);
    }

    #[test]
    fn run_requires_initialization() {
        let mut driver = PipelineDriver::new(config());
        let stop = AtomicBool::new(false);
        assert!(matches!(driver.run(&stop), Err(PipelineError::State(..))));
    }

    #[test]
    fn frame_limit_stops_the_loop() {
        let mut cfg = config();
        cfg.run.max_frames = Some(12);
        let mut driver = PipelineDriver::new(cfg);
        driver.initialize(&SystemPeripherals).unwrap();
        let summary = driver.run(&AtomicBool::new(false)).unwrap();
        assert_eq!(summary.frames_processed, 12);
        assert_eq!(summary.reason, StopReason::FrameLimit);
        assert_eq!(driver.state(), PipelineState::Stopped);
    }

    #[test]
    fn raised_flag_stops_before_the_first_frame() {
        let mut driver = PipelineDriver::new(config());
        driver.initialize(&SystemPeripherals).unwrap();
        let summary = driver.run(&AtomicBool::new(true)).unwrap();
        assert_eq!(summary.frames_processed, 0);
        assert_eq!(summary.reason, StopReason::Interrupted);
    }

    #[test]
    fn summary_line_uses_localized_labels() {
        let localizer = Localizer::new(LabelLang::En);
        let line = describe_detections(
            &localizer,
            &[
                Detection::new(0, "person", 0.92, BoundingBox::default()),
                Detection::new(2, "car", 0.81, BoundingBox::default()),
            ],
        );
        assert_eq!(line, "Person(0.92), Car(0.81)");
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut driver = PipelineDriver::new(config());
        driver.initialize(&SystemPeripherals).unwrap();
        driver.shutdown();
        driver.shutdown();
        assert_eq!(driver.state(), PipelineState::Stopped);
    }
}
