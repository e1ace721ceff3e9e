//! Typed failures for each peripheral boundary.
//!
//! Every error reports an [`ErrorKind`] so the driver can decide between
//! aborting, degrading, or retrying without inspecting message text, and a
//! `hint()` that is appended to the log line as a remediation suggestion.

use std::fmt;

use thiserror::Error;

/// How the pipeline reacts to a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// Abort startup.
    Fatal,
    /// Keep running without the affected output.
    Degraded,
    /// Skip this frame and retry on the next iteration.
    Transient,
}

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("camera {device} unavailable: {reason}")]
    Unavailable { device: String, reason: String },
    #[error("frame read from {device} failed: {reason}")]
    Read { device: String, reason: String },
    #[error("camera release failed: {0}")]
    Release(String),
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::Unavailable { .. } => ErrorKind::Fatal,
            CaptureError::Read { .. } => ErrorKind::Transient,
            CaptureError::Release(_) => ErrorKind::Degraded,
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            CaptureError::Unavailable { .. } => {
                "check the camera cable/device node (ls /dev/video*, v4l2-ctl --list-devices) \
                 and that no other process holds the camera"
            }
            CaptureError::Read { .. } => "frame dropped; the camera may be overloaded or unplugged",
            CaptureError::Release(_) => "the device may already be closed",
        }
    }
}

#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("failed to load model {model}: {reason}")]
    Load { model: String, reason: String },
    #[error("inference failed: {0}")]
    Run(String),
}

impl InferenceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            InferenceError::Load { .. } => ErrorKind::Fatal,
            InferenceError::Run(_) => ErrorKind::Transient,
        }
    }

    pub fn hint(&self) -> &'static str {
        match self {
            InferenceError::Load { .. } => {
                "check the model path and that the binary was built with the matching backend feature"
            }
            InferenceError::Run(_) => "frame treated as having no detections",
        }
    }
}

#[derive(Debug, Error)]
pub enum DisplayError {
    #[error("display unavailable: {0}")]
    Unavailable(String),
    #[error("display refresh failed: {0}")]
    Draw(String),
}

impl DisplayError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Degraded
    }

    pub fn hint(&self) -> &'static str {
        match self {
            DisplayError::Unavailable(_) => {
                "check the I2C wiring, bus number and address (i2cdetect -y 1); continuing without display"
            }
            DisplayError::Draw(_) => "skipping this refresh; the next frame will retry",
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("model initialization failed")]
    Model(#[source] InferenceError),
    #[error("camera initialization failed")]
    Camera(#[source] CaptureError),
    #[error("pipeline is {0:?}, expected {1:?}")]
    State(crate::pipeline::PipelineState, crate::pipeline::PipelineState),
    #[error("frame processing failed: {0:#}")]
    Runtime(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Fatal
    }

    pub fn hint(&self) -> &'static str {
        match self {
            PipelineError::Model(err) => err.hint(),
            PipelineError::Camera(err) => err.hint(),
            PipelineError::State(..) => "initialize the pipeline before running it",
            PipelineError::Runtime(_) => "the loop stopped; see the preceding log lines",
        }
    }
}

/// Tracks consecutive failures of one recurring operation so a dead
/// peripheral does not flood the log at frame rate.
///
/// The first failure is logged at `level`, then every 100th at warn.
#[derive(Debug)]
pub(crate) struct FailureLog {
    level: log::Level,
    consecutive: u64,
}

impl Default for FailureLog {
    fn default() -> Self {
        Self::with_level(log::Level::Error)
    }
}

impl FailureLog {
    pub(crate) fn with_level(level: log::Level) -> Self {
        Self {
            level,
            consecutive: 0,
        }
    }

    pub(crate) fn record(&mut self, what: &str, err: &dyn fmt::Display, hint: &str) {
        self.consecutive += 1;
        if self.consecutive == 1 {
            log::log!(self.level, "{} failed: {} ({})", what, err, hint);
        } else if self.consecutive % 100 == 0 {
            log::warn!(
                "{} still failing after {} attempts: {}",
                what,
                self.consecutive,
                err
            );
        }
    }

    pub(crate) fn recovered(&mut self, what: &str) {
        if self.consecutive > 0 {
            log::info!("{} recovered after {} failures", what, self.consecutive);
            self.consecutive = 0;
        }
    }

    #[cfg(test)]
    pub(crate) fn consecutive(&self) -> u64 {
        self.consecutive
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peripheral_failures_are_classified() {
        let camera = CaptureError::Unavailable {
            device: "/dev/video0".into(),
            reason: "no such device".into(),
        };
        assert_eq!(camera.kind(), ErrorKind::Fatal);

        let read = CaptureError::Read {
            device: "/dev/video0".into(),
            reason: "timeout".into(),
        };
        assert_eq!(read.kind(), ErrorKind::Transient);

        assert_eq!(InferenceError::Run("boom".into()).kind(), ErrorKind::Transient);
        assert_eq!(
            DisplayError::Unavailable("no ack".into()).kind(),
            ErrorKind::Degraded
        );
        assert!(DisplayError::Unavailable("no ack".into())
            .hint()
            .contains("i2cdetect"));
    }

    #[test]
    fn pipeline_error_forwards_source_hint() {
        let err = PipelineError::Model(InferenceError::Load {
            model: "yolov8n.onnx".into(),
            reason: "missing".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Fatal);
        assert!(err.hint().contains("model path"));
    }

    #[test]
    fn failure_log_counts_until_recovery() {
        let mut failures = FailureLog::default();
        let err = DisplayError::Draw("nak".into());
        for _ in 0..3 {
            failures.record("refresh", &err, err.hint());
        }
        assert_eq!(failures.consecutive(), 3);
        failures.recovered("refresh");
        assert_eq!(failures.consecutive(), 0);
    }
}
