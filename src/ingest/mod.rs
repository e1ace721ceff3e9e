//! Frame sources.
//!
//! The pipeline sees a camera only through [`FrameSource`]: one frame per
//! call, or `None` when the device has nothing ready. [`Camera`] is the
//! concrete source for both supported camera variants:
//! - `stub://…` devices produce synthetic frames (bench runs, tests)
//! - device nodes use V4L2 (feature: ingest-v4l2)
//!
//! Sources deliver frames in their native channel order; the driver
//! converts to the order the inference backend wants.

mod normalize;
mod synthetic;
#[cfg(feature = "ingest-v4l2")]
mod v4l2;

pub use normalize::{normalize, PixelFormat};

use crate::config::{CameraKind, CameraSettings};
use crate::error::CaptureError;
use crate::frame::{ChannelOrder, Frame};

use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
use v4l2::V4l2Capture;

/// Capability interface for anything that produces frames.
pub trait FrameSource: Send {
    /// Human-readable identity for log lines.
    fn describe(&self) -> String;

    /// Next frame, or `Ok(None)` when none is available right now.
    fn acquire_frame(&mut self) -> Result<Option<Frame>, CaptureError>;

    /// Stop streaming and release the device. Safe to call more than once.
    fn release(&mut self) -> Result<(), CaptureError>;
}

impl CameraKind {
    /// Channel order the variant delivers when it is not decoding YUV/JPEG.
    pub fn native_order(&self) -> ChannelOrder {
        match self {
            CameraKind::Csi => ChannelOrder::Rgb,
            CameraKind::Usb => ChannelOrder::Bgr,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CameraKind::Csi => "Raspberry Pi camera",
            CameraKind::Usb => "USB camera",
        }
    }
}

pub struct Camera {
    kind: CameraKind,
    device: String,
    backend: CaptureBackend,
    released: bool,
}

enum CaptureBackend {
    Synthetic(SyntheticSource),
    #[cfg(feature = "ingest-v4l2")]
    Device(V4l2Capture),
}

impl Camera {
    /// Open the camera variant named in the settings and wait for it to settle.
    pub fn open(settings: &CameraSettings) -> Result<Self, CaptureError> {
        let backend = if settings.device.starts_with("stub://") {
            CaptureBackend::Synthetic(SyntheticSource::new(
                settings,
                settings.kind.native_order(),
            ))
        } else {
            open_device(settings)?
        };

        if !settings.warmup.is_zero() {
            std::thread::sleep(settings.warmup);
        }
        log::info!(
            "{} ready: {} at {}x{} @ {} fps",
            settings.kind.label(),
            settings.device,
            settings.width,
            settings.height,
            settings.target_fps
        );
        Ok(Self {
            kind: settings.kind,
            device: settings.device.clone(),
            backend,
            released: false,
        })
    }

    pub fn kind(&self) -> CameraKind {
        self.kind
    }

    pub fn frames_captured(&self) -> u64 {
        match &self.backend {
            CaptureBackend::Synthetic(source) => source.frames_captured(),
            #[cfg(feature = "ingest-v4l2")]
            CaptureBackend::Device(capture) => capture.frames_captured(),
        }
    }
}

impl FrameSource for Camera {
    fn describe(&self) -> String {
        format!("{} ({})", self.kind.label(), self.device)
    }

    fn acquire_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.released {
            return Err(CaptureError::Read {
                device: self.device.clone(),
                reason: "camera already released".into(),
            });
        }
        match &mut self.backend {
            CaptureBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CaptureBackend::Device(capture) => {
                capture.next_frame().map_err(|err| CaptureError::Read {
                    device: self.device.clone(),
                    reason: format!("{:#}", err),
                })
            }
        }
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        if self.released {
            return Ok(());
        }
        match &mut self.backend {
            CaptureBackend::Synthetic(_) => {}
            #[cfg(feature = "ingest-v4l2")]
            CaptureBackend::Device(capture) => capture.release(),
        }
        self.released = true;
        log::info!("{} stopped", self.kind.label());
        Ok(())
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_device(settings: &CameraSettings) -> Result<CaptureBackend, CaptureError> {
    V4l2Capture::open(settings)
        .map(CaptureBackend::Device)
        .map_err(|err| CaptureError::Unavailable {
            device: settings.device.clone(),
            reason: format!("{:#}", err),
        })
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_device(settings: &CameraSettings) -> Result<CaptureBackend, CaptureError> {
    Err(CaptureError::Unavailable {
        device: settings.device.clone(),
        reason: "V4L2 capture not compiled in (rebuild with --features ingest-v4l2, \
                 or use a stub:// device)"
            .into(),
    })
}

/// USB cameras are addressed by index on the command line.
pub fn usb_device_path(index: u32) -> String {
    format!("/dev/video{}", index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;
    use std::time::Duration;

    fn stub_settings(kind: CameraKind) -> CameraSettings {
        let mut camera = DetectorConfig::default().camera;
        camera.kind = kind;
        camera.device = "stub://test".into();
        camera.width = 16;
        camera.height = 8;
        camera.warmup = Duration::ZERO;
        camera
    }

    #[test]
    fn camera_variants_deliver_their_native_order() {
        let mut csi = Camera::open(&stub_settings(CameraKind::Csi)).unwrap();
        let frame = csi.acquire_frame().unwrap().expect("frame");
        assert_eq!(frame.order(), ChannelOrder::Rgb);

        let mut usb = Camera::open(&stub_settings(CameraKind::Usb)).unwrap();
        let frame = usb.acquire_frame().unwrap().expect("frame");
        assert_eq!(frame.order(), ChannelOrder::Bgr);
        assert_eq!(usb.frames_captured(), 1);
    }

    #[test]
    fn release_is_idempotent_and_stops_reads() {
        let mut camera = Camera::open(&stub_settings(CameraKind::Csi)).unwrap();
        camera.release().unwrap();
        camera.release().unwrap();
        assert!(matches!(
            camera.acquire_frame(),
            Err(CaptureError::Read { .. })
        ));
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_nodes_need_v4l2_support() {
        let mut settings = stub_settings(CameraKind::Usb);
        settings.device = usb_device_path(1);
        let err = Camera::open(&settings).err().expect("open must fail");
        assert_eq!(err.kind(), crate::error::ErrorKind::Fatal);
        assert!(err.to_string().contains("/dev/video1"));
    }
}
