//! V4L2 capture for CSI and USB cameras.
//!
//! Opens the device node, negotiates a format close to the requested
//! resolution, and hands out frames normalized to packed 3-channel pixels.

use anyhow::{anyhow, Context, Result};
use ouroboros::self_referencing;

use super::normalize::{normalize, PixelFormat};
use crate::config::{CameraKind, CameraSettings};
use crate::frame::{ChannelOrder, Frame};

pub(crate) struct V4l2Capture {
    device_path: String,
    state: Option<V4l2State>,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2State {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Capture {
    pub(crate) fn open(camera: &CameraSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&camera.device)
            .with_context(|| format!("open v4l2 device {}", camera.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = camera.width;
        format.height = camera.height;
        // CSI modules expose packed RGB; UVC webcams usually stream YUYV.
        format.fourcc = match camera.kind {
            CameraKind::Csi => v4l::FourCC::new(b"RGB3"),
            CameraKind::Usb => v4l::FourCC::new(b"YUYV"),
        };

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("v4l2: failed to set format on {}: {}", camera.device, err);
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        let pixel_format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "device {} negotiated unsupported format {}",
                camera.device,
                format.fourcc
            )
        })?;

        if camera.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(camera.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!("v4l2: failed to set fps on {}: {}", camera.device, err);
            }
        }

        let state = V4l2StateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()?;

        log::info!(
            "v4l2: streaming {} at {}x{} ({:?})",
            camera.device,
            format.width,
            format.height,
            pixel_format
        );
        Ok(Self {
            device_path: camera.device.clone(),
            state: Some(state),
            format: pixel_format,
            width: format.width,
            height: format.height,
            frame_count: 0,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| anyhow!("v4l2 device {} is released", self.device_path))?;
        let (width, height, format) = (self.width, self.height, self.format);
        // Buffers are only valid inside the borrow, so normalize there.
        let normalized = state.with_mut(|fields| -> Result<Option<(Vec<u8>, ChannelOrder)>> {
            let (buf, meta) = fields.stream.next().context("capture v4l2 frame")?;
            if meta.bytesused == 0 {
                return Ok(None);
            }
            let used = (meta.bytesused as usize).min(buf.len());
            normalize(&buf[..used], width, height, format).map(Some)
        })?;
        let Some((pixels, order)) = normalized else {
            return Ok(None);
        };

        self.frame_count += 1;
        Frame::new(pixels, self.width, self.height, order, self.frame_count).map(Some)
    }

    pub(crate) fn release(&mut self) {
        // Dropping the stream unmaps the buffers and stops streaming.
        self.state = None;
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}
