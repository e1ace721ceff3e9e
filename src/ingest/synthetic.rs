//! Synthetic camera for `stub://` devices.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::{CameraSettings, SyntheticSettings};
use crate::error::CaptureError;
use crate::frame::{ChannelOrder, Frame};

/// Generates a moving gradient in the camera's native channel order.
///
/// A seeded generator decides which reads come back empty, so a given
/// seed and drop rate always produce the same sequence.
pub(crate) struct SyntheticSource {
    device: String,
    width: u32,
    height: u32,
    order: ChannelOrder,
    settings: SyntheticSettings,
    rng: StdRng,
    frame_count: u64,
    /// Simulated scene state, bumped every 50 frames.
    scene_state: u8,
}

impl SyntheticSource {
    pub(crate) fn new(camera: &CameraSettings, order: ChannelOrder) -> Self {
        Self {
            device: camera.device.clone(),
            width: camera.width,
            height: camera.height,
            order,
            settings: camera.synthetic,
            rng: StdRng::seed_from_u64(camera.synthetic.seed),
            frame_count: 0,
            scene_state: 0,
        }
    }

    pub(crate) fn next_frame(&mut self) -> Result<Option<Frame>, CaptureError> {
        if self.settings.drop_rate > 0.0 && self.rng.gen::<f32>() < self.settings.drop_rate {
            return Ok(None);
        }
        self.frame_count += 1;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }

        let pixel_count = (self.width as usize) * (self.height as usize) * 3;
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }

        Frame::new(pixels, self.width, self.height, self.order, self.frame_count)
            .map(Some)
            .map_err(|err| CaptureError::Read {
                device: self.device.clone(),
                reason: err.to_string(),
            })
    }

    pub(crate) fn frames_captured(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DetectorConfig;

    fn settings(drop_rate: f32) -> CameraSettings {
        let mut camera = DetectorConfig::default().camera;
        camera.device = "stub://test".into();
        camera.width = 8;
        camera.height = 4;
        camera.synthetic = SyntheticSettings { drop_rate, seed: 7 };
        camera
    }

    #[test]
    fn produces_frames_in_native_order() {
        let mut source = SyntheticSource::new(&settings(0.0), ChannelOrder::Bgr);
        let frame = source.next_frame().unwrap().expect("frame");
        assert_eq!((frame.width, frame.height), (8, 4));
        assert_eq!(frame.order(), ChannelOrder::Bgr);
        assert_eq!(frame.sequence, 1);
        assert_eq!(source.frames_captured(), 1);
    }

    #[test]
    fn drop_pattern_is_reproducible() {
        let pattern = |seed_source: &mut SyntheticSource| -> Vec<bool> {
            (0..64)
                .map(|_| seed_source.next_frame().unwrap().is_some())
                .collect()
        };
        let mut a = SyntheticSource::new(&settings(0.5), ChannelOrder::Rgb);
        let mut b = SyntheticSource::new(&settings(0.5), ChannelOrder::Rgb);
        let first = pattern(&mut a);
        assert_eq!(first, pattern(&mut b));
        assert!(first.iter().any(|got| !got));
        assert!(first.iter().any(|got| *got));
    }
}
