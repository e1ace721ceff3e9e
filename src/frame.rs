//! Captured frames.
//!
//! A `Frame` is an owned, packed 3-channel image tagged with its channel
//! order. Frames are produced by an ingest source, converted (if needed) to
//! the order the inference backend expects, consumed by one inference call
//! and dropped at the end of the iteration.

use anyhow::{anyhow, Result};

/// Byte order of the three color channels in a packed pixel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelOrder {
    Rgb,
    Bgr,
}

pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    order: ChannelOrder,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
}

impl Frame {
    /// Wrap packed pixels. Fails when the buffer length does not match
    /// `width * height * 3`.
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        order: ChannelOrder,
        sequence: u64,
    ) -> Result<Self> {
        let expected = packed_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame buffer length mismatch: expected {} bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            order,
            sequence,
        })
    }

    pub fn order(&self) -> ChannelOrder {
        self.order
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Reorder channels in place. A no-op when the frame already has `target` order.
    pub fn convert_to(&mut self, target: ChannelOrder) {
        if self.order == target {
            return;
        }
        for px in self.data.chunks_exact_mut(3) {
            px.swap(0, 2);
        }
        self.order = target;
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("order", &self.order)
            .field("sequence", &self.sequence)
            .finish_non_exhaustive()
    }
}

pub(crate) fn packed_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(3))
        .ok_or_else(|| anyhow!("frame dimensions {}x{} overflow", width, height))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_wrong_length() {
        assert!(Frame::new(vec![0u8; 5], 1, 2, ChannelOrder::Rgb, 0).is_err());
        assert!(Frame::new(vec![0u8; 6], 1, 2, ChannelOrder::Rgb, 0).is_ok());
    }

    #[test]
    fn converts_bgr_to_rgb() -> Result<()> {
        let mut frame = Frame::new(vec![1, 2, 3, 4, 5, 6], 2, 1, ChannelOrder::Bgr, 7)?;
        frame.convert_to(ChannelOrder::Rgb);
        assert_eq!(frame.order(), ChannelOrder::Rgb);
        assert_eq!(frame.pixels(), &[3, 2, 1, 6, 5, 4]);

        frame.convert_to(ChannelOrder::Rgb);
        assert_eq!(frame.pixels(), &[3, 2, 1, 6, 5, 4]);
        Ok(())
    }
}
