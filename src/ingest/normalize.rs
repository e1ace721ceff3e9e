use anyhow::{anyhow, Result};

use crate::frame::{packed_len, ChannelOrder};

/// Pixel layouts a camera may negotiate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Bgr24,
    Yuyv,
    Mjpeg,
}

impl PixelFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"BGR3" => Some(PixelFormat::Bgr24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }
}

/// Convert a captured buffer to packed 3-channel pixels.
///
/// Packed formats keep their native channel order; YUV and JPEG input
/// decodes to RGB.
pub fn normalize(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<(Vec<u8>, ChannelOrder)> {
    match format {
        PixelFormat::Rgb24 => Ok((packed(pixels, width, height)?, ChannelOrder::Rgb)),
        PixelFormat::Bgr24 => Ok((packed(pixels, width, height)?, ChannelOrder::Bgr)),
        PixelFormat::Yuyv => Ok((yuyv_to_rgb(pixels, width, height)?, ChannelOrder::Rgb)),
        PixelFormat::Mjpeg => Ok((mjpeg_to_rgb(pixels, width, height)?, ChannelOrder::Rgb)),
    }
}

fn packed(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let expected = packed_len(width, height)?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "packed frame length mismatch: expected {}, got {}",
            expected,
            pixels.len()
        ));
    }
    Ok(pixels.to_vec())
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("YUYV frame dimensions overflow"))?;
    if width % 2 != 0 {
        return Err(anyhow!("YUYV frames need an even width, got {}", width));
    }
    if pixels.len() != pixel_count * 2 {
        return Err(anyhow!(
            "YUYV frame length mismatch: expected {}, got {}",
            pixel_count * 2,
            pixels.len()
        ));
    }

    let mut rgb = Vec::with_capacity(pixel_count * 3);
    for quad in pixels.chunks_exact(4) {
        let u = quad[1] as f32 - 128.0;
        let v = quad[3] as f32 - 128.0;
        for y in [quad[0], quad[2]] {
            let y = y as f32;
            rgb.push(clamp_to_u8(y + 1.402_f32 * v));
            rgb.push(clamp_to_u8(y - 0.344_136_f32 * u - 0.714_136_f32 * v));
            rgb.push(clamp_to_u8(y + 1.772_f32 * u));
        }
    }
    Ok(rgb)
}

#[cfg(feature = "image")]
fn mjpeg_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(pixels, image::ImageFormat::Jpeg)
        .map_err(|e| anyhow!("MJPEG decode failed: {}", e))?
        .into_rgb8();
    if decoded.width() != width || decoded.height() != height {
        return Err(anyhow!(
            "MJPEG frame is {}x{}, negotiated {}x{}",
            decoded.width(),
            decoded.height(),
            width,
            height
        ));
    }
    Ok(decoded.into_raw())
}

#[cfg(not(feature = "image"))]
fn mjpeg_to_rgb(_pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<u8>> {
    Err(anyhow!("MJPEG input needs the `image` feature"))
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yuyv_conversion_produces_gray() -> Result<()> {
        let yuyv = vec![128u8, 128, 128, 128];
        let (rgb, order) = normalize(&yuyv, 2, 1, PixelFormat::Yuyv)?;
        assert_eq!(rgb, vec![128u8; 6]);
        assert_eq!(order, ChannelOrder::Rgb);
        Ok(())
    }

    #[test]
    fn packed_pass_through_keeps_order_and_validates_length() -> Result<()> {
        let pixels = vec![1u8; 9];
        let (out, order) = normalize(&pixels, 1, 3, PixelFormat::Bgr24)?;
        assert_eq!(out, pixels);
        assert_eq!(order, ChannelOrder::Bgr);
        assert!(normalize(&pixels, 2, 3, PixelFormat::Rgb24).is_err());
        Ok(())
    }

    #[test]
    fn maps_fourcc_codes() {
        assert_eq!(PixelFormat::from_fourcc(b"YUYV"), Some(PixelFormat::Yuyv));
        assert_eq!(PixelFormat::from_fourcc(b"MJPG"), Some(PixelFormat::Mjpeg));
        assert_eq!(PixelFormat::from_fourcc(b"NV12"), None);
    }
}
