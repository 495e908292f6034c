use anyhow::{anyhow, Context, Result};
use image::RgbImage;

/// Pixel layouts a capture device may hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
    Mjpeg,
}

impl PixelFormat {
    /// Map a V4L2 fourcc to a supported layout.
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            b"MJPG" => Some(PixelFormat::Mjpeg),
            _ => None,
        }
    }
}

pub fn to_rgb_image(pixels: &[u8], width: u32, height: u32, format: PixelFormat) -> Result<RgbImage> {
    let rgb = match format {
        PixelFormat::Rgb24 => {
            check_len(pixels, plane(width, height)?.checked_mul(3), "RGB")?;
            pixels.to_vec()
        }
        PixelFormat::Yuyv => yuyv_to_rgb(pixels, width, height)?,
        PixelFormat::Nv12 => nv12_to_rgb(pixels, width, height)?,
        PixelFormat::Mjpeg => {
            let decoded = image::load_from_memory_with_format(pixels, image::ImageFormat::Jpeg)
                .context("decode MJPEG frame")?;
            return Ok(decoded.to_rgb8());
        }
    };
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| anyhow!("raster size mismatch"))
}

fn plane(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

fn check_len(pixels: &[u8], expected: Option<usize>, kind: &str) -> Result<()> {
    let expected = expected.ok_or_else(|| anyhow!("{} frame dimensions overflow", kind))?;
    if pixels.len() != expected {
        return Err(anyhow!(
            "{} frame length mismatch: expected {}, got {}",
            kind,
            expected,
            pixels.len()
        ));
    }
    Ok(())
}

fn yuyv_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let count = plane(width, height)?;
    check_len(pixels, count.checked_mul(2), "YUYV")?;

    let mut rgb = Vec::with_capacity(count * 3);
    for chunk in pixels.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            rgb.extend_from_slice(&yuv_pixel(y as f32, u, v));
        }
    }
    Ok(rgb)
}

fn nv12_to_rgb(pixels: &[u8], width: u32, height: u32) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let y_plane = plane(width, height)?;
    check_len(pixels, y_plane.checked_add(y_plane / 2), "NV12")?;

    let mut rgb = Vec::with_capacity(y_plane * 3);
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * w + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            rgb.extend_from_slice(&yuv_pixel(y, u, v));
        }
    }
    Ok(rgb)
}

fn yuv_pixel(y: f32, u: f32, v: f32) -> [u8; 3] {
    [
        clamp_to_u8(y + 1.402 * v),
        clamp_to_u8(y - 0.344_136 * u - 0.714_136 * v),
        clamp_to_u8(y + 1.772 * u),
    ]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
