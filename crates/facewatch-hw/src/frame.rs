//! Pixel format conversion: YUYV and MJPEG to RGB.

use image::{ImageFormat, RgbImage};

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("MJPEG decode failed: {0}")]
    Decode(#[from] image::ImageError),
    #[error("decoded frame is {actual:?}, negotiated {expected:?}")]
    SizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 coefficients.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

/// Decode one MJPEG buffer into RGB, checking it matches the negotiated size.
pub fn mjpeg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.into_rgb8();
    if image.dimensions() != (width, height) {
        return Err(FrameError::SizeMismatch {
            expected: (width, height),
            actual: image.dimensions(),
        });
    }
    Ok(image)
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as f32;
    let cb = u as f32 - 128.0;
    let cr = v as f32 - 128.0;

    let clamp = |x: f32| x.round().clamp(0.0, 255.0) as u8;
    [
        clamp(y + 1.402 * cr),
        clamp(y - 0.344_136 * cb - 0.714_136 * cr),
        clamp(y + 1.772 * cb),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_neutral_chroma_is_grey() {
        // 2x1 image: [Y0=100, U=128, Y1=200, V=128]
        let rgb = yuyv_to_rgb(&[100, 128, 200, 128], 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [100, 100, 100]);
        assert_eq!(rgb.get_pixel(1, 0).0, [200, 200, 200]);
    }

    #[test]
    fn test_yuyv_red_chroma() {
        // Strong Cr pushes red up and green down.
        let rgb = yuyv_to_rgb(&[128, 128, 128, 255], 2, 1).unwrap();
        let px = rgb.get_pixel(0, 0).0;
        assert_eq!(px[0], 255);
        assert!(px[1] < 128);
        assert_eq!(px[2], 128);
    }

    #[test]
    fn test_yuyv_4x2_dimensions() {
        let yuyv = vec![128u8; 16];
        let rgb = yuyv_to_rgb(&yuyv, 4, 2).unwrap();
        assert_eq!(rgb.dimensions(), (4, 2));
    }

    #[test]
    fn test_yuyv_invalid_length() {
        let result = yuyv_to_rgb(&[100, 128], 2, 1);
        assert!(matches!(result, Err(FrameError::InvalidLength { expected: 4, actual: 2 })));
    }

    #[test]
    fn test_mjpeg_garbage_is_decode_error() {
        let result = mjpeg_to_rgb(&[0xde, 0xad, 0xbe, 0xef], 2, 2);
        assert!(matches!(result, Err(FrameError::Decode(_))));
    }
}
