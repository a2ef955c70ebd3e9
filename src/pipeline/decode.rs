//! Frame payload decoding.

use crate::error::{LipstreamError, Result};
use crate::pipeline::types::Frame;
use image::imageops::FilterType;

/// Decodes encoded images (PNG, JPEG) into square RGB frames.
#[derive(Debug, Clone, Copy)]
pub struct FrameDecoder {
    size: u32,
}

impl FrameDecoder {
    pub fn new(size: u32) -> Self {
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// Decode and resize one payload. `index` is the arrival index the frame
    /// will carry if decoding succeeds.
    pub fn decode(&self, index: u64, payload: &[u8]) -> Result<Frame> {
        let decoded =
            image::load_from_memory(payload).map_err(|e| LipstreamError::MalformedFrame {
                index,
                message: e.to_string(),
            })?;
        let rgb = if decoded.width() == self.size && decoded.height() == self.size {
            decoded.to_rgb8()
        } else {
            decoded
                .resize_exact(self.size, self.size, FilterType::Triangle)
                .to_rgb8()
        };
        Ok(Frame::new(index, rgb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn encode(image: &RgbImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, format).unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_decode_png_resizes_to_square() {
        let image = RgbImage::from_pixel(40, 20, Rgb([200, 10, 10]));
        let payload = encode(&image, ImageOutputFormat::Png);

        let frame = FrameDecoder::new(16).decode(7, &payload).unwrap();
        assert_eq!(frame.index, 7);
        assert_eq!(frame.dimensions(), (16, 16));
        assert_eq!(frame.image.get_pixel(8, 8).0[0], 200);
    }

    #[test]
    fn test_decode_jpeg() {
        let image = RgbImage::from_pixel(32, 32, Rgb([128, 128, 128]));
        let payload = encode(&image, ImageOutputFormat::Jpeg(90));

        let frame = FrameDecoder::new(32).decode(0, &payload).unwrap();
        assert_eq!(frame.dimensions(), (32, 32));
        let value = frame.image.get_pixel(0, 0).0[1];
        assert!((120..=136).contains(&value));
    }

    #[test]
    fn test_garbage_is_malformed_frame() {
        let err = FrameDecoder::new(8).decode(3, b"not an image").unwrap_err();
        assert!(matches!(err, LipstreamError::MalformedFrame { index: 3, .. }));
    }

    #[test]
    fn test_empty_payload_is_malformed_frame() {
        assert!(FrameDecoder::new(8).decode(0, &[]).is_err());
    }
}
