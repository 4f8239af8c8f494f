use anyhow::{Context, Result};
use image::{codecs::jpeg::JpegEncoder, RgbImage};

/// An encoded frame, ready for the OCR engine.
#[derive(Debug, Clone)]
pub struct FramePayload {
    pub width: u32,
    pub height: u32,
    pub jpeg: Vec<u8>,
}

/// Off-screen canvas the current frame is drawn into before JPEG encoding.
/// The buffer is reused while the stream resolution stays the same.
pub struct FrameSampler {
    canvas: Option<RgbImage>,
    quality: u8,
}

impl FrameSampler {
    pub fn new(quality: u8) -> Self {
        Self {
            canvas: None,
            quality: quality.clamp(1, 100),
        }
    }

    pub fn sample(&mut self, frame: &RgbImage) -> Result<FramePayload> {
        let (width, height) = frame.dimensions();
        let canvas = match self.canvas.take() {
            Some(canvas) if canvas.dimensions() == (width, height) => canvas,
            _ => RgbImage::new(width, height),
        };
        let canvas = self.canvas.insert(canvas);
        canvas.copy_from_slice(frame.as_raw());

        let mut jpeg = Vec::new();
        JpegEncoder::new_with_quality(&mut jpeg, self.quality)
            .encode_image(&*canvas)
            .with_context(|| format!("failed to encode {width}x{height} frame as JPEG"))?;

        Ok(FramePayload {
            width,
            height,
            jpeg,
        })
    }
}
