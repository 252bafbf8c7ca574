use std::time::Instant;

use fast_image_resize::images::Image;
use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer};
use image::{DynamicImage, ImageFormat, RgbImage};
use ndarray::Array4;

use crate::error::{DecodeError, InferenceError, PredictError};

#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

impl Default for PreprocessConfig {
    /// ImageNet statistics at 224x224, which the classifier was trained with.
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            height: 224,
            width: 224,
            channels: 3,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Processor {
    pub config: PreprocessConfig,
}

impl Processor {
    /// Create a new instance of the Processor struct
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    /// Decode encoded image bytes (format sniffed from content) into RGB8.
    pub fn decode(&self, bytes: &[u8]) -> Result<RgbImage, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if image::guess_format(bytes)? == ImageFormat::Jpeg && !has_jpeg_eoi(bytes) {
            // the jpeg decoder pads missing scan data instead of failing
            return Err(DecodeError::Truncated(ImageFormat::Jpeg));
        }
        let image = image::load_from_memory(bytes)?;
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(DecodeError::ZeroSized { width, height });
        }
        Ok(image.to_rgb8())
    }

    /// Stretch to exactly `width x height` with antialiased bilinear
    /// resampling. Aspect ratio is not kept.
    pub fn resize(&self, image: RgbImage) -> Result<RgbImage, InferenceError> {
        let (width, height) = (self.config.width as u32, self.config.height as u32);
        let src = DynamicImage::ImageRgb8(image);
        let mut dst_image = Image::new(width, height, PixelType::U8x3);

        let mut resizer = Resizer::new();
        let resize_options =
            ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear));
        resizer
            .resize(&src, &mut dst_image, Some(&resize_options))
            .map_err(|e| InferenceError(format!("resize failed: {e}")))?;

        RgbImage::from_raw(width, height, dst_image.buffer().to_vec())
            .ok_or_else(|| InferenceError("resized buffer does not match target size".into()))
    }

    /// Scale to [0, 1], apply per-channel mean/std and lay the image out as
    /// a `[1, C, H, W]` batch.
    pub fn normalize(&self, image: &RgbImage) -> Array4<f32> {
        let cfg = &self.config;
        let mut img_arr = Array4::<f32>::zeros((1, cfg.channels, cfg.height, cfg.width));
        for (x, y, rgb) in image.enumerate_pixels() {
            let (x, y) = (x as usize, y as usize);
            for c in 0..cfg.channels {
                img_arr[[0, c, y, x]] = (rgb[c] as f32 / 255.0 - cfg.mean[c]) / cfg.std[c];
            }
        }
        img_arr
    }

    /// Raw upload bytes to model input.
    pub fn preprocess(&self, bytes: &[u8]) -> Result<Array4<f32>, PredictError> {
        let t = Instant::now();
        let rgb = self.decode(bytes)?;
        tracing::trace!(width = rgb.width(), height = rgb.height(), "[preprocessing - decode]: {:?}", t.elapsed());
        self.preprocess_decoded(rgb)
    }

    /// Resize and normalize an image that has already been decoded.
    pub fn preprocess_decoded(&self, rgb: RgbImage) -> Result<Array4<f32>, PredictError> {
        let t = Instant::now();
        let resized = self.resize(rgb)?;
        tracing::trace!("[preprocessing - resize]: {:?}", t.elapsed());

        let t = Instant::now();
        let xs = self.normalize(&resized);
        tracing::trace!("[preprocessing - normalize]: {:?}", t.elapsed());
        Ok(xs)
    }
}

/// JPEG streams end with the EOI marker `FF D9`, possibly followed by
/// zero padding.
fn has_jpeg_eoi(bytes: &[u8]) -> bool {
    let end = bytes.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    bytes[..end].ends_with(&[0xFF, 0xD9])
}
