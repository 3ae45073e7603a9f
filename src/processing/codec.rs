//! Image codec capability: decode, resize, sharpen, encode.
//!
//! The conversion engine only talks to [`ImageCodec`]. [`ImageRsCodec`] is the
//! production implementation on top of the `image` and `webp` crates; tests
//! substitute their own.

use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::{imageops, DynamicImage, ImageBuffer, Pixel};
use thiserror::Error;

use crate::processing::formats::EncodeParams;
use crate::processing::resize::RESIZE_FILTER;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Encode(String),
}

/// Black-box image operations used by the conversion engine
pub trait ImageCodec: Send + Sync {
    /// Decode an encoded image held in memory
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError>;

    /// Resample to exactly `width` x `height`
    fn resize(&self, image: DynamicImage, width: u32, height: u32) -> DynamicImage;

    /// Blur (`factor` < 1.0) or sharpen (`factor` > 1.0)
    fn enhance_sharpness(&self, image: DynamicImage, factor: f32) -> DynamicImage;

    /// Encode into the format described by `params`
    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError>;
}

/// Pure Rust codec built on the `image` crate, with libwebp for lossy WebP
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageRsCodec;

impl ImageRsCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for ImageRsCodec {
    fn decode(&self, data: &[u8]) -> Result<DynamicImage, CodecError> {
        image::load_from_memory(data).map_err(|e| CodecError::Decode(e.to_string()))
    }

    fn resize(&self, image: DynamicImage, width: u32, height: u32) -> DynamicImage {
        image.resize_exact(width, height, RESIZE_FILTER)
    }

    fn enhance_sharpness(&self, image: DynamicImage, factor: f32) -> DynamicImage {
        match image {
            DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(sharpen_buffer(&buf, factor, 1)),
            DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(sharpen_buffer(&buf, factor, 1)),
            DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(sharpen_buffer(&buf, factor, 3)),
            DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(sharpen_buffer(&buf, factor, 3)),
            other if other.color().has_alpha() => {
                DynamicImage::ImageRgba8(sharpen_buffer(&other.to_rgba8(), factor, 3))
            }
            other => DynamicImage::ImageRgb8(sharpen_buffer(&other.to_rgb8(), factor, 3)),
        }
    }

    fn encode(&self, image: &DynamicImage, params: &EncodeParams) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();

        match *params {
            EncodeParams::Jpeg { quality } => {
                let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(format!("JPEG encode failed: {e}")))?;
            }
            EncodeParams::Png { level } => {
                let compression = if level == 0 {
                    CompressionType::Uncompressed
                } else {
                    CompressionType::Level(level)
                };
                let encoder = PngEncoder::new_with_quality(&mut buf, compression, PngFilter::Adaptive);
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(format!("PNG encode failed: {e}")))?;
            }
            EncodeParams::WebP { quality, method } => {
                buf = encode_webp(image, quality, method)?;
            }
            EncodeParams::Avif { quality, speed } => {
                let encoder = AvifEncoder::new_with_speed_quality(&mut buf, speed, quality);
                image
                    .write_with_encoder(encoder)
                    .map_err(|e| CodecError::Encode(format!("AVIF encode failed: {e}")))?;
            }
        }

        Ok(buf)
    }
}

fn encode_webp(image: &DynamicImage, quality: u8, method: u8) -> Result<Vec<u8>, CodecError> {
    // libwebp only takes 8-bit RGB/RGBA
    let converted;
    let image = match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => {
            converted = DynamicImage::ImageRgba8(other.to_rgba8());
            &converted
        }
        other => {
            converted = DynamicImage::ImageRgb8(other.to_rgb8());
            &converted
        }
    };

    let encoder = webp::Encoder::from_image(image)
        .map_err(|e| CodecError::Encode(format!("WebP encode failed: {e}")))?;

    let mut config = webp::WebPConfig::new()
        .map_err(|()| CodecError::Encode("WebP encoder config init failed".to_string()))?;
    config.lossless = 0;
    config.alpha_compression = 1;
    config.quality = f32::from(quality);
    config.method = i32::from(method);

    let memory = encoder
        .encode_advanced(&config)
        .map_err(|e| CodecError::Encode(format!("WebP encode failed: {e:?}")))?;

    Ok(memory.to_vec())
}

/// 3x3 smoothing weights: 1 around, 5 in the centre, normalized by their sum
const SMOOTH_KERNEL: [f32; 9] = [1.0, 1.0, 1.0, 1.0, 5.0, 1.0, 1.0, 1.0, 1.0];

/// Sharpness enhancement in the classic "smooth and extrapolate" form: the
/// result is `smooth + factor * (original - smooth)`.
///
/// Border pixels and any channels past `color_channels` (alpha) keep their
/// original values.
fn sharpen_buffer<P>(
    src: &ImageBuffer<P, Vec<u8>>,
    factor: f32,
    color_channels: usize,
) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8> + 'static,
{
    let (width, height) = src.dimensions();
    let mut out = src.clone();
    if width < 3 || height < 3 {
        return out;
    }

    let smooth = imageops::filter3x3(src, &SMOOTH_KERNEL);

    for (x, y, pixel) in out.enumerate_pixels_mut() {
        if x == 0 || y == 0 || x == width - 1 || y == height - 1 {
            continue;
        }
        let smoothed = smooth.get_pixel(x, y);
        for (value, &soft) in pixel
            .channels_mut()
            .iter_mut()
            .zip(smoothed.channels())
            .take(color_channels)
        {
            let soft = f32::from(soft);
            let blended = soft + factor * (f32::from(*value) - soft);

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                *value = blended.round().clamp(0.0, 255.0) as u8;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GenericImageView, Rgb, RgbImage, Rgba, RgbaImage};

    fn checkerboard(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([200, 200, 200])
            } else {
                Rgb([50, 50, 50])
            }
        })
    }

    fn contrast(image: &DynamicImage) -> i32 {
        let rgb = image.to_rgb8();
        i32::from(rgb.get_pixel(2, 2)[0]) - i32::from(rgb.get_pixel(2, 3)[0])
    }

    #[test]
    fn test_sharpen_and_blur_move_contrast_in_opposite_directions() {
        let codec = ImageRsCodec::new();
        let original = DynamicImage::ImageRgb8(checkerboard(6, 6));
        let base = contrast(&original);

        let sharpened = codec.enhance_sharpness(original.clone(), 2.0);
        let blurred = codec.enhance_sharpness(original.clone(), 0.0);

        assert!(contrast(&sharpened) > base);
        assert!(contrast(&blurred) < base);
    }

    #[test]
    fn test_sharpen_keeps_border_and_alpha() {
        let codec = ImageRsCodec::new();
        let src = RgbaImage::from_fn(5, 5, |x, y| Rgba([(x * 40) as u8, (y * 40) as u8, 90, 17]));
        let result = codec.enhance_sharpness(DynamicImage::ImageRgba8(src.clone()), 3.0);
        let result = result.as_rgba8().unwrap();

        assert_eq!(result.get_pixel(0, 0), src.get_pixel(0, 0));
        assert_eq!(result.get_pixel(4, 2), src.get_pixel(4, 2));
        assert!(result.pixels().all(|p| p[3] == 17));
    }

    #[test]
    fn test_uniform_image_is_unchanged_by_sharpening() {
        let codec = ImageRsCodec::new();
        let flat = RgbImage::from_pixel(8, 8, Rgb([120, 60, 30]));
        let result = codec.enhance_sharpness(DynamicImage::ImageRgb8(flat.clone()), 4.0);
        assert_eq!(result.as_rgb8().unwrap(), &flat);
    }

    #[test]
    fn test_encode_decode_each_lossless_friendly_format() {
        let codec = ImageRsCodec::new();
        let image = DynamicImage::ImageRgb8(checkerboard(16, 12));

        for params in [
            EncodeParams::Jpeg { quality: 90 },
            EncodeParams::Png { level: 9 },
            EncodeParams::Png { level: 0 },
            EncodeParams::WebP { quality: 80, method: 4 },
        ] {
            let bytes = codec.encode(&image, &params).unwrap();
            let decoded = codec.decode(&bytes).unwrap();
            assert_eq!(decoded.dimensions(), (16, 12), "{params:?}");
        }
    }

    #[test]
    fn test_avif_encode_produces_container() {
        let codec = ImageRsCodec::new();
        let image = DynamicImage::ImageRgb8(checkerboard(16, 16));
        let bytes = codec
            .encode(&image, &EncodeParams::Avif { quality: 63, speed: 10 })
            .unwrap();
        assert_eq!(crate::processing::formats::sniff_mime(&bytes), Some("image/avif"));
    }

    #[test]
    fn test_webp_accepts_rgba_and_luma() {
        let codec = ImageRsCodec::new();
        let params = EncodeParams::WebP { quality: 70, method: 0 };

        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 128])));
        assert!(codec.encode(&rgba, &params).is_ok());

        let luma = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, image::Luma([9])));
        assert!(codec.encode(&luma, &params).is_ok());
    }

    #[test]
    fn test_decode_garbage_is_decode_error() {
        let codec = ImageRsCodec::new();
        let err = codec.decode(b"definitely not an image").unwrap_err();
        assert!(matches!(err, CodecError::Decode(_)));
    }

    #[test]
    fn test_resize_exact() {
        let codec = ImageRsCodec::new();
        let image = codec.resize(DynamicImage::ImageRgb8(checkerboard(40, 20)), 10, 5);
        assert_eq!(image.dimensions(), (10, 5));
    }
}
