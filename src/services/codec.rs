use crate::models::{ConversionSettings, OutputFormat};
use image::codecs::avif::AvifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, ImageFormat};
use thiserror::Error;

/// AVIF encoder speed (1 = slowest/best, 10 = fastest)
const AVIF_SPEED: u8 = 8;

/// Errors that can occur during conversion
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Input is not a decodable image: {0}")]
    Decode(String),

    #[error("Failed to encode {format}: {message}")]
    Encode {
        format: OutputFormat,
        message: String,
    },

    #[error("Unsupported conversion profile: {0}")]
    UnsupportedProfile(String),
}

/// Image compression capability used by the conversion runner.
///
/// `convert` is synchronous and may be CPU-heavy; the runner calls it from a
/// blocking worker thread. `progress` receives values in `0..=100` and must
/// be called with non-decreasing values. On failure no caller state has been
/// touched besides progress reports.
pub trait Codec: Send + Sync {
    fn convert(
        &self,
        input: &[u8],
        profile: &ConversionSettings,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, CodecError>;
}

/// [`Codec`] backed by the `image` crate.
///
/// Decodes JPEG, PNG and WebP input, plus AVIF when built with the
/// `avif-decode` feature (links the system dav1d library). WebP output goes
/// through libwebp so the quality setting applies as it does for JPEG.
#[derive(Debug, Default, Clone)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }

    /// Shrink so the longest edge fits `longest_edge`, keeping the aspect ratio.
    /// Images that already fit are returned unchanged (never upscaled).
    pub fn fit_within(image: DynamicImage, longest_edge: u32) -> DynamicImage {
        let (width, height) = image.dimensions();
        if width.max(height) <= longest_edge {
            return image;
        }
        image.resize(longest_edge, longest_edge, FilterType::Lanczos3)
    }

    fn encode(image: &DynamicImage, profile: &ConversionSettings) -> Result<Vec<u8>, CodecError> {
        let mut buf = Vec::new();
        let format = profile.format;
        let encode_err = |e: image::ImageError| CodecError::Encode {
            format,
            message: e.to_string(),
        };

        match format {
            OutputFormat::Jpeg => {
                // JPEG has no alpha channel
                let rgb = DynamicImage::ImageRgb8(image.to_rgb8());
                let encoder = JpegEncoder::new_with_quality(&mut buf, profile.quality);
                rgb.write_with_encoder(encoder).map_err(encode_err)?;
            }
            OutputFormat::Png => {
                let encoder =
                    PngEncoder::new_with_quality(&mut buf, CompressionType::Best, PngFilter::Adaptive);
                image.write_with_encoder(encoder).map_err(encode_err)?;
            }
            OutputFormat::Webp => {
                let rgba = image.to_rgba8();
                let encoded = webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                    .encode_simple(false, f32::from(profile.quality))
                    .map_err(|e| CodecError::Encode {
                        format,
                        message: format!("{:?}", e),
                    })?;
                buf.extend_from_slice(&encoded);
            }
            OutputFormat::Avif => {
                let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
                let encoder = AvifEncoder::new_with_speed_quality(&mut buf, AVIF_SPEED, profile.quality);
                rgba.write_with_encoder(encoder).map_err(encode_err)?;
            }
        }

        Ok(buf)
    }
}

impl Codec for ImageCodec {
    fn convert(
        &self,
        input: &[u8],
        profile: &ConversionSettings,
        progress: &dyn Fn(u8),
    ) -> Result<Vec<u8>, CodecError> {
        profile
            .validate()
            .map_err(|e| CodecError::UnsupportedProfile(e.to_string()))?;

        progress(5);
        if !cfg!(feature = "avif-decode")
            && image::guess_format(input).ok() == Some(ImageFormat::Avif)
        {
            return Err(CodecError::Decode(
                "AVIF input needs a build with the avif-decode feature".to_string(),
            ));
        }
        let decoded =
            image::load_from_memory(input).map_err(|e| CodecError::Decode(e.to_string()))?;
        progress(30);

        let resized = Self::fit_within(decoded, profile.longest_edge());
        progress(60);

        let encoded = Self::encode(&resized, profile)?;
        progress(95);

        tracing::debug!(
            "Encoded {}x{} {} ({} -> {} bytes)",
            resized.width(),
            resized.height(),
            profile.format,
            input.len(),
            encoded.len()
        );

        Ok(encoded)
    }
}
