//! Upload preprocessing: bound the photo's size and re-encode it as JPEG
//! before it is sent to the model.

use std::io::Cursor;

use base64::{engine::general_purpose, Engine as _};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::GenericImageView;
use tracing::debug;

use crate::config::Config;
use crate::llm::media::{detect_mime_type, is_image_mime};

pub const JPEG_MIME_TYPE: &str = "image/jpeg";

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("Selected file is not an image (detected {0})")]
    NotAnImage(String),
    #[error("Could not decode image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("Could not encode image: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Debug, Clone, Copy)]
pub struct PreprocessOptions {
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl PreprocessOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_dimension: config.max_image_dimension,
            jpeg_quality: config.jpeg_quality,
        }
    }
}

impl Default for PreprocessOptions {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 80,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
}

impl EncodedImage {
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.bytes)
    }
}

/// Target size for an image so that its longer side is at most `max`.
///
/// Landscape images are bounded by width; portrait and square images by
/// height. Images already within bounds keep their size.
pub fn bounded_dimensions(width: u32, height: u32, max: u32) -> (u32, u32) {
    let scale = |side: u32, longer: u32| -> u32 {
        let scaled = (side as f64 * max as f64 / longer as f64).round() as u32;
        scaled.max(1)
    };

    if width > height {
        if width > max {
            return (max, scale(height, width));
        }
    } else if height > max {
        return (scale(width, height), max);
    }
    (width, height)
}

/// Rejects uploads that are recognisably something other than an image.
/// Unrecognised bytes pass and are left for the decoder to judge.
pub fn ensure_image(data: &[u8]) -> Result<(), PreprocessError> {
    match detect_mime_type(data) {
        Some(mime_type) if !is_image_mime(&mime_type) => {
            Err(PreprocessError::NotAnImage(mime_type))
        }
        _ => Ok(()),
    }
}

pub fn compress_image(
    data: &[u8],
    options: PreprocessOptions,
) -> Result<EncodedImage, PreprocessError> {
    ensure_image(data)?;

    let decoded = image::load_from_memory(data).map_err(PreprocessError::Decode)?;
    let (width, height) = decoded.dimensions();
    let (target_width, target_height) =
        bounded_dimensions(width, height, options.max_dimension);

    let resized = if (target_width, target_height) == (width, height) {
        decoded
    } else {
        decoded.resize_exact(target_width, target_height, FilterType::CatmullRom)
    };

    let rgb = resized.to_rgb8();
    let mut buffer = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut buffer, options.jpeg_quality);
    encoder.encode_image(&rgb).map_err(PreprocessError::Encode)?;
    let bytes = buffer.into_inner();

    debug!(
        source_width = width,
        source_height = height,
        width = target_width,
        height = target_height,
        bytes = bytes.len(),
        "compressed upload"
    );

    Ok(EncodedImage {
        bytes,
        mime_type: JPEG_MIME_TYPE.to_string(),
        width: target_width,
        height: target_height,
    })
}
