//! Decode, transform execution, and encode through the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Format sniffing | `image::guess_format` (magic bytes, never the extension) |
//! | Header-only dimensions | `image::ImageReader::into_dimensions` |
//! | Decode (JPEG, PNG, GIF, WebP) | `image` crate (pure Rust decoders) |
//! | Resample | `image::imageops::resize` with `Lanczos3` |
//! | Compositing | `image::imageops::overlay` onto a filled canvas |
//! | Encode | per-format encoders, JPEG/WebP honoring configured quality |
//!
//! The codec executes [`TransformPlan`](crate::geometry::TransformPlan)s; it
//! never decides geometry itself.

use crate::geometry::TransformPlan;
use image::codecs::gif::GifEncoder;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, Frame, ImageFormat, ImageReader, Rgba, RgbaImage};
use std::io::Cursor;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported image format{}", .0.as_ref().map(|f| format!(": {f:?}")).unwrap_or_default())]
    UnsupportedFormat(Option<ImageFormat>),
    #[error("decode failed: {0}")]
    Decode(image::ImageError),
    #[error("encode failed: {0}")]
    Encode(image::ImageError),
}

/// The four formats with compiled-in decoders and encoders.
const FORMATS: &[(ImageFormat, &str, &[&str])] = &[
    (ImageFormat::Jpeg, "image/jpeg", &["jpg", "jpeg"]),
    (ImageFormat::Png, "image/png", &["png"]),
    (ImageFormat::Gif, "image/gif", &["gif"]),
    (ImageFormat::WebP, "image/webp", &["webp"]),
];

/// MIME type for a supported format.
pub fn mime_for_format(format: ImageFormat) -> Option<&'static str> {
    FORMATS
        .iter()
        .find(|(f, _, _)| *f == format)
        .map(|(_, mime, _)| *mime)
}

/// Resolve a file extension (case-insensitive) to a supported format.
pub fn format_for_extension(ext: &str) -> Option<ImageFormat> {
    let ext = ext.to_ascii_lowercase();
    FORMATS
        .iter()
        .find(|(_, _, exts)| exts.contains(&ext.as_str()))
        .map(|(f, _, _)| *f)
}

/// Content-Type for a file extension, `application/octet-stream` when the
/// extension is not an image we know.
pub fn mime_for_extension(ext: &str) -> &'static str {
    format_for_extension(ext)
        .and_then(mime_for_format)
        .unwrap_or("application/octet-stream")
}

/// Sniff the format from magic bytes. Extensions lie; bytes do not.
pub fn sniff_format(bytes: &[u8]) -> Option<ImageFormat> {
    image::guess_format(bytes).ok()
}

/// Read dimensions from the header without decoding pixel data.
pub fn probe_dimensions(bytes: &[u8]) -> Result<(u32, u32), CodecError> {
    ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| CodecError::Decode(image::ImageError::IoError(e)))?
        .into_dimensions()
        .map_err(CodecError::Decode)
}

/// Decode the full raster.
pub fn decode(bytes: &[u8]) -> Result<DynamicImage, CodecError> {
    let format = sniff_format(bytes).ok_or(CodecError::UnsupportedFormat(None))?;
    if mime_for_format(format).is_none() {
        return Err(CodecError::UnsupportedFormat(Some(format)));
    }
    image::load_from_memory_with_format(bytes, format).map_err(CodecError::Decode)
}

/// Execute a transform plan: crop the sampling rectangle, resample it to
/// the destination size, and composite onto the output canvas.
///
/// Canvas fill outside the destination rectangle (fit padding) is white for
/// JPEG and transparent for formats that carry alpha, matching what the
/// format can express.
pub fn render(source: &DynamicImage, plan: &TransformPlan, format: ImageFormat) -> DynamicImage {
    let sampled = source.crop_imm(
        plan.source.x,
        plan.source.y,
        plan.source.width,
        plan.source.height,
    );
    let resampled = sampled.resize_exact(plan.dest.width, plan.dest.height, FilterType::Lanczos3);

    // Fast path: destination covers the whole canvas (resize, crop).
    if plan.dest.x == 0
        && plan.dest.y == 0
        && plan.dest.width == plan.canvas_width
        && plan.dest.height == plan.canvas_height
    {
        return resampled;
    }

    let fill = if format == ImageFormat::Jpeg {
        Rgba([255, 255, 255, 255])
    } else {
        Rgba([0, 0, 0, 0])
    };
    let mut canvas = RgbaImage::from_pixel(plan.canvas_width, plan.canvas_height, fill);
    image::imageops::overlay(
        &mut canvas,
        &resampled.to_rgba8(),
        plan.dest.x as i64,
        plan.dest.y as i64,
    );
    DynamicImage::ImageRgba8(canvas)
}

/// Encode a raster in the given format.
///
/// JPEG honors `quality` (1-100). WebP encoding through the `image` crate
/// is lossless, so its configured quality is accepted but has no effect;
/// PNG and GIF quality settings likewise map to the encoders' fixed
/// defaults. Constant settings keep repeated encodes byte-identical.
pub fn encode(
    image: &DynamicImage,
    format: ImageFormat,
    quality: u8,
) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut out, quality);
            // JPEG has no alpha channel.
            image
                .to_rgb8()
                .write_with_encoder(encoder)
                .map_err(CodecError::Encode)?;
        }
        ImageFormat::Png => {
            let encoder = PngEncoder::new(&mut out);
            image
                .to_rgba8()
                .write_with_encoder(encoder)
                .map_err(CodecError::Encode)?;
        }
        ImageFormat::Gif => {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode_frame(Frame::new(image.to_rgba8()))
                .map_err(CodecError::Encode)?;
        }
        ImageFormat::WebP => {
            let encoder = WebPEncoder::new_lossless(&mut out);
            image
                .to_rgba8()
                .write_with_encoder(encoder)
                .map_err(CodecError::Encode)?;
        }
        other => return Err(CodecError::UnsupportedFormat(Some(other))),
    }
    Ok(out)
}
