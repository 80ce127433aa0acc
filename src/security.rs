//! Pre-generation validation gate.
//!
//! Every check runs against the original's raw bytes before any decoder is
//! handed the data: byte budget first, then content sniffing, then a
//! header-only dimension probe. Extensions are only trusted for the SVG
//! block (there is no SVG decoder to sniff with); everything else goes by
//! magic bytes.

use crate::codec;
use crate::config::SecurityConfig;
use crate::error::ThumbError;

fn violation(path: &str, reason: String) -> ThumbError {
    ThumbError::Validation {
        path: path.to_string(),
        reason,
    }
}

/// Check an original against the configured limits.
pub fn validate_original(
    path: &str,
    bytes: &[u8],
    security: &SecurityConfig,
) -> Result<(), ThumbError> {
    // Vector formats are parsed, not decoded; SVG's XML entity expansion
    // makes it an attack surface we refuse by default.
    if !security.allow_svg {
        let ext = path.rsplit_once('.').map(|(_, e)| e).unwrap_or_default();
        if ext.eq_ignore_ascii_case("svg") {
            return Err(violation(path, "SVG files are not allowed".into()));
        }
    }

    if bytes.len() as u64 > security.max_file_size {
        return Err(violation(
            path,
            format!(
                "file size {} exceeds the {} byte limit",
                bytes.len(),
                security.max_file_size
            ),
        ));
    }

    let Some(format) = codec::sniff_format(bytes) else {
        return Err(violation(path, "content is not a recognized image".into()));
    };
    let Some(mime) = codec::mime_for_format(format) else {
        return Err(violation(path, format!("unsupported image format {format:?}")));
    };
    if !security.allowed_mime_types.iter().any(|m| m == mime) {
        return Err(violation(path, format!("MIME type {mime} is not allowed")));
    }

    let (width, height) = codec::probe_dimensions(bytes)
        .map_err(|e| violation(path, format!("could not read image dimensions: {e}")))?;
    if width > security.max_width || height > security.max_height {
        return Err(violation(
            path,
            format!(
                "dimensions {width}x{height} exceed the maximum {}x{}",
                security.max_width, security.max_height
            ),
        ));
    }

    Ok(())
}
