//! Fallback dispatcher: the bridge between the web tier and the
//! coordinator.
//!
//! Cached variants are served directly by the storage/HTTP tier; this
//! module only runs when that tier reports a miss (404/403) for a path
//! that looks like a variant URL. It reverse-parses the URL shape
//! `<dir>/<cache_folder>/<name>_thumb_<size>.<ext>` back into the original
//! path and size, asks the coordinator to materialize the variant, and
//! returns the bytes with their response headers. Subsequent requests hit
//! the file directly and never reach this code.
//!
//! When signed URLs are enabled, the query string is checked before any
//! cache logic runs: both `oh` and `oe` must be present and valid. Paths
//! that are not variant URLs are exempt unless `sign_originals` extends
//! the requirement to them.

use crate::codec;
use crate::error::ThumbError;
use crate::service::{Resolution, ThumbnailService, VariantRequest};
use crate::signing::{SignatureError, SignedUrlAuthority, parse_signed_query};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error(transparent)]
    Signature(#[from] SignatureError),
    #[error(transparent)]
    Thumb(#[from] ThumbError),
}

/// A variant URL taken apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVariant {
    pub directory: String,
    pub base_name: String,
    pub size: String,
    pub ext: String,
}

impl ParsedVariant {
    /// Storage path of the original this variant derives from.
    pub fn original_path(&self) -> String {
        format!("{}/{}.{}", self.directory, self.base_name, self.ext)
    }
}

/// Materialized variant plus the headers the HTTP tier should attach.
#[derive(Debug, Clone)]
pub struct VariantResponse {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub cache_control: String,
    pub size: String,
    pub generated: bool,
}

impl VariantResponse {
    /// Response headers, ready to copy onto an HTTP response.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Content-Type", self.content_type.to_string()),
            ("Cache-Control", self.cache_control.clone()),
            ("X-Thumbnail-Generated", "on-demand".to_string()),
            ("X-Thumbnail-Size", self.size.clone()),
        ]
    }
}

pub struct FallbackDispatcher {
    service: Arc<ThumbnailService>,
    authority: Option<SignedUrlAuthority>,
    pattern: Regex,
}

/// Turn the cache folder and filename pattern into a URL-parsing regex:
/// `{name}` captures greedily, `{size}` captures the known size names,
/// `{ext}` captures a word; everything else matches literally.
fn variant_pattern(cache_folder: &str, filename_pattern: &str, sizes: &[&str]) -> Regex {
    let size_alternation = sizes
        .iter()
        .map(|s| regex::escape(s))
        .collect::<Vec<_>>()
        .join("|");

    let mut file_re = String::new();
    let mut rest = filename_pattern;
    while let Some(start) = rest.find('{') {
        let Some(end) = rest[start..].find('}') else {
            break;
        };
        file_re.push_str(&regex::escape(&rest[..start]));
        match &rest[start + 1..start + end] {
            "name" => file_re.push_str("(?P<name>.+)"),
            "size" => {
                file_re.push_str("(?P<size>");
                file_re.push_str(&size_alternation);
                file_re.push(')');
            }
            "ext" => file_re.push_str(r"(?P<ext>\w+)"),
            other => file_re.push_str(&regex::escape(&format!("{{{other}}}"))),
        }
        rest = &rest[start + end + 1..];
    }
    file_re.push_str(&regex::escape(rest));

    let full = format!("^(?P<dir>.+)/{}/{}$", regex::escape(cache_folder), file_re);
    Regex::new(&full).expect("escaped pattern is valid")
}

impl FallbackDispatcher {
    pub fn new(service: Arc<ThumbnailService>) -> Self {
        let config = service.config();
        let sizes: Vec<&str> = config.sizes.keys().map(String::as_str).collect();
        let pattern = variant_pattern(&config.cache_folder, &config.filename_pattern, &sizes);
        let authority = config.signed_urls.enabled.then(|| {
            SignedUrlAuthority::new(
                config.signed_urls.secret.clone(),
                config.signed_urls.expiration,
            )
        });
        Self {
            service,
            authority,
            pattern,
        }
    }

    /// Parse a storage-relative variant path. `None` when the path does not
    /// have the variant shape.
    pub fn parse(&self, path: &str) -> Option<ParsedVariant> {
        let captures = self.pattern.captures(path)?;
        Some(ParsedVariant {
            directory: captures["dir"].to_string(),
            base_name: captures["name"].to_string(),
            size: captures["size"].to_string(),
            ext: captures["ext"].to_string(),
        })
    }

    /// Handle a miss for `path`. Returns `Ok(None)` when the path is not a
    /// variant URL or its original does not exist — the web tier keeps its
    /// 404 in that case.
    ///
    /// `query` is the request's query string; with signing enabled it must
    /// carry a valid `oh`/`oe` pair for the requested path (`binding` being
    /// the same value bound at sign time, if any). Non-variant paths only
    /// need a token when `sign_originals` is set.
    pub fn dispatch(
        &self,
        path: &str,
        query: Option<&str>,
        binding: Option<&str>,
    ) -> Result<Option<VariantResponse>, DispatchError> {
        let parsed = self.parse(path);

        if let Some(authority) = &self.authority
            && (parsed.is_some() || self.service.config().signed_urls.sign_originals)
        {
            let (signature, expires_hex) = parse_signed_query(query.unwrap_or_default())?;
            authority.validate(path, &signature, &expires_hex, binding)?;
        }

        let Some(parsed) = parsed else {
            debug!(path, "not a variant URL, leaving the miss alone");
            return Ok(None);
        };

        let original = parsed.original_path();
        let request = VariantRequest::new(original.clone(), parsed.size.clone());

        let resolution = match self.service.resolve(&request) {
            Ok(resolution) => resolution,
            Err(ThumbError::NotFound(_)) => {
                debug!(path, original = %original, "original missing, keeping the 404");
                return Ok(None);
            }
            Err(err) => return Err(err.into()),
        };
        // Silent-mode fallback with no original to serve: keep the 404.
        if matches!(&resolution, Resolution::Fallback(p) if !self.service_has(p)) {
            return Ok(None);
        }

        let bytes = self.service_read(resolution.path())?;
        debug!(
            path,
            served = resolution.path(),
            generated = resolution.was_generated(),
            "variant dispatched"
        );
        Ok(Some(VariantResponse {
            bytes,
            content_type: codec::mime_for_extension(&parsed.ext),
            cache_control: self.service.config().cache_control.clone(),
            size: parsed.size,
            generated: resolution.was_generated(),
        }))
    }

    fn service_has(&self, path: &str) -> bool {
        self.service.storage().exists(path)
    }

    fn service_read(&self, path: &str) -> Result<Vec<u8>, ThumbError> {
        Ok(self.service.storage().read(path)?)
    }
}
