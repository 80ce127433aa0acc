//! Thumbnail configuration module.
//!
//! Handles loading and validating the `thumbcache.toml` configuration file.
//! Configuration is resolved once at startup and treated as read-only for the
//! process lifetime — the coordinator shares it freely across threads without
//! locking.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! cache_folder = "thumbnails"
//! filename_pattern = "{name}_thumb_{size}.{ext}"
//! method = "resize"                 # resize | crop | fit | smart-crop
//! fallback_on_error = true
//! error_mode = "silent"             # silent | strict
//! cache_control = "public, max-age=31536000"
//!
//! [sizes.small]
//! width = 150
//! height = 150
//!
//! [quality]
//! default = 85
//! webp = 90
//! png = 90
//!
//! [security]
//! max_file_size = 10485760          # bytes
//! max_width = 10000
//! max_height = 10000
//! allow_svg = false
//!
//! [subdirectory]
//! auto_strategy = true
//! manual_strategy = "context-aware"
//!
//! [subdirectory.hash_prefix]
//! enabled = true
//! length = 2
//! depth = 2
//! priority = 1
//!
//! [smart_crop]
//! algorithm = "energy"              # energy | faces
//! rule_of_thirds = true
//!
//! [contexts]
//! post = "user-posts/{user_id}/{post_id}"
//!
//! [signed_urls]
//! enabled = false
//! secret = ""
//! expiration = 604800               # seconds (7 days)
//! ```
//!
//! Config files are sparse — override just the values you want. Unknown keys
//! are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// How to map a source image into the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransformMethod {
    /// Proportional resize; output may be smaller than the box on one axis.
    #[default]
    Resize,
    /// Center crop to the exact target size.
    Crop,
    /// Scale to fit inside the box, pad to the exact target size.
    Fit,
    /// Crop centered on a detected focal point instead of the image center.
    SmartCrop,
}

impl TransformMethod {
    /// The method's configuration name (`"smart-crop"` etc.).
    pub fn as_str(&self) -> &'static str {
        match self {
            TransformMethod::Resize => "resize",
            TransformMethod::Crop => "crop",
            TransformMethod::Fit => "fit",
            TransformMethod::SmartCrop => "smart-crop",
        }
    }
}

/// How resolution errors are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorMode {
    /// Log and recover into the configured fallback (production-friendly).
    #[default]
    Silent,
    /// Propagate validation/generation errors to the caller.
    Strict,
}

/// A named thumbnail size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSpec {
    pub width: u32,
    pub height: u32,
}

/// Lossy encoding quality, globally and per output format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    /// Used for any format without an explicit entry.
    pub default: u8,
    pub jpeg: Option<u8>,
    pub png: Option<u8>,
    pub webp: Option<u8>,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            default: 85,
            jpeg: None,
            png: Some(90),
            webp: Some(90),
        }
    }
}

/// Pre-generation validation limits (see [`crate::security`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SecurityConfig {
    /// Maximum original file size in bytes.
    pub max_file_size: u64,
    /// MIME types accepted for originals.
    pub allowed_mime_types: Vec<String>,
    pub max_width: u32,
    pub max_height: u32,
    /// SVG parsers are a known entity-expansion attack surface; originals
    /// with an `.svg` extension are rejected unless this is set.
    pub allow_svg: bool,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024,
            allowed_mime_types: vec![
                "image/jpeg".into(),
                "image/png".into(),
                "image/gif".into(),
                "image/webp".into(),
            ],
            max_width: 10_000,
            max_height: 10_000,
            allow_svg: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ContextAwareSettings {
    pub enabled: bool,
    pub priority: i32,
}

impl Default for ContextAwareSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            priority: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashPrefixSettings {
    pub enabled: bool,
    /// Characters per prefix level.
    pub length: usize,
    /// Number of prefix levels.
    pub depth: usize,
    pub priority: i32,
    /// Root directory for the hashed tree. Defaults to the cache folder name.
    pub base_dir: Option<String>,
}

impl Default for HashPrefixSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            length: 2,
            depth: 2,
            priority: 1,
            base_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DateBasedSettings {
    pub enabled: bool,
    /// `chrono` format string for the date path, e.g. `%Y/%m/%d`.
    pub format: String,
    pub priority: i32,
}

impl Default for DateBasedSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            format: "%Y/%m/%d".into(),
            priority: 50,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HashLevelsSettings {
    pub enabled: bool,
    pub levels: usize,
    pub chars_per_level: usize,
    pub priority: i32,
}

impl Default for HashLevelsSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            levels: 3,
            chars_per_level: 2,
            priority: 25,
        }
    }
}

/// Cache-path strategy selection and per-strategy parameters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SubdirectoryConfig {
    /// `true`: iterate strategies by priority, first supporting one wins.
    /// `false`: always use `manual_strategy`.
    pub auto_strategy: Option<bool>,
    pub manual_strategy: Option<String>,
    pub context_aware: ContextAwareSettings,
    pub hash_prefix: HashPrefixSettings,
    pub date_based: DateBasedSettings,
    pub hash_levels: HashLevelsSettings,
}

impl SubdirectoryConfig {
    pub fn auto_strategy(&self) -> bool {
        self.auto_strategy.unwrap_or(true)
    }
}

/// Focal point detection settings for `smart-crop`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SmartCropConfig {
    /// `energy` is the only implemented detector; `faces` falls back to it.
    pub algorithm: String,
    /// Nudge the sampling rectangle so the focal point lands near a
    /// rule-of-thirds intersection instead of dead-center.
    pub rule_of_thirds: bool,
}

impl Default for SmartCropConfig {
    fn default() -> Self {
        Self {
            algorithm: "energy".into(),
            rule_of_thirds: true,
        }
    }
}

/// Signed-URL protection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SignedUrlConfig {
    pub enabled: bool,
    /// Also sign original (full-size) image URLs.
    pub sign_originals: bool,
    /// HMAC secret. Required when `enabled`.
    pub secret: String,
    /// URL validity in seconds. Default: 7 days.
    pub expiration: u64,
}

impl Default for SignedUrlConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sign_originals: false,
            secret: String::new(),
            expiration: 604_800,
        }
    }
}

/// Root configuration, loaded from `thumbcache.toml`.
///
/// All fields have sensible defaults. User config files need only specify
/// the values they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ThumbcacheConfig {
    /// Named sizes available for variants. Names must be unique (map keys).
    pub sizes: BTreeMap<String, SizeSpec>,
    /// Directory name holding cached variants next to their originals.
    pub cache_folder: String,
    /// Variant filename pattern; `{name}`, `{size}` and `{ext}` are replaced
    /// by literal substitution. All three are required.
    pub filename_pattern: String,
    /// Default transform method when a request does not override it.
    pub method: TransformMethod,
    pub quality: QualityConfig,
    /// On recoverable errors, return the original path instead of nothing.
    pub fallback_on_error: bool,
    pub error_mode: ErrorMode,
    /// `Cache-Control` header value attached to dispatcher responses.
    pub cache_control: String,
    pub security: SecurityConfig,
    pub subdirectory: SubdirectoryConfig,
    pub smart_crop: SmartCropConfig,
    /// Context name → path template with `{placeholder}` markers.
    pub contexts: BTreeMap<String, String>,
    pub signed_urls: SignedUrlConfig,
}

fn default_sizes() -> BTreeMap<String, SizeSpec> {
    BTreeMap::from([
        (
            "small".to_string(),
            SizeSpec {
                width: 150,
                height: 150,
            },
        ),
        (
            "medium".to_string(),
            SizeSpec {
                width: 300,
                height: 300,
            },
        ),
        (
            "large".to_string(),
            SizeSpec {
                width: 600,
                height: 600,
            },
        ),
    ])
}

fn default_contexts() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            "post".to_string(),
            "user-posts/{user_id}/{post_id}".to_string(),
        ),
        (
            "gallery".to_string(),
            "galleries/{user_id}/{album_id}".to_string(),
        ),
        ("avatar".to_string(), "avatars/{user_id}".to_string()),
    ])
}

impl Default for ThumbcacheConfig {
    fn default() -> Self {
        Self {
            sizes: default_sizes(),
            cache_folder: "thumbnails".into(),
            filename_pattern: "{name}_thumb_{size}.{ext}".into(),
            method: TransformMethod::default(),
            quality: QualityConfig::default(),
            fallback_on_error: true,
            error_mode: ErrorMode::default(),
            cache_control: "public, max-age=31536000".into(),
            security: SecurityConfig::default(),
            subdirectory: SubdirectoryConfig::default(),
            smart_crop: SmartCropConfig::default(),
            contexts: default_contexts(),
            signed_urls: SignedUrlConfig::default(),
        }
    }
}

impl ThumbcacheConfig {
    /// Load from a TOML file, falling back to defaults if the file is absent.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.validate()?;
            return Ok(config);
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sizes.is_empty() {
            return Err(ConfigError::Validation(
                "at least one size must be defined".into(),
            ));
        }
        for (name, spec) in &self.sizes {
            if spec.width == 0 || spec.height == 0 {
                return Err(ConfigError::Validation(format!(
                    "size '{name}' must have non-zero width and height"
                )));
            }
        }
        if self.cache_folder.is_empty() || self.cache_folder.contains('/') {
            return Err(ConfigError::Validation(
                "cache_folder must be a single non-empty directory name".into(),
            ));
        }
        // All three are needed to reconstruct the original path from a
        // variant URL; a pattern missing one cannot be parsed back.
        for placeholder in ["{name}", "{size}", "{ext}"] {
            if !self.filename_pattern.contains(placeholder) {
                return Err(ConfigError::Validation(format!(
                    "filename_pattern must contain {placeholder}"
                )));
            }
        }
        let quality_values = [
            Some(self.quality.default),
            self.quality.jpeg,
            self.quality.png,
            self.quality.webp,
        ];
        if quality_values.iter().flatten().any(|&q| q == 0 || q > 100) {
            return Err(ConfigError::Validation("quality must be 1-100".into()));
        }
        // Hash prefixes are consecutive slices of a 64-char sha256 hex digest.
        let hp = &self.subdirectory.hash_prefix;
        if hp.enabled && (hp.length == 0 || hp.depth == 0 || hp.length * hp.depth > 64) {
            return Err(ConfigError::Validation(
                "hash_prefix length and depth must be non-zero and cover at most 64 characters"
                    .into(),
            ));
        }
        let hl = &self.subdirectory.hash_levels;
        if hl.enabled
            && (hl.levels == 0 || hl.chars_per_level == 0 || hl.levels * hl.chars_per_level > 64)
        {
            return Err(ConfigError::Validation(
                "hash_levels levels and chars_per_level must be non-zero and cover at most 64 characters"
                    .into(),
            ));
        }
        if self.signed_urls.enabled && self.signed_urls.secret.is_empty() {
            return Err(ConfigError::Validation(
                "signed_urls.secret is required when signed URLs are enabled".into(),
            ));
        }
        if self.security.max_file_size == 0 {
            return Err(ConfigError::Validation(
                "security.max_file_size must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Effective quality for an output format name (`"jpeg"`, `"png"`, ...).
    pub fn quality_for(&self, format: &str) -> u8 {
        match format {
            "jpeg" | "jpg" => self.quality.jpeg.unwrap_or(self.quality.default),
            "png" => self.quality.png.unwrap_or(self.quality.default),
            "webp" => self.quality.webp.unwrap_or(self.quality.default),
            _ => self.quality.default,
        }
    }

    /// Apply the filename pattern for one variant.
    pub fn variant_filename(&self, base_name: &str, size: &str, ext: &str) -> String {
        self.filename_pattern
            .replace("{name}", base_name)
            .replace("{size}", size)
            .replace("{ext}", ext)
    }
}
