//! The cache coordinator: turns a (original, size, method) request into a
//! cache hit or a freshly generated artifact.
//!
//! The resolution flow is: rewrite the original path through its context,
//! check the original exists, look up the size, compute the variant's cache
//! path through the strategy set, and serve the cached file if present.
//! On a miss, generation runs the security gate, decodes, executes the
//! geometry plan, encodes, and writes the artifact atomically.
//!
//! Two policies shape error handling. In `silent` mode (the default),
//! recoverable errors — missing original, validation refusal, codec
//! failure — degrade to a [`Resolution::Fallback`] pointing at the original
//! when `fallback_on_error` is set, and are logged rather than raised.
//! `strict` mode propagates them. Configuration mistakes (unknown size or
//! context, unresolved placeholder) always propagate in both modes.
//!
//! Concurrent requests for the same cache path are single-flighted: a
//! per-key mutex serializes generation, the loser re-checks the cache after
//! acquiring the lock, and the atomic storage write means no reader ever
//! sees a partial artifact.

use crate::codec;
use crate::config::{ErrorMode, ThumbcacheConfig, TransformMethod};
use crate::error::ThumbError;
use crate::focal;
use crate::geometry::{self, TransformPlan};
use crate::security;
use crate::storage::Storage;
use crate::strategy::{Context, StrategySet, resolve_context_path};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, warn};

/// One variant request.
#[derive(Debug, Clone)]
pub struct VariantRequest {
    /// Storage-relative path of the original. With a context, only the
    /// basename is kept and the directory comes from the context template.
    pub original: String,
    /// Size name from the configured size table.
    pub size: String,
    /// Override of the configured default method.
    pub method: Option<TransformMethod>,
    pub context: Option<Context>,
}

impl VariantRequest {
    pub fn new(original: impl Into<String>, size: impl Into<String>) -> Self {
        Self {
            original: original.into(),
            size: size.into(),
            method: None,
            context: None,
        }
    }

    pub fn with_method(mut self, method: TransformMethod) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_context(mut self, context: Context) -> Self {
        self.context = Some(context);
        self
    }
}

/// Outcome of a resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// The variant already existed at this cache path.
    Cached(String),
    /// The variant was generated during this call.
    Generated(String),
    /// Cache path computed but generation was deferred to the web tier
    /// (see [`ThumbnailService::resolve_path`]).
    Pending(String),
    /// A recoverable error was swallowed; serve the original at this path.
    Fallback(String),
}

impl Resolution {
    /// The storage path to serve.
    pub fn path(&self) -> &str {
        match self {
            Resolution::Cached(p)
            | Resolution::Generated(p)
            | Resolution::Pending(p)
            | Resolution::Fallback(p) => p,
        }
    }

    pub fn was_generated(&self) -> bool {
        matches!(self, Resolution::Generated(_))
    }
}

/// Coordinator over storage, strategies, and the transform pipeline.
pub struct ThumbnailService {
    config: Arc<ThumbcacheConfig>,
    storage: Arc<dyn Storage>,
    strategies: StrategySet,
    in_flight: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl ThumbnailService {
    pub fn new(config: Arc<ThumbcacheConfig>, storage: Arc<dyn Storage>) -> Self {
        let strategies = StrategySet::from_config(&config);
        Self {
            config,
            storage,
            strategies,
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ThumbcacheConfig {
        &self.config
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    /// Resolve a request, generating the variant on a cache miss.
    pub fn resolve(&self, request: &VariantRequest) -> Result<Resolution, ThumbError> {
        self.resolve_inner(request, true)
    }

    /// Resolve the variant's cache path without generating anything. A miss
    /// yields [`Resolution::Pending`]; the fallback dispatcher generates on
    /// the first real fetch.
    pub fn resolve_path(&self, request: &VariantRequest) -> Result<Resolution, ThumbError> {
        self.resolve_inner(request, false)
    }

    fn resolve_inner(
        &self,
        request: &VariantRequest,
        generate: bool,
    ) -> Result<Resolution, ThumbError> {
        let original = self.effective_original(request)?;

        match self.try_resolve(request, &original, generate) {
            Ok(resolution) => Ok(resolution),
            Err(err) if err.is_recoverable() && self.config.error_mode == ErrorMode::Silent => {
                warn!(
                    path = %original,
                    size = %request.size,
                    error = %err,
                    "thumbnail resolution degraded"
                );
                if self.config.fallback_on_error {
                    Ok(Resolution::Fallback(original))
                } else {
                    Err(err)
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Context rewrite: `photos/cat.jpg` in context `post` becomes
    /// `user-posts/1/12/cat.jpg`.
    fn effective_original(&self, request: &VariantRequest) -> Result<String, ThumbError> {
        let Some(context) = &request.context else {
            return Ok(request.original.clone());
        };
        let basename = request
            .original
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(&request.original);
        let context_path = resolve_context_path(&self.config, context)?;
        if context_path.is_empty() {
            Ok(basename.to_string())
        } else {
            Ok(format!("{context_path}/{basename}"))
        }
    }

    fn try_resolve(
        &self,
        request: &VariantRequest,
        original: &str,
        generate: bool,
    ) -> Result<Resolution, ThumbError> {
        if !self.storage.exists(original) {
            return Err(ThumbError::NotFound(original.to_string()));
        }

        let size = self
            .config
            .sizes
            .get(&request.size)
            .copied()
            .ok_or_else(|| ThumbError::UnknownSize(request.size.clone()))?;

        let cache_path = self.variant_path(request, original)?;

        if self.storage.exists(&cache_path) {
            debug!(path = %cache_path, "cache hit");
            return Ok(Resolution::Cached(cache_path));
        }
        if !generate {
            // The original is vetted before its link is handed out, not
            // when the fallback later materializes it.
            let bytes = self.read_original(original)?;
            security::validate_original(original, &bytes, &self.config.security)?;
            return Ok(Resolution::Pending(cache_path));
        }

        // Single-flight: one generation per cache path at a time.
        let lock = self.key_lock(&cache_path);
        let _guard = lock.lock().unwrap();

        // The winner may have finished while we waited.
        if self.storage.exists(&cache_path) {
            debug!(path = %cache_path, "cache hit after waiting on generation");
            self.release_key(&cache_path, &lock);
            return Ok(Resolution::Cached(cache_path));
        }

        let result = self.generate(request, original, &cache_path, size.width, size.height);
        self.release_key(&cache_path, &lock);
        match result {
            Ok(()) => Ok(Resolution::Generated(cache_path)),
            Err(err) => {
                error!(
                    path = %original,
                    size = %request.size,
                    error = %err,
                    "thumbnail generation failed"
                );
                Err(err)
            }
        }
    }

    /// Compute the cache path for a request through the strategy set.
    pub fn variant_path(
        &self,
        request: &VariantRequest,
        original: &str,
    ) -> Result<String, ThumbError> {
        let basename = original
            .rsplit_once('/')
            .map(|(_, name)| name)
            .unwrap_or(original);
        let (base_name, ext) = basename.rsplit_once('.').unwrap_or((basename, ""));

        // Requests differing only in method must not share a cache file.
        // The configured default keeps the plain, URL-parseable size token;
        // overrides get a suffixed one (`small-crop`).
        let method = request.method.unwrap_or(self.config.method);
        let size_token = if method == self.config.method {
            request.size.clone()
        } else {
            format!("{}-{}", request.size, method.as_str())
        };
        let filename = self.config.variant_filename(base_name, &size_token, ext);

        let strategy = self.strategies.resolve(request.context.as_ref(), original);
        debug!(strategy = strategy.name(), original = %original, "strategy resolved");
        strategy.build_path(request.context.as_ref(), original, &filename)
    }

    fn generate(
        &self,
        request: &VariantRequest,
        original: &str,
        cache_path: &str,
        target_w: u32,
        target_h: u32,
    ) -> Result<(), ThumbError> {
        let bytes = self.read_original(original)?;

        security::validate_original(original, &bytes, &self.config.security)?;

        let generation_err = |reason: String| ThumbError::Generation {
            path: original.to_string(),
            reason,
        };

        let format = codec::sniff_format(&bytes)
            .ok_or_else(|| generation_err("unrecognized image format".into()))?;
        let image = codec::decode(&bytes).map_err(|e| generation_err(e.to_string()))?;

        let method = request.method.unwrap_or(self.config.method);
        let plan = self.plan(method, &image, target_w, target_h);
        let rendered = codec::render(&image, &plan, format);

        let quality = self
            .config
            .quality_for(format.extensions_str().first().copied().unwrap_or(""));
        let encoded =
            codec::encode(&rendered, format, quality).map_err(|e| generation_err(e.to_string()))?;

        self.storage
            .write(cache_path, &encoded)
            .map_err(|e| generation_err(format!("cache write failed: {e}")))?;

        debug!(
            original = %original,
            cache_path = %cache_path,
            size = %request.size,
            "thumbnail generated"
        );
        Ok(())
    }

    fn read_original(&self, original: &str) -> Result<Vec<u8>, ThumbError> {
        self.storage.read(original).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ThumbError::NotFound(original.to_string())
            } else {
                ThumbError::Io(e)
            }
        })
    }

    fn plan(
        &self,
        method: TransformMethod,
        image: &image::DynamicImage,
        target_w: u32,
        target_h: u32,
    ) -> TransformPlan {
        let (w, h) = (image.width(), image.height());
        match method {
            TransformMethod::Resize => geometry::resize_plan(w, h, target_w, target_h),
            TransformMethod::Crop => geometry::crop_plan(w, h, target_w, target_h),
            TransformMethod::Fit => geometry::fit_plan(w, h, target_w, target_h),
            TransformMethod::SmartCrop => {
                let focal = focal::detect_focal_point(image, &self.config.smart_crop.algorithm);
                geometry::smart_crop_plan(
                    w,
                    h,
                    target_w,
                    target_h,
                    focal.x,
                    focal.y,
                    self.config.smart_crop.rule_of_thirds,
                )
            }
        }
    }

    fn key_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.in_flight
            .lock()
            .unwrap()
            .entry(key.to_string())
            .or_default()
            .clone()
    }

    fn release_key(&self, key: &str, lock: &Arc<Mutex<()>>) {
        let mut in_flight = self.in_flight.lock().unwrap();
        // Drop the registry entry once no other request holds a handle:
        // ours plus the map's is two.
        if Arc::strong_count(lock) <= 2 {
            in_flight.remove(key);
        }
    }

    /// Delete every cached variant of one original: files in the sibling
    /// cache folder whose name contains the original's base name. Returns
    /// the number of files removed.
    pub fn delete_variants(&self, original: &str) -> Result<usize, ThumbError> {
        let (dir, basename) = match original.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, original),
        };
        let base_name = basename.rsplit_once('.').map(|(b, _)| b).unwrap_or(basename);
        let cache_dir = match dir {
            Some(dir) => format!("{dir}/{}", self.config.cache_folder),
            None => self.config.cache_folder.clone(),
        };

        let mut deleted = 0;
        for file in self.storage.list_files(&cache_dir)? {
            let name = file.rsplit_once('/').map(|(_, n)| n).unwrap_or(&file);
            if name.contains(base_name) {
                self.storage.delete(&file)?;
                deleted += 1;
            }
        }
        debug!(original = %original, deleted, "variants deleted");
        Ok(deleted)
    }

    /// Remove cache folders wholesale. With a directory, removes that
    /// directory's cache folder; without, sweeps the whole tree. Returns
    /// the number of cache folders removed.
    pub fn clear_all(&self, directory: Option<&str>) -> Result<usize, ThumbError> {
        let cache_folder = &self.config.cache_folder;
        if let Some(dir) = directory {
            let target = format!("{dir}/{cache_folder}");
            if !self.storage.exists(&target) {
                return Ok(0);
            }
            self.storage.delete_directory(&target)?;
            return Ok(1);
        }

        let mut deleted = 0;
        for dir in self.storage.list_directories()? {
            let leaf = dir.rsplit_once('/').map(|(_, l)| l).unwrap_or(&dir);
            if leaf == cache_folder {
                self.storage.delete_directory(&dir)?;
                deleted += 1;
            }
        }
        debug!(deleted, "cache folders cleared");
        Ok(deleted)
    }
}
