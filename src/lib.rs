//! # Thumbcache
//!
//! Lazy, filesystem-cached image thumbnail derivation. Variants are
//! generated on first request and cached as plain files, so every
//! subsequent request is served directly by the web tier without touching
//! this crate at all.
//!
//! # Architecture: Resolve → Check → Generate → Store
//!
//! ```text
//! request (original, size, method, context?)
//!     │
//!     ├─ strategy   where does this variant live?        [`strategy`]
//!     ├─ check      cached file at that path? serve it   [`service`]
//!     └─ generate   gate → decode → plan → encode → write
//!            │           [`security`]  [`geometry`]  [`codec`]
//!            └─ smart-crop asks [`focal`] for the salient point
//! ```
//!
//! The coordinator owns two guarantees: generation for one cache path is
//! single-flighted (a per-key lock plus a re-check after acquiring it), and
//! completed writes become visible atomically (write-temp-then-rename in
//! [`storage`]), so concurrent readers never observe a partial artifact.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`config`] | `thumbcache.toml` loading and validation: sizes, strategies, security limits, signing |
//! | [`service`] | The cache coordinator: resolution flow, single-flight, error/fallback policy, invalidation |
//! | [`strategy`] | Cache-path strategies (context-aware, hash-prefix, date-based, hash-levels) and selection |
//! | [`geometry`] | Pure transform math: resize/crop/fit/smart-crop plans |
//! | [`focal`] | Sobel edge-energy focal point detection for smart crops |
//! | [`codec`] | Decode, plan execution, per-format encode, MIME tables |
//! | [`security`] | Pre-decode validation gate for originals |
//! | [`signing`] | HMAC-SHA256 signed URLs with expiration (`oh`/`oe`/`_t`) |
//! | [`fallback`] | Web-tier miss handler: variant URL parsing and on-demand dispatch |
//! | [`storage`] | Storage trait plus disk (atomic writes) and in-memory backends |
//! | [`error`] | The error taxonomy and its recoverability rules |
//!
//! # Design Decisions
//!
//! ## Files, Not a Cache Service
//!
//! The cache is the filesystem. A variant's location is deterministic, so
//! the web tier serves hits with zero coordination; the crate only runs on
//! misses. That makes invalidation `rm` (see
//! [`service::ThumbnailService::delete_variants`]) and makes the cache
//! survive restarts for free.
//!
//! ## Strategies Return Whole Paths
//!
//! A [`strategy::PathStrategy`] answers with the complete storage-relative
//! file path, not a directory hint. Only the context-aware (sibling)
//! arrangement is parseable back out of a URL by the [`fallback`]
//! dispatcher; hashed and dated arrangements trade that for directory
//! fan-out and are served through [`service::ThumbnailService::resolve`]
//! directly.
//!
//! ## Errors Split by Who Can Fix Them
//!
//! Content problems (missing original, oversized file, broken encoding)
//! degrade to the original image in silent mode — a broken upload should
//! not 500 a page. Deployment problems (unknown size name, unresolved
//! context placeholder) always propagate, in every mode. See
//! [`error::ThumbError::is_recoverable`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use thumbcache::config::ThumbcacheConfig;
//! use thumbcache::service::{ThumbnailService, VariantRequest};
//! use thumbcache::storage::DiskStorage;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Arc::new(ThumbcacheConfig::load("thumbcache.toml".as_ref())?);
//! let storage = Arc::new(DiskStorage::new("/var/www/storage"));
//! let service = ThumbnailService::new(config, storage);
//!
//! let resolution = service.resolve(&VariantRequest::new("photos/cat.jpg", "small"))?;
//! println!("serve {}", resolution.path());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod error;
pub mod fallback;
pub mod focal;
pub mod geometry;
pub mod security;
pub mod service;
pub mod signing;
pub mod storage;
pub mod strategy;

pub use config::{ThumbcacheConfig, TransformMethod};
pub use error::ThumbError;
pub use fallback::{FallbackDispatcher, VariantResponse};
pub use service::{Resolution, ThumbnailService, VariantRequest};
pub use signing::{SignatureError, SignedUrlAuthority};
pub use storage::{DiskStorage, MemoryStorage, Storage};
pub use strategy::{Context, PathStrategy, StrategySet};
