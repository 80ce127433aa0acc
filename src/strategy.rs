//! Cache-path strategies: where does a variant live, relative to its
//! original and an optional logical context?
//!
//! Each strategy answers with a full storage-relative file path. The set is
//! ordered by priority; automatic selection walks it top-down and takes the
//! first strategy that supports the request. The hash-prefix strategy
//! supports everything, so selection always terminates.
//!
//! - **context-aware** (priority 100): mirrors the original's directory,
//!   `<dir>/<cache_folder>/<variant>`. With a context, the directory comes
//!   from the context template instead. This is the only arrangement the
//!   [fallback dispatcher](crate::fallback) can parse back out of a URL.
//! - **date-based** (priority 50, disabled by default): buckets variants
//!   under the generation date, `<cache_folder>/2026/08/31/<variant>`.
//! - **hash-levels** (priority 25, disabled by default): configurable
//!   fan-out tree, `<cache_folder>/<ab>/<cd>/<ef>/<variant>`.
//! - **hash-prefix** (priority 1): two-level fan-out over the variant
//!   filename hash, `<base>/<ab>/<cd>/<variant>`. The guaranteed fallback.

use crate::config::{
    DateBasedSettings, HashLevelsSettings, HashPrefixSettings, SubdirectoryConfig,
    ThumbcacheConfig,
};
use crate::error::ThumbError;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static UNRESOLVED_PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^}]+)\}").unwrap());

/// Logical owner of an image, e.g. a post or an album. `values` feeds the
/// `{placeholder}`s of the context's path template.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub name: String,
    pub values: BTreeMap<String, String>,
}

impl Context {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

/// Resolve a context to its directory path by filling the configured
/// template's placeholders.
///
/// Unknown context names with an `id` value map generically to
/// `<name>/<id>`; without one they are a configuration error, as is any
/// placeholder left unfilled.
pub fn resolve_context_path(
    config: &ThumbcacheConfig,
    context: &Context,
) -> Result<String, ThumbError> {
    let Some(template) = config.contexts.get(&context.name) else {
        if let Some(id) = context.values.get("id") {
            return Ok(format!("{}/{}", context.name, id));
        }
        return Err(ThumbError::UnknownContext(context.name.clone()));
    };
    if template.is_empty() {
        return Ok(String::new());
    }

    let mut path = template.clone();
    for (key, value) in &context.values {
        path = path.replace(&format!("{{{key}}}"), value);
    }

    if let Some(m) = UNRESOLVED_PLACEHOLDER.captures(&path) {
        return Err(ThumbError::MissingContextValue {
            context: context.name.clone(),
            placeholder: m[1].to_string(),
            template: template.clone(),
        });
    }
    Ok(path.trim_matches('/').to_string())
}

/// One way of placing cached variants in the storage tree.
pub trait PathStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn priority(&self) -> i32;
    /// Whether this strategy can place a variant for this request.
    fn supports(&self, context: Option<&Context>, original_path: &str) -> bool;
    /// Full storage-relative path for the variant file.
    fn build_path(
        &self,
        context: Option<&Context>,
        original_path: &str,
        variant_filename: &str,
    ) -> Result<String, ThumbError>;
}

fn filename_hash(filename: &str) -> String {
    hex::encode(Sha256::digest(filename.as_bytes()))
}

/// Sibling arrangement: cache folder next to the original, or under the
/// context's resolved directory.
struct ContextAwareStrategy {
    priority: i32,
    cache_folder: String,
    config: ThumbcacheConfig,
}

impl PathStrategy for ContextAwareStrategy {
    fn name(&self) -> &'static str {
        "context-aware"
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn supports(&self, context: Option<&Context>, original_path: &str) -> bool {
        // Needs a directory to mirror: either from the context template or
        // from the original's own location.
        context.is_some() || original_path.contains('/')
    }

    fn build_path(
        &self,
        context: Option<&Context>,
        original_path: &str,
        variant_filename: &str,
    ) -> Result<String, ThumbError> {
        let dir = match context {
            Some(ctx) => resolve_context_path(&self.config, ctx)?,
            None => match original_path.rsplit_once('/') {
                Some((dir, _)) => dir.to_string(),
                None => String::new(),
            },
        };
        if dir.is_empty() {
            Ok(format!("{}/{variant_filename}", self.cache_folder))
        } else {
            Ok(format!("{dir}/{}/{variant_filename}", self.cache_folder))
        }
    }
}

/// Hashed fan-out: `<base>/<ab>/<cd>/<variant>` from the variant filename
/// hash. Keeps any single directory from accumulating millions of entries.
struct HashPrefixStrategy {
    settings: HashPrefixSettings,
    cache_folder: String,
}

impl PathStrategy for HashPrefixStrategy {
    fn name(&self) -> &'static str {
        "hash-prefix"
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn supports(&self, _context: Option<&Context>, _original_path: &str) -> bool {
        // Fallback strategy, supports everything.
        true
    }

    fn build_path(
        &self,
        _context: Option<&Context>,
        _original_path: &str,
        variant_filename: &str,
    ) -> Result<String, ThumbError> {
        let hash = filename_hash(variant_filename);
        let base = self
            .settings
            .base_dir
            .clone()
            .unwrap_or_else(|| self.cache_folder.clone());
        let mut path = base;
        for level in 0..self.settings.depth {
            let offset = level * self.settings.length;
            path.push('/');
            path.push_str(&hash[offset..offset + self.settings.length]);
        }
        Ok(format!("{path}/{variant_filename}"))
    }
}

/// Date buckets under the cache folder. The path is taken from the wall
/// clock at generation time, so a variant regenerated after midnight lands
/// in a new bucket; the old copy is not migrated.
struct DateBasedStrategy {
    settings: DateBasedSettings,
    cache_folder: String,
}

impl PathStrategy for DateBasedStrategy {
    fn name(&self) -> &'static str {
        "date-based"
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn supports(&self, _context: Option<&Context>, _original_path: &str) -> bool {
        true
    }

    fn build_path(
        &self,
        _context: Option<&Context>,
        _original_path: &str,
        variant_filename: &str,
    ) -> Result<String, ThumbError> {
        let date_path = chrono::Local::now().format(&self.settings.format);
        Ok(format!(
            "{}/{date_path}/{variant_filename}",
            self.cache_folder
        ))
    }
}

/// Deeper hashed fan-out with configurable level count and width.
struct HashLevelsStrategy {
    settings: HashLevelsSettings,
    cache_folder: String,
}

impl PathStrategy for HashLevelsStrategy {
    fn name(&self) -> &'static str {
        "hash-levels"
    }

    fn priority(&self) -> i32 {
        self.settings.priority
    }

    fn supports(&self, _context: Option<&Context>, _original_path: &str) -> bool {
        true
    }

    fn build_path(
        &self,
        _context: Option<&Context>,
        _original_path: &str,
        variant_filename: &str,
    ) -> Result<String, ThumbError> {
        let hash = filename_hash(variant_filename);
        let mut path = self.cache_folder.clone();
        for level in 0..self.settings.levels {
            let offset = level * self.settings.chars_per_level;
            path.push('/');
            path.push_str(&hash[offset..offset + self.settings.chars_per_level]);
        }
        Ok(format!("{path}/{variant_filename}"))
    }
}

/// Priority-ordered strategy collection with automatic and manual
/// selection.
pub struct StrategySet {
    strategies: Vec<Box<dyn PathStrategy>>,
    auto: bool,
    manual: Option<String>,
}

impl StrategySet {
    /// Build the enabled strategies from config, highest priority first.
    /// A hash-prefix strategy is always present as the final fallback even
    /// when disabled in config.
    pub fn from_config(config: &ThumbcacheConfig) -> Self {
        let sub: &SubdirectoryConfig = &config.subdirectory;
        let mut strategies: Vec<Box<dyn PathStrategy>> = Vec::new();

        if sub.context_aware.enabled {
            strategies.push(Box::new(ContextAwareStrategy {
                priority: sub.context_aware.priority,
                cache_folder: config.cache_folder.clone(),
                config: config.clone(),
            }));
        }
        if sub.date_based.enabled {
            strategies.push(Box::new(DateBasedStrategy {
                settings: sub.date_based.clone(),
                cache_folder: config.cache_folder.clone(),
            }));
        }
        if sub.hash_levels.enabled {
            strategies.push(Box::new(HashLevelsStrategy {
                settings: sub.hash_levels.clone(),
                cache_folder: config.cache_folder.clone(),
            }));
        }
        let hash_prefix = if sub.hash_prefix.enabled {
            sub.hash_prefix.clone()
        } else {
            HashPrefixSettings::default()
        };
        strategies.push(Box::new(HashPrefixStrategy {
            settings: hash_prefix,
            cache_folder: config.cache_folder.clone(),
        }));

        strategies.sort_by_key(|s| std::cmp::Reverse(s.priority()));

        Self {
            strategies,
            auto: sub.auto_strategy(),
            manual: sub.manual_strategy.clone(),
        }
    }

    /// Pick the strategy for a request.
    ///
    /// Manual mode uses the configured name, falling back to automatic
    /// iteration when no loaded strategy carries it. Automatic mode takes
    /// the highest-priority strategy whose `supports` accepts the request.
    pub fn resolve(&self, context: Option<&Context>, original_path: &str) -> &dyn PathStrategy {
        if !self.auto
            && let Some(manual) = &self.manual
            && let Some(found) = self.strategies.iter().find(|s| s.name() == manual)
        {
            return found.as_ref();
        }
        self.strategies
            .iter()
            .find(|s| s.supports(context, original_path))
            .unwrap_or(&self.strategies[0])
            .as_ref()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set() -> StrategySet {
        StrategySet::from_config(&ThumbcacheConfig::default())
    }

    #[test]
    fn default_set_is_priority_ordered() {
        assert_eq!(set().names(), vec!["context-aware", "hash-prefix"]);
    }

    #[test]
    fn disabled_strategies_are_not_loaded() {
        let config = ThumbcacheConfig::from_toml(
            r#"
            [subdirectory.date_based]
            enabled = true
            "#,
        )
        .unwrap();
        let set = StrategySet::from_config(&config);
        assert_eq!(set.names(), vec!["context-aware", "date-based", "hash-prefix"]);
    }

    #[test]
    fn hash_prefix_survives_being_disabled() {
        let config = ThumbcacheConfig::from_toml(
            r#"
            [subdirectory.context_aware]
            enabled = false

            [subdirectory.hash_prefix]
            enabled = false
            "#,
        )
        .unwrap();
        let set = StrategySet::from_config(&config);
        assert_eq!(set.names(), vec!["hash-prefix"]);
    }

    #[test]
    fn auto_selection_prefers_context_aware() {
        let set = set();
        let ctx = Context::new("post").with("user_id", "1").with("post_id", "12");
        assert_eq!(set.resolve(Some(&ctx), "photo.jpg").name(), "context-aware");
        assert_eq!(set.resolve(None, "photos/cat.jpg").name(), "context-aware");
        // Bare root-level filename with no context: nothing to mirror.
        assert_eq!(set.resolve(None, "cat.jpg").name(), "hash-prefix");
    }

    #[test]
    fn manual_selection_overrides_auto() {
        let config = ThumbcacheConfig::from_toml(
            r#"
            [subdirectory]
            auto_strategy = false
            manual_strategy = "hash-prefix"
            "#,
        )
        .unwrap();
        let set = StrategySet::from_config(&config);
        assert_eq!(set.resolve(None, "photos/cat.jpg").name(), "hash-prefix");
    }

    #[test]
    fn manual_selection_of_unloaded_strategy_falls_back_to_auto() {
        let config = ThumbcacheConfig::from_toml(
            r#"
            [subdirectory]
            auto_strategy = false
            manual_strategy = "date-based"
            "#,
        )
        .unwrap();
        let set = StrategySet::from_config(&config);
        assert_eq!(set.resolve(None, "photos/cat.jpg").name(), "context-aware");
    }

    #[test]
    fn context_aware_mirrors_the_original_directory() {
        let set = set();
        let strategy = set.resolve(None, "photos/cats/cat.jpg");
        let path = strategy
            .build_path(None, "photos/cats/cat.jpg", "cat_thumb_small.jpg")
            .unwrap();
        assert_eq!(path, "photos/cats/thumbnails/cat_thumb_small.jpg");
    }

    #[test]
    fn context_aware_uses_the_context_template() {
        let set = set();
        let ctx = Context::new("post").with("user_id", "1").with("post_id", "12");
        let strategy = set.resolve(Some(&ctx), "cat.jpg");
        let path = strategy
            .build_path(Some(&ctx), "cat.jpg", "cat_thumb_small.jpg")
            .unwrap();
        assert_eq!(path, "user-posts/1/12/thumbnails/cat_thumb_small.jpg");
    }

    #[test]
    fn hash_prefix_is_deterministic_and_shaped() {
        let config = ThumbcacheConfig::default();
        let set = StrategySet::from_config(&config);
        let strategy = set.resolve(None, "test.jpg");
        assert_eq!(strategy.name(), "hash-prefix");

        let a = strategy
            .build_path(None, "test.jpg", "test_thumb_small.jpg")
            .unwrap();
        let b = strategy
            .build_path(None, "test.jpg", "test_thumb_small.jpg")
            .unwrap();
        assert_eq!(a, b);

        // thumbnails/<2 chars>/<2 chars>/test_thumb_small.jpg
        let parts: Vec<&str> = a.split('/').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "thumbnails");
        assert_eq!(parts[1].len(), 2);
        assert_eq!(parts[2].len(), 2);
        assert_eq!(parts[3], "test_thumb_small.jpg");
        assert!(parts[1].chars().all(|c| c.is_ascii_hexdigit()));

        // Prefixes are consecutive slices of the same hash.
        let hash = filename_hash("test_thumb_small.jpg");
        assert_eq!(parts[1], &hash[0..2]);
        assert_eq!(parts[2], &hash[2..4]);

        // A differently-named file lands in a different bucket.
        let other = strategy
            .build_path(None, "test.jpg", "other_thumb_small.jpg")
            .unwrap();
        assert_ne!(
            a.rsplit_once('/').unwrap().0,
            other.rsplit_once('/').unwrap().0
        );
    }

    #[test]
    fn hash_levels_respects_configured_shape() {
        let config = ThumbcacheConfig::from_toml(
            r#"
            [subdirectory.context_aware]
            enabled = false

            [subdirectory.hash_prefix]
            enabled = false

            [subdirectory.hash_levels]
            enabled = true
            levels = 3
            chars_per_level = 2
            "#,
        )
        .unwrap();
        let set = StrategySet::from_config(&config);
        let strategy = set.resolve(None, "x.jpg");
        assert_eq!(strategy.name(), "hash-levels");

        let path = strategy.build_path(None, "x.jpg", "x_thumb_small.jpg").unwrap();
        let parts: Vec<&str> = path.split('/').collect();
        assert_eq!(parts.len(), 5);
        assert!(parts[1..4].iter().all(|p| p.len() == 2));
    }

    #[test]
    fn date_based_embeds_todays_date() {
        let config = ThumbcacheConfig::from_toml(
            r#"
            [subdirectory]
            auto_strategy = false
            manual_strategy = "date-based"

            [subdirectory.date_based]
            enabled = true
            "#,
        )
        .unwrap();
        let set = StrategySet::from_config(&config);
        let strategy = set.resolve(None, "x.jpg");
        assert_eq!(strategy.name(), "date-based");

        let path = strategy.build_path(None, "x.jpg", "x_thumb_small.jpg").unwrap();
        let today = chrono::Local::now().format("%Y/%m/%d").to_string();
        assert_eq!(path, format!("thumbnails/{today}/x_thumb_small.jpg"));
    }

    #[test]
    fn resolve_context_path_fills_placeholders() {
        let mut config = ThumbcacheConfig::default();
        config
            .contexts
            .insert("area".into(), "area/{user_id}/{post_id}".into());
        let ctx = Context::new("area").with("user_id", "1").with("post_id", "12");
        assert_eq!(resolve_context_path(&config, &ctx).unwrap(), "area/1/12");
    }

    #[test]
    fn missing_placeholder_names_the_gap() {
        let config = ThumbcacheConfig::default();
        let ctx = Context::new("post").with("user_id", "1");
        let err = resolve_context_path(&config, &ctx).unwrap_err();
        match err {
            ThumbError::MissingContextValue { placeholder, .. } => {
                assert_eq!(placeholder, "post_id");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unknown_context_with_id_maps_generically() {
        let config = ThumbcacheConfig::default();
        let ctx = Context::new("products").with("id", "42");
        assert_eq!(resolve_context_path(&config, &ctx).unwrap(), "products/42");

        let ctx = Context::new("products");
        assert!(matches!(
            resolve_context_path(&config, &ctx),
            Err(ThumbError::UnknownContext(_))
        ));
    }
}
