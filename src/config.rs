//! Configuration management for the annotation core

use std::env;
use std::str::FromStr;

use serde::Deserialize;
use thiserror::Error;

/// Attribute linking decorations to their annotation
pub const DEFAULT_CORRELATION_ATTRIBUTE: &str = "data-annotation-id";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnchorConfig {
    pub scheduler: SchedulerConfig,
    pub watcher: WatcherConfig,
    pub painter: PainterConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    /// Items resolved per batch
    pub batch_size: usize,
    /// Failed attempts before an annotation is dropped
    pub max_attempts: u32,
    /// Delay between batches that made progress
    pub batch_yield_ms: u64,
    /// Delay before retrying after a batch where nothing resolved
    pub retry_delay_ms: u64,
    /// Priority added to the URL-fragment scroll target
    pub scroll_target_boost: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WatcherConfig {
    /// Quiet period that collapses a burst of mutations into one re-drain
    pub mutation_throttle_ms: u64,
    /// Intersection margin around the viewport
    pub root_margin_px: u32,
    /// Priority added when a correlated element becomes visible
    pub visibility_boost: u64,
    /// Content-bearing elements watched for visibility
    pub observed_tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PainterConfig {
    pub highlight_class: String,
    pub correlation_attribute: String,
    pub image_wrapper_class: String,
    pub image_overlay_class: String,
    pub flash_class: String,
    pub flash_duration_ms: u64,
    /// Shorter ranges are not painted
    pub min_highlight_chars: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub database_url: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_attempts: 5,
            batch_yield_ms: 16,
            retry_delay_ms: 1000,
            scroll_target_boost: 1000,
        }
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            mutation_throttle_ms: 500,
            root_margin_px: 200,
            visibility_boost: 50,
            observed_tags: ["p", "h1", "h2", "h3", "h4", "h5", "h6", "div", "span", "img"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

impl Default for PainterConfig {
    fn default() -> Self {
        Self {
            highlight_class: "highlighted-text".to_string(),
            correlation_attribute: DEFAULT_CORRELATION_ATTRIBUTE.to_string(),
            image_wrapper_class: "highlighted-image".to_string(),
            image_overlay_class: "highlighted-image-overlay".to_string(),
            flash_class: "highlight-flash".to_string(),
            flash_duration_ms: 2000,
            min_highlight_chars: 3,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
        }
    }
}

impl AnchorConfig {
    /// Load `.env` (if any) and read `ANNOTATOR_*` variables
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_env()
    }

    /// Read `ANNOTATOR_*` variables, keeping defaults for unset ones
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let string = |key: &str, default: String| lookup(key).unwrap_or(default);

        let config = AnchorConfig {
            scheduler: SchedulerConfig {
                batch_size: parse(&lookup, "ANNOTATOR_BATCH_SIZE", defaults.scheduler.batch_size)?,
                max_attempts: parse(&lookup, "ANNOTATOR_MAX_ATTEMPTS", defaults.scheduler.max_attempts)?,
                batch_yield_ms: parse(&lookup, "ANNOTATOR_BATCH_YIELD_MS", defaults.scheduler.batch_yield_ms)?,
                retry_delay_ms: parse(&lookup, "ANNOTATOR_RETRY_DELAY_MS", defaults.scheduler.retry_delay_ms)?,
                scroll_target_boost: parse(
                    &lookup,
                    "ANNOTATOR_SCROLL_TARGET_BOOST",
                    defaults.scheduler.scroll_target_boost,
                )?,
            },
            watcher: WatcherConfig {
                mutation_throttle_ms: parse(
                    &lookup,
                    "ANNOTATOR_MUTATION_THROTTLE_MS",
                    defaults.watcher.mutation_throttle_ms,
                )?,
                root_margin_px: parse(&lookup, "ANNOTATOR_ROOT_MARGIN_PX", defaults.watcher.root_margin_px)?,
                visibility_boost: parse(
                    &lookup,
                    "ANNOTATOR_VISIBILITY_BOOST",
                    defaults.watcher.visibility_boost,
                )?,
                observed_tags: defaults.watcher.observed_tags,
            },
            painter: PainterConfig {
                highlight_class: string(
                    "ANNOTATOR_HIGHLIGHT_CLASS",
                    defaults.painter.highlight_class.clone(),
                ),
                flash_duration_ms: parse(
                    &lookup,
                    "ANNOTATOR_FLASH_DURATION_MS",
                    defaults.painter.flash_duration_ms,
                )?,
                min_highlight_chars: parse(
                    &lookup,
                    "ANNOTATOR_MIN_HIGHLIGHT_CHARS",
                    defaults.painter.min_highlight_chars,
                )?,
                ..defaults.painter
            },
            store: StoreConfig {
                database_url: string("ANNOTATOR_DATABASE_URL", defaults.store.database_url),
            },
        };

        if config.scheduler.batch_size == 0 {
            return Err(ConfigError::Invalid {
                key: "ANNOTATOR_BATCH_SIZE".into(),
                value: "0".into(),
            });
        }
        if config.scheduler.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "ANNOTATOR_MAX_ATTEMPTS".into(),
                value: "0".into(),
            });
        }

        Ok(config)
    }
}

fn parse<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = AnchorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.scheduler.batch_size, 10);
        assert_eq!(config.scheduler.max_attempts, 5);
        assert_eq!(config.watcher.mutation_throttle_ms, 500);
        assert_eq!(config.watcher.root_margin_px, 200);
        assert_eq!(config.painter.correlation_attribute, "data-annotation-id");
        assert_eq!(config.painter.flash_duration_ms, 2000);
        assert_eq!(config.store.database_url, "sqlite::memory:");
    }

    #[test]
    fn test_overrides() {
        let config = AnchorConfig::from_lookup(lookup(&[
            ("ANNOTATOR_BATCH_SIZE", "4"),
            ("ANNOTATOR_HIGHLIGHT_CLASS", "hl"),
            ("ANNOTATOR_DATABASE_URL", "sqlite:./annotations.db"),
        ]))
        .unwrap();
        assert_eq!(config.scheduler.batch_size, 4);
        assert_eq!(config.painter.highlight_class, "hl");
        assert_eq!(config.painter.flash_class, "highlight-flash");
        assert_eq!(config.store.database_url, "sqlite:./annotations.db");
    }

    #[test]
    fn test_invalid_values() {
        let err = AnchorConfig::from_lookup(lookup(&[("ANNOTATOR_MAX_ATTEMPTS", "many")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: "ANNOTATOR_MAX_ATTEMPTS".into(),
                value: "many".into()
            }
        );
        assert!(AnchorConfig::from_lookup(lookup(&[("ANNOTATOR_BATCH_SIZE", "0")])).is_err());
    }
}
