//! Engine configuration.
//!
//! [`EngineConfig`] bundles the cache limits and scheduler defaults. It can be
//! built in code or overlaid from an INI file:
//!
//! ```ini
//! [cache]
//! capacity = 2GB
//! load_factor = 0.75
//! eviction_target = 0.5
//! minimum_tile_size = 4KB
//!
//! [scheduler]
//! parallelism = auto
//! order = row-column-stack-sync
//! ```
//!
//! Keys that are absent keep their defaults.

use std::path::Path;

use ini::Ini;
use thiserror::Error;

use crate::cache::CacheConfig;
use crate::scheduler::{default_parallelism, ExecutionOrder, SchedulerConfig};

/// Errors loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file.
    #[error("Failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// The INI text is malformed.
    #[error("Failed to parse config: {0}")]
    Parse(String),

    /// A key has an unusable value.
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

fn invalid(section: &str, key: &str, value: impl ToString, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub scheduler: SchedulerConfig,
}

impl EngineConfig {
    pub fn with_cache(mut self, cache: CacheConfig) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerConfig) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache.capacity = capacity;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.scheduler.parallelism = parallelism;
        self
    }

    pub fn with_order(mut self, order: ExecutionOrder) -> Self {
        self.scheduler.order = order;
        self
    }

    /// Check ranges of all values.
    ///
    /// # Errors
    ///
    /// [`ConfigError::InvalidValue`] naming the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let cache = &self.cache;
        if !(cache.load_factor > 0.0 && cache.load_factor <= 1.0) {
            return Err(invalid(
                "cache",
                "load_factor",
                cache.load_factor,
                "must be in (0, 1]",
            ));
        }
        if let Some(target) = cache.eviction_target {
            if !(0.0..=1.0).contains(&target) {
                return Err(invalid(
                    "cache",
                    "eviction_target",
                    target,
                    "must be in [0, 1]",
                ));
            }
        }
        if self.scheduler.parallelism == 0 {
            return Err(invalid(
                "scheduler",
                "parallelism",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Parse INI text over the defaults and validate the result.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        parse_ini(&ini)
    }

    /// Load an INI file over the defaults. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }
}

fn parse_ini(ini: &Ini) -> Result<EngineConfig, ConfigError> {
    let mut config = EngineConfig::default();

    // [cache] section
    if let Some(section) = ini.section(Some("cache")) {
        if let Some(v) = section.get("capacity") {
            config.cache.capacity = parse_size(v).ok_or_else(|| {
                invalid("cache", "capacity", v, "expected format like '2GB', '500MB', or '1024KB'")
            })?;
        }
        if let Some(v) = section.get("load_factor") {
            config.cache.load_factor = v
                .trim()
                .parse()
                .map_err(|_| invalid("cache", "load_factor", v, "must be a number"))?;
        }
        if let Some(v) = section.get("eviction_target") {
            let v = v.trim();
            config.cache.eviction_target = if v.is_empty() || v.eq_ignore_ascii_case("auto") {
                None
            } else {
                Some(
                    v.parse()
                        .map_err(|_| invalid("cache", "eviction_target", v, "must be a number or 'auto'"))?,
                )
            };
        }
        if let Some(v) = section.get("minimum_tile_size") {
            config.cache.minimum_tile_size = parse_size(v).ok_or_else(|| {
                invalid("cache", "minimum_tile_size", v, "expected a byte size like '4KB'")
            })?;
        }
    }

    // [scheduler] section
    if let Some(section) = ini.section(Some("scheduler")) {
        if let Some(v) = section.get("parallelism") {
            let v = v.trim();
            config.scheduler.parallelism = if v.eq_ignore_ascii_case("auto") {
                default_parallelism()
            } else {
                v.parse().map_err(|_| {
                    invalid("scheduler", "parallelism", v, "must be a positive integer or 'auto'")
                })?
            };
        }
        if let Some(v) = section.get("order") {
            config.scheduler.order = ExecutionOrder::from_name(v).ok_or_else(|| {
                invalid(
                    "scheduler",
                    "order",
                    v,
                    "must be one of: row-raster-column, raster-row-column, row-column-stack-sync, synchronous-pull",
                )
            })?;
        }
    }

    config.validate()?;
    Ok(config)
}

/// Parse a human-readable byte size ("512", "64KB", "2 GB", "1m").
pub fn parse_size(s: &str) -> Option<usize> {
    let s = s.trim();
    let upper = s.to_ascii_uppercase();
    let (digits, multiplier) = [
        ("GB", 1024 * 1024 * 1024),
        ("G", 1024 * 1024 * 1024),
        ("MB", 1024 * 1024),
        ("M", 1024 * 1024),
        ("KB", 1024),
        ("K", 1024),
        ("B", 1),
    ]
    .iter()
    .find(|(suffix, _)| upper.ends_with(suffix))
    .map(|(suffix, m)| (&s[..s.len() - suffix.len()], *m))
    .unwrap_or((s, 1usize));

    digits.trim().parse::<usize>().ok()?.checked_mul(multiplier)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1024"), Some(1024));
        assert_eq!(parse_size("1KB"), Some(1024));
        assert_eq!(parse_size("2 GB"), Some(2 * 1024 * 1024 * 1024));
        assert_eq!(parse_size("500mb"), Some(500 * 1024 * 1024));
        assert_eq!(parse_size("12B"), Some(12));
        assert_eq!(parse_size("lots"), None);
        assert_eq!(parse_size(""), None);
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.order, ExecutionOrder::RowRasterColumn);
        assert!(config.scheduler.parallelism >= 1);
    }

    #[test]
    fn test_from_ini_overlays_defaults() {
        let config = EngineConfig::from_ini_str(
            "[cache]\ncapacity = 64MB\nload_factor = 0.8\n\n[scheduler]\nparallelism = 3\norder = raster-row-column\n",
        )
        .unwrap();
        assert_eq!(config.cache.capacity, 64 * 1024 * 1024);
        assert_eq!(config.cache.load_factor, 0.8);
        assert_eq!(config.cache.eviction_target, None);
        assert_eq!(config.scheduler.parallelism, 3);
        assert_eq!(config.scheduler.order, ExecutionOrder::RasterRowColumn);
    }

    #[test]
    fn test_invalid_values_name_the_key() {
        let err = EngineConfig::from_ini_str("[scheduler]\norder = diagonal\n").unwrap_err();
        match err {
            ConfigError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "scheduler");
                assert_eq!(key, "order");
            }
            other => panic!("unexpected error: {other}"),
        }

        let err = EngineConfig::from_ini_str("[cache]\nload_factor = 1.5\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "load_factor"));

        let err = EngineConfig::from_ini_str("[scheduler]\nparallelism = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "parallelism"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[cache]\nminimum_tile_size = 4KB\neviction_target = 0.25").unwrap();
        let config = EngineConfig::load_from(file.path()).unwrap();
        assert_eq!(config.cache.minimum_tile_size, 4096);
        assert_eq!(config.cache.eviction_target, Some(0.25));
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = EngineConfig::load_from(&dir.path().join("absent.ini")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }
}
