//! Tile cache limits.

/// Default cache capacity (512 MiB).
pub const DEFAULT_CACHE_CAPACITY: usize = 512 * 1024 * 1024;

/// Default admission threshold as a fraction of capacity.
pub const DEFAULT_LOAD_FACTOR: f64 = 0.75;

/// Memory limits of a [`TileCache`](super::TileCache).
///
/// An insert that would push usage above `capacity * load_factor` triggers
/// eviction down to `capacity * eviction_target`; a tile that still does not
/// fit under `capacity` is handed back uncached. Tiles of at most
/// `minimum_tile_size` bytes are never cached.
///
/// # Example
///
/// ```
/// use rasterflow::cache::CacheConfig;
///
/// let config = CacheConfig::default()
///     .with_capacity(64 * 1024 * 1024)
///     .with_load_factor(0.8);
/// assert_eq!(config.eviction_target(), 0.8 * 0.8);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheConfig {
    /// Soft memory bound in bytes.
    pub capacity: usize,
    /// Fraction of capacity above which inserts trigger eviction.
    pub load_factor: f64,
    /// Low-water mark after eviction; `None` means `load_factor²`.
    pub eviction_target: Option<f64>,
    /// Tiles this size or smaller (bytes) are not cached.
    pub minimum_tile_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CACHE_CAPACITY,
            load_factor: DEFAULT_LOAD_FACTOR,
            eviction_target: None,
            minimum_tile_size: 0,
        }
    }
}

impl CacheConfig {
    /// Config with explicit capacity, load factor and minimum tile size.
    pub fn new(capacity: usize, load_factor: f64, minimum_tile_size: usize) -> Self {
        Self {
            capacity,
            load_factor,
            eviction_target: None,
            minimum_tile_size,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_load_factor(mut self, load_factor: f64) -> Self {
        self.load_factor = load_factor;
        self
    }

    pub fn with_eviction_target(mut self, eviction_target: f64) -> Self {
        self.eviction_target = Some(eviction_target);
        self
    }

    pub fn with_minimum_tile_size(mut self, minimum_tile_size: usize) -> Self {
        self.minimum_tile_size = minimum_tile_size;
        self
    }

    /// Effective low-water mark as a fraction of capacity.
    pub fn eviction_target(&self) -> f64 {
        self.eviction_target
            .unwrap_or(self.load_factor * self.load_factor)
    }

    /// Usage in bytes above which an insert triggers eviction.
    pub(crate) fn admission_threshold(&self) -> f64 {
        self.capacity as f64 * self.load_factor.clamp(0.0, 1.0)
    }

    /// Usage in bytes eviction reduces the cache to.
    pub(crate) fn eviction_threshold(&self) -> usize {
        (self.eviction_target().clamp(0.0, 1.0) * self.capacity as f64).round() as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_eviction_target_is_squared_load_factor() {
        let config = CacheConfig::new(1000, 0.75, 10);
        assert_eq!(config.eviction_target(), 0.5625);
        assert_eq!(config.eviction_threshold(), 563);
        assert_eq!(config.admission_threshold(), 750.0);
    }

    #[test]
    fn test_explicit_eviction_target() {
        let config = CacheConfig::new(1000, 0.75, 10).with_eviction_target(0.5);
        assert_eq!(config.eviction_threshold(), 500);
    }
}
