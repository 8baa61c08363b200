//! Cache statistics.

/// Snapshot of tile cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups that found an entry.
    pub hits: u64,
    /// Lookups that found nothing.
    pub misses: u64,
    /// Tiles admitted into the cache.
    pub insertions: u64,
    /// Tiles handed back uncached because they did not fit.
    pub rejections: u64,
    /// Entries removed by eviction (including unreachable rasters).
    pub evictions: u64,
    pub entry_count: usize,
    /// Bytes currently held.
    pub current_memory: usize,
    pub capacity: usize,
}

impl CacheStats {
    /// Fraction of lookups that hit, 0.0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Fraction of capacity in use.
    pub fn utilization(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.current_memory as f64 / self.capacity as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_utilization() {
        let stats = CacheStats {
            current_memory: 250,
            capacity: 1000,
            ..Default::default()
        };
        assert_eq!(stats.utilization(), 0.25);
    }
}
