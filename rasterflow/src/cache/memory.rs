//! Memory-bounded LRU tile store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::config::CacheConfig;
use super::stats::CacheStats;
use crate::raster::{Raster, RasterId, Rectangle, WeakRaster};
use crate::tile::{SampleBuffer, Tile, TileStorage};

struct CacheEntry {
    rect: Rectangle,
    storage: Arc<TileStorage>,
    size: usize,
    timestamp: u64,
    access_count: u64,
}

struct RasterEntries {
    raster: WeakRaster,
    entries: Vec<CacheEntry>,
}

#[derive(Default)]
struct Counters {
    hits: u64,
    misses: u64,
    insertions: u64,
    rejections: u64,
    evictions: u64,
}

struct CacheState {
    config: CacheConfig,
    rasters: HashMap<RasterId, RasterEntries>,
    current_memory: usize,
    clock: u64,
    counters: Counters,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn entry_count(&self) -> usize {
        self.rasters.values().map(|r| r.entries.len()).sum()
    }

    fn remove(&mut self, id: RasterId, rect: &Rectangle) -> Option<CacheEntry> {
        let slot = self.rasters.get_mut(&id)?;
        let pos = slot.entries.iter().position(|e| e.rect == *rect)?;
        let entry = slot.entries.remove(pos);
        if slot.entries.is_empty() {
            self.rasters.remove(&id);
        }
        self.current_memory -= entry.size;
        Some(entry)
    }

    /// Drop entries of rasters that are no longer referenced anywhere.
    fn purge_unreachable(&mut self) {
        let dead: Vec<RasterId> = self
            .rasters
            .iter()
            .filter(|(_, slot)| !slot.raster.is_alive())
            .map(|(id, _)| *id)
            .collect();
        for id in dead {
            if let Some(slot) = self.rasters.remove(&id) {
                let freed: usize = slot.entries.iter().map(|e| e.size).sum();
                self.current_memory -= freed;
                self.counters.evictions += slot.entries.len() as u64;
                trace!(raster = %id, entries = slot.entries.len(), freed, "Purged unreachable raster");
            }
        }
    }

    fn evict(&mut self) {
        self.purge_unreachable();

        let threshold = self.config.eviction_threshold();
        if self.current_memory <= threshold {
            return;
        }

        let mut candidates: Vec<(u64, RasterId, Rectangle)> = self
            .rasters
            .iter()
            .flat_map(|(id, slot)| slot.entries.iter().map(move |e| (e.timestamp, *id, e.rect)))
            .collect();
        candidates.sort_by_key(|(timestamp, _, _)| *timestamp);

        let before = self.current_memory;
        let mut removed = 0u64;
        for (_, id, rect) in candidates {
            if self.current_memory <= threshold {
                break;
            }
            if self.remove(id, &rect).is_some() {
                removed += 1;
            }
        }
        self.counters.evictions += removed;

        debug!(
            removed,
            freed = before - self.current_memory,
            current = self.current_memory,
            threshold,
            "Evicted tiles"
        );
    }

    /// Try to admit `storage` under `(raster, rect)`.
    fn admit(&mut self, raster: &Raster, rect: Rectangle, storage: Arc<TileStorage>) -> bool {
        let size = storage.byte_size();
        if size <= self.config.minimum_tile_size {
            trace!(raster = %raster, %rect, size, "Tile below minimum size, not cached");
            return false;
        }

        // Re-inserting a key replaces the previous entry.
        self.remove(raster.id(), &rect);

        if (self.current_memory + size) as f64 > self.config.admission_threshold() {
            self.evict();
        }
        if self.current_memory + size > self.config.capacity {
            self.counters.rejections += 1;
            debug!(
                raster = %raster,
                %rect,
                size,
                current = self.current_memory,
                capacity = self.config.capacity,
                "Tile does not fit, returned uncached"
            );
            return false;
        }

        let timestamp = self.tick();
        let slot = self
            .rasters
            .entry(raster.id())
            .or_insert_with(|| RasterEntries {
                raster: raster.downgrade(),
                entries: Vec::new(),
            });
        slot.entries.push(CacheEntry {
            rect,
            storage,
            size,
            timestamp,
            access_count: 0,
        });
        self.current_memory += size;
        self.counters.insertions += 1;
        true
    }
}

/// Memory-bounded store of computed tiles keyed by `(raster, rectangle)`.
///
/// All operations are serialized by one internal lock and never fail: a
/// tile the cache cannot hold is simply returned uncached. Only weak
/// references to rasters are kept; entries of dropped rasters are purged on
/// the next eviction.
///
/// # Example
///
/// ```
/// use rasterflow::cache::{CacheConfig, TileCache};
/// use rasterflow::raster::{DataType, Raster, Rectangle};
/// use rasterflow::tile::SampleBuffer;
///
/// let cache = TileCache::new(CacheConfig::new(1_000_000, 0.75, 0));
/// let raster = Raster::new("b1", 100, 100, DataType::Float32);
/// let rect = Rectangle::new(0, 0, 10, 10);
///
/// cache.insert(&raster, rect, SampleBuffer::zeroed(DataType::Float32, 100));
/// assert!(cache.lookup(&raster, &rect).is_some());
/// assert_eq!(cache.current_memory(), 400);
/// ```
pub struct TileCache {
    state: Mutex<CacheState>,
}

impl TileCache {
    /// Create an empty cache.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(CacheState {
                config,
                rasters: HashMap::new(),
                current_memory: 0,
                clock: 0,
                counters: Counters::default(),
            }),
        }
    }

    /// Find the cached tile for exactly `rect` of `raster`.
    ///
    /// A hit refreshes the entry's access timestamp. The returned tile is
    /// read-only.
    pub fn lookup(&self, raster: &Raster, rect: &Rectangle) -> Option<Tile> {
        let mut state = self.state.lock();
        let timestamp = state.tick();
        let found = state
            .rasters
            .get_mut(&raster.id())
            .and_then(|slot| slot.entries.iter_mut().find(|e| e.rect == *rect))
            .map(|entry| {
                entry.timestamp = timestamp;
                entry.access_count += 1;
                Arc::clone(&entry.storage)
            });
        match found {
            Some(storage) => {
                state.counters.hits += 1;
                Some(Tile::from_storage(raster.clone(), *rect, storage, false))
            }
            None => {
                state.counters.misses += 1;
                None
            }
        }
    }

    /// Returns true if an entry exists, without touching timestamps or counters.
    pub fn contains(&self, raster: &Raster, rect: &Rectangle) -> bool {
        self.state
            .lock()
            .rasters
            .get(&raster.id())
            .is_some_and(|slot| slot.entries.iter().any(|e| e.rect == *rect))
    }

    /// Wrap `samples` as the tile `rect` of `raster` and try to cache it.
    ///
    /// The tile is returned read-only whether or not it was admitted.
    pub fn insert(&self, raster: &Raster, rect: Rectangle, samples: SampleBuffer) -> Tile {
        let storage = Arc::new(TileStorage::new(rect, samples));
        self.state
            .lock()
            .admit(raster, rect, Arc::clone(&storage));
        Tile::from_storage(raster.clone(), rect, storage, false)
    }

    /// Try to cache the storage behind `tile`.
    ///
    /// Returns true if the tile was admitted. Pass-through views are not
    /// cacheable.
    pub fn store(&self, tile: &Tile) -> bool {
        if !tile.is_direct() {
            return false;
        }
        self.state
            .lock()
            .admit(tile.raster(), tile.rect(), Arc::clone(tile.storage()))
    }

    /// Evict least recently used entries down to the eviction target.
    pub fn evict(&self) {
        self.state.lock().evict();
    }

    /// Remove one entry. Returns true if it existed.
    pub fn release(&self, raster: &Raster, rect: &Rectangle) -> bool {
        self.state.lock().remove(raster.id(), rect).is_some()
    }

    /// Remove every entry of `raster`. Returns the number removed.
    pub fn release_raster(&self, raster: &Raster) -> usize {
        let mut state = self.state.lock();
        match state.rasters.remove(&raster.id()) {
            Some(slot) => {
                let freed: usize = slot.entries.iter().map(|e| e.size).sum();
                state.current_memory -= freed;
                slot.entries.len()
            }
            None => 0,
        }
    }

    /// Remove all entries.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.rasters.clear();
        state.current_memory = 0;
    }

    /// Replace the limits and evict if usage exceeds the new threshold.
    pub fn configure(&self, config: CacheConfig) {
        let mut state = self.state.lock();
        state.config = config;
        if state.current_memory as f64 > state.config.admission_threshold() {
            state.evict();
        }
    }

    pub fn config(&self) -> CacheConfig {
        self.state.lock().config
    }

    /// Bytes currently held.
    pub fn current_memory(&self) -> usize {
        self.state.lock().current_memory
    }

    pub fn entry_count(&self) -> usize {
        self.state.lock().entry_count()
    }

    /// Total number of hits on the entry, if cached.
    pub fn access_count(&self, raster: &Raster, rect: &Rectangle) -> Option<u64> {
        self.state
            .lock()
            .rasters
            .get(&raster.id())
            .and_then(|slot| slot.entries.iter().find(|e| e.rect == *rect))
            .map(|e| e.access_count)
    }

    /// Snapshot of counters and usage.
    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: state.counters.hits,
            misses: state.counters.misses,
            insertions: state.counters.insertions,
            rejections: state.counters.rejections,
            evictions: state.counters.evictions,
            entry_count: state.entry_count(),
            current_memory: state.current_memory,
            capacity: state.config.capacity,
        }
    }
}

impl Default for TileCache {
    fn default() -> Self {
        Self::new(CacheConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::DataType;

    /// A UInt8 buffer of `size` bytes laid out as one row.
    fn bytes(size: usize) -> (Rectangle, SampleBuffer) {
        (
            Rectangle::new(0, 0, size as i32, 1),
            SampleBuffer::zeroed(DataType::UInt8, size),
        )
    }

    fn raster() -> Raster {
        Raster::new("bytes", 10_000, 10, DataType::UInt8)
    }

    #[test]
    fn test_insert_and_lookup() {
        let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
        let r = raster();
        let (rect, buf) = bytes(100);
        let tile = cache.insert(&r, rect, buf);
        assert!(!tile.is_target());
        assert_eq!(cache.current_memory(), 100);

        let hit = cache.lookup(&r, &rect).unwrap();
        assert_eq!(hit.rect(), rect);
        assert!(Arc::ptr_eq(hit.storage(), tile.storage()));
        assert_eq!(cache.access_count(&r, &rect), Some(1));
        assert!(cache.lookup(&r, &Rectangle::new(0, 1, 100, 1)).is_none());

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.insertions, 1);
    }

    #[test]
    fn test_capacity_law() {
        let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
        let r = raster();

        let first = Rectangle::new(0, 0, 800, 1);
        cache.insert(&r, first, SampleBuffer::zeroed(DataType::UInt8, 800));
        assert_eq!(cache.current_memory(), 800);

        let second = Rectangle::new(0, 1, 300, 1);
        cache.insert(&r, second, SampleBuffer::zeroed(DataType::UInt8, 300));
        assert!(cache.current_memory() <= 1000);
        assert!(cache.contains(&r, &second));
        assert!(!cache.contains(&r, &first));
        assert_eq!(cache.current_memory(), 300);
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_too_small_not_cached() {
        let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
        let r = raster();
        let (rect, buf) = bytes(5);
        let tile = cache.insert(&r, rect, buf);
        assert_eq!(tile.byte_size(), 5);
        assert_eq!(cache.current_memory(), 0);
        assert!(cache.lookup(&r, &rect).is_none());
    }

    #[test]
    fn test_oversized_tile_rejected() {
        let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
        let r = raster();
        let (rect, buf) = bytes(1200);
        let tile = cache.insert(&r, rect, buf);
        assert_eq!(tile.rect(), rect);
        assert_eq!(cache.current_memory(), 0);
        assert_eq!(cache.stats().rejections, 1);
    }

    #[test]
    fn test_lru_order_respects_lookups() {
        let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
        let r = raster();
        let a = Rectangle::new(0, 0, 300, 1);
        let b = Rectangle::new(0, 1, 300, 1);
        cache.insert(&r, a, SampleBuffer::zeroed(DataType::UInt8, 300));
        cache.insert(&r, b, SampleBuffer::zeroed(DataType::UInt8, 300));
        // touch `a` so `b` becomes the oldest
        assert!(cache.lookup(&r, &a).is_some());

        let c = Rectangle::new(0, 2, 300, 1);
        cache.insert(&r, c, SampleBuffer::zeroed(DataType::UInt8, 300));
        assert!(cache.contains(&r, &a));
        assert!(!cache.contains(&r, &b));
        assert!(cache.contains(&r, &c));
    }

    #[test]
    fn test_reinsert_replaces_entry() {
        let cache = TileCache::new(CacheConfig::new(1000, 0.75, 10));
        let r = raster();
        let (rect, buf) = bytes(100);
        cache.insert(&r, rect, buf.clone());
        cache.insert(&r, rect, buf);
        assert_eq!(cache.current_memory(), 100);
        assert_eq!(cache.entry_count(), 1);
    }

    #[test]
    fn test_store_target_tile() {
        let cache = TileCache::new(CacheConfig::new(10_000, 0.75, 10));
        let r = Raster::new("store", 64, 64, DataType::Float32);
        let tile = Tile::allocate(&r, Rectangle::new(0, 0, 16, 16));
        assert!(cache.store(&tile));
        assert_eq!(cache.current_memory(), 1024);

        let view = tile.view(Rectangle::new(0, 0, 4, 4));
        assert!(!cache.store(&view));
    }

    #[test]
    fn test_release_and_clear() {
        let cache = TileCache::new(CacheConfig::new(10_000, 0.75, 10));
        let r = raster();
        let a = Rectangle::new(0, 0, 100, 1);
        let b = Rectangle::new(0, 1, 100, 1);
        cache.insert(&r, a, SampleBuffer::zeroed(DataType::UInt8, 100));
        cache.insert(&r, b, SampleBuffer::zeroed(DataType::UInt8, 100));

        assert!(cache.release(&r, &a));
        assert!(!cache.release(&r, &a));
        assert_eq!(cache.current_memory(), 100);

        assert_eq!(cache.release_raster(&r), 1);
        assert_eq!(cache.current_memory(), 0);

        cache.insert(&r, a, SampleBuffer::zeroed(DataType::UInt8, 100));
        cache.clear();
        assert_eq!(cache.entry_count(), 0);
        assert_eq!(cache.current_memory(), 0);
    }

    #[test]
    fn test_unreachable_rasters_purged_on_evict() {
        let cache = TileCache::new(CacheConfig::new(10_000, 0.75, 10));
        let r = raster();
        cache.insert(&r, Rectangle::new(0, 0, 100, 1), SampleBuffer::zeroed(DataType::UInt8, 100));
        drop(r);
        cache.evict();
        assert_eq!(cache.current_memory(), 0);
        assert_eq!(cache.entry_count(), 0);
    }

    #[test]
    fn test_configure_shrinks_cache() {
        let cache = TileCache::new(CacheConfig::new(10_000, 0.75, 10));
        let r = raster();
        for row in 0..5 {
            cache.insert(
                &r,
                Rectangle::new(0, row, 1000, 1),
                SampleBuffer::zeroed(DataType::UInt8, 1000),
            );
        }
        assert_eq!(cache.current_memory(), 5000);

        cache.configure(CacheConfig::new(2000, 0.75, 10));
        assert!(cache.current_memory() <= 1125);
        // the newest entry survives
        assert!(cache.contains(&r, &Rectangle::new(0, 4, 1000, 1)));
    }
}
