//! Engine: cache, operator registry and public entry points.
//!
//! The [`Engine`] owns the tile cache and the map from raster to the
//! [`OperatorContext`] producing it. It offers the two ways of getting at
//! tiles:
//!
//! - **pull**: [`Engine::get_tile`] for any in-bounds rectangle, usable from
//!   any thread including operator code
//! - **bulk**: [`Engine::schedule_scene`] to materialize whole rasters with
//!   bounded parallelism
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use rasterflow::engine::Engine;
//! use rasterflow::error::OperatorError;
//! use rasterflow::operator::{Capabilities, ComputeContext, Operator};
//! use rasterflow::raster::{DataType, Raster, Rectangle};
//! use rasterflow::tile::Tile;
//!
//! struct Ramp;
//!
//! impl Operator for Ramp {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::PER_TILE
//!     }
//!
//!     fn compute_tile(
//!         &self,
//!         _ctx: &ComputeContext<'_>,
//!         _raster: &Raster,
//!         tile: &mut Tile,
//!     ) -> Result<(), OperatorError> {
//!         for (x, y) in tile.positions() {
//!             tile.set_sample(x, y, (x + y) as f64)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let engine = Engine::default();
//! let raster = Raster::new("ramp", 64, 64, DataType::Float32);
//! engine.bind(Arc::new(Ramp), vec![raster.clone()], Some((32, 32))).unwrap();
//!
//! let tile = engine.get_tile(&raster, Rectangle::new(30, 30, 4, 4)).unwrap();
//! assert_eq!(tile.sample_double(33, 31), 64.0);
//! ```

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheConfig, CacheStats, TileCache};
use crate::config::EngineConfig;
use crate::context::OperatorContext;
use crate::error::{EngineError, SchedulingError};
use crate::observer::TileComputationObserver;
use crate::operator::Operator;
use crate::raster::{Raster, RasterId, Rectangle};
use crate::scheduler::{SceneRequest, Scheduler};
use crate::tile::{BorderExtender, SampleBuffer, Tile, TileStorage};

/// Shared engine state.
pub(crate) struct EngineInner {
    config: EngineConfig,
    cache: TileCache,
    registry: DashMap<RasterId, Arc<OperatorContext>>,
    observer: RwLock<Option<Arc<dyn TileComputationObserver>>>,
}

impl EngineInner {
    pub(crate) fn cache(&self) -> &TileCache {
        &self.cache
    }

    pub(crate) fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub(crate) fn observer(&self) -> Option<Arc<dyn TileComputationObserver>> {
        self.observer.read().clone()
    }

    pub(crate) fn context_of(&self, raster: &Raster) -> Option<Arc<OperatorContext>> {
        self.registry.get(&raster.id()).map(|e| Arc::clone(e.value()))
    }

    /// Produce `rect` of `raster` on the calling thread.
    ///
    /// An exact grid tile comes straight from its node; a rectangle inside
    /// one grid tile is a view onto it; anything larger is assembled into a
    /// fresh, uncached tile.
    pub(crate) fn pull_tile(
        &self,
        raster: &Raster,
        rect: Rectangle,
        run: Option<&CancellationToken>,
    ) -> Result<Tile, EngineError> {
        let context = self
            .context_of(raster)
            .ok_or_else(|| EngineError::UnboundRaster(raster.name().to_string()))?;
        if !raster.bounds().contains_rect(&rect) {
            return Err(EngineError::OutOfBounds {
                raster: raster.name().to_string(),
                rect,
            });
        }

        let grid = context.grid();
        if grid.is_tile_rect(&rect) {
            return context.compute_tile(self, raster, rect, run);
        }

        let indices = grid.tiles_covering(&rect);
        if let &[(tile_x, tile_y)] = indices.as_slice() {
            let tile = context.compute_tile(self, raster, grid.tile_rect(tile_x, tile_y), run)?;
            return Ok(tile.view(rect));
        }

        let mut samples = SampleBuffer::zeroed(raster.data_type(), rect.area());
        for (tile_x, tile_y) in indices {
            let tile = context.compute_tile(self, raster, grid.tile_rect(tile_x, tile_y), run)?;
            let storage = tile.storage();
            if let Some(region) = storage.rect().intersection(&rect) {
                samples.copy_region(&rect, &storage.read(), &storage.rect(), &region);
            }
        }
        let storage = Arc::new(TileStorage::new(rect, samples));
        Ok(Tile::from_storage(raster.clone(), rect, storage, false))
    }

    /// Pull `rect` of `raster`, which may reach past the raster bounds.
    ///
    /// Rectangles inside the bounds behave like [`pull_tile`](Self::pull_tile).
    /// Otherwise the in-bounds samples the extender refers to are pulled once
    /// and copied into a fresh, uncached tile; the rest is filled.
    pub(crate) fn pull_tile_extended(
        &self,
        raster: &Raster,
        rect: Rectangle,
        extender: BorderExtender,
        run: Option<&CancellationToken>,
    ) -> Result<Tile, EngineError> {
        if self.context_of(raster).is_none() {
            return Err(EngineError::UnboundRaster(raster.name().to_string()));
        }
        let bounds = raster.bounds();
        if bounds.contains_rect(&rect) {
            return self.pull_tile(raster, rect, run);
        }

        let map_x = |x: i32| extender.map(x, bounds.x, bounds.width);
        let map_y = |y: i32| extender.map(y, bounds.y, bounds.height);
        let xs: Vec<i32> = (rect.x..rect.x + rect.width).filter_map(map_x).collect();
        let ys: Vec<i32> = (rect.y..rect.y + rect.height).filter_map(map_y).collect();

        let source = match (xs.iter().min(), xs.iter().max(), ys.iter().min(), ys.iter().max()) {
            (Some(&min_x), Some(&max_x), Some(&min_y), Some(&max_y)) => {
                let region = Rectangle::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1);
                Some(self.pull_tile(raster, region, run)?)
            }
            _ => None,
        };

        let mut tile = Tile::allocate(raster, rect);
        for (x, y) in rect_positions(rect) {
            match (&source, map_x(x), map_y(y)) {
                (Some(source), Some(sx), Some(sy)) => {
                    tile.set_raw_sample(x, y, source.raw_sample_double(sx, sy))?
                }
                _ => {
                    if let Some(value) = extender.fill_value() {
                        tile.set_sample(x, y, value)?;
                    }
                }
            }
        }
        debug!(raster = %raster, %rect, ?extender, "Extended source tile");
        Ok(tile.to_read_only())
    }
}

fn rect_positions(rect: Rectangle) -> impl Iterator<Item = (i32, i32)> {
    (rect.y..rect.y + rect.height)
        .flat_map(move |y| (rect.x..rect.x + rect.width).map(move |x| (x, y)))
}

/// The tile computation engine.
///
/// Cloning is cheap; clones share the cache and registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Create an engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        info!(
            cache_capacity = config.cache.capacity,
            load_factor = config.cache.load_factor,
            parallelism = config.scheduler.parallelism,
            order = %config.scheduler.order,
            "Created engine"
        );
        Self {
            inner: Arc::new(EngineInner {
                cache: TileCache::new(config.cache),
                config,
                registry: DashMap::new(),
                observer: RwLock::new(None),
            }),
        }
    }

    pub(crate) fn inner(&self) -> &Arc<EngineInner> {
        &self.inner
    }

    pub fn config(&self) -> &EngineConfig {
        self.inner.config()
    }

    // =========================================================================
    // Binding
    // =========================================================================

    /// Bind `operator` as the producer of `targets`.
    ///
    /// # Arguments
    ///
    /// * `operator` - The operator computing the rasters
    /// * `targets` - Target rasters, all of the same size
    /// * `tile_size` - Grid tile size; `None` picks the preferred size
    ///
    /// # Errors
    ///
    /// [`EngineError::AlreadyBound`] if a target already has a producer,
    /// [`EngineError::InvalidBinding`] for inconsistent requests.
    pub fn bind(
        &self,
        operator: Arc<dyn Operator>,
        targets: Vec<Raster>,
        tile_size: Option<(i32, i32)>,
    ) -> Result<Arc<OperatorContext>, EngineError> {
        let context = Arc::new(OperatorContext::new(operator, targets, tile_size)?);

        let mut registered: Vec<RasterId> = Vec::with_capacity(context.targets().len());
        for raster in context.targets() {
            let taken = match self.inner.registry.entry(raster.id()) {
                Entry::Occupied(_) => true,
                Entry::Vacant(slot) => {
                    slot.insert(Arc::clone(&context));
                    false
                }
            };
            if taken {
                for id in &registered {
                    self.inner.registry.remove(id);
                }
                return Err(EngineError::AlreadyBound(raster.name().to_string()));
            }
            registered.push(raster.id());
        }
        Ok(context)
    }

    /// Remove `context` from the registry, dispose its operator and drop
    /// its cached tiles.
    pub fn unbind(&self, context: &OperatorContext) {
        let mut released = 0;
        for raster in context.targets() {
            self.inner
                .registry
                .remove_if(&raster.id(), |_, bound| std::ptr::eq(bound.as_ref(), context));
            released += self.inner.cache.release_raster(raster);
        }
        context.dispose();
        debug!(context = %context.id(), released, "Unbound operator");
    }

    /// The context producing `raster`, if bound.
    pub fn context_of(&self, raster: &Raster) -> Option<Arc<OperatorContext>> {
        self.inner.context_of(raster)
    }

    /// Returns true if `raster` has a producer.
    pub fn is_bound(&self, raster: &Raster) -> bool {
        self.inner.registry.contains_key(&raster.id())
    }

    // =========================================================================
    // Pull
    // =========================================================================

    /// Read-only tile covering `rect` of `raster`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnboundRaster`], [`EngineError::OutOfBounds`], or the
    /// first operator failure along the pull chain.
    pub fn get_tile(&self, raster: &Raster, rect: Rectangle) -> Result<Tile, EngineError> {
        self.inner.pull_tile(raster, rect, None)
    }

    /// Samples of `rect`, filling whatever lies outside the raster bounds
    /// according to `extender`.
    ///
    /// The result is a read-only tile that is not cached unless `rect` lies
    /// inside the bounds.
    pub fn get_tile_extended(
        &self,
        raster: &Raster,
        rect: Rectangle,
        extender: BorderExtender,
    ) -> Result<Tile, EngineError> {
        self.inner.pull_tile_extended(raster, rect, extender, None)
    }

    /// Grid tile `(tile_x, tile_y)` of `raster`.
    pub fn get_grid_tile(&self, raster: &Raster, tile_x: i32, tile_y: i32) -> Result<Tile, EngineError> {
        let context = self
            .context_of(raster)
            .ok_or_else(|| EngineError::UnboundRaster(raster.name().to_string()))?;
        let grid = context.grid();
        if !grid.contains_index(tile_x, tile_y) {
            return Err(EngineError::OutOfBounds {
                raster: raster.name().to_string(),
                rect: Rectangle::new(
                    tile_x * grid.tile_width(),
                    tile_y * grid.tile_height(),
                    grid.tile_width(),
                    grid.tile_height(),
                ),
            });
        }
        context.compute_tile(&self.inner, raster, grid.tile_rect(tile_x, tile_y), None)
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Scheduler using the engine's default parallelism and order.
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self, self.inner.config.scheduler.clone())
    }

    /// Compute every tile of the requested rasters, blocking until done.
    ///
    /// # Errors
    ///
    /// The first failure of the run (after all in-flight work drained), or
    /// [`SchedulingError::Cancelled`].
    pub fn schedule_scene(&self, request: SceneRequest) -> Result<(), SchedulingError> {
        self.scheduler().run(request)
    }

    /// [`schedule_scene`](Self::schedule_scene) on Tokio's blocking pool.
    pub async fn schedule_scene_async(&self, request: SceneRequest) -> Result<(), SchedulingError> {
        let engine = self.clone();
        tokio::task::spawn_blocking(move || engine.schedule_scene(request))
            .await
            .map_err(|e| SchedulingError::ThreadPool(e.to_string()))?
    }

    // =========================================================================
    // Cache
    // =========================================================================

    pub fn cache(&self) -> &TileCache {
        &self.inner.cache
    }

    /// Set capacity, load factor and minimum tile size, keeping any explicit
    /// eviction target.
    pub fn configure_cache(&self, capacity: usize, load_factor: f64, minimum_tile_size: usize) {
        let config = CacheConfig {
            capacity,
            load_factor,
            minimum_tile_size,
            eviction_target: self.inner.cache.config().eviction_target,
        };
        self.inner.cache.configure(config);
    }

    pub fn configure_cache_with(&self, config: CacheConfig) {
        self.inner.cache.configure(config);
    }

    pub fn clear_cache(&self) {
        self.inner.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.inner.cache.stats()
    }

    // =========================================================================
    // Observer
    // =========================================================================

    pub fn set_observer(&self, observer: Arc<dyn TileComputationObserver>) {
        *self.inner.observer.write() = Some(observer);
    }

    pub fn clear_observer(&self) {
        *self.inner.observer.write() = None;
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperatorError;
    use crate::operator::{Capabilities, ComputeContext};
    use crate::raster::DataType;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Writes `x + 1000 * y` and counts invocations.
    #[derive(Default)]
    struct Coords {
        calls: AtomicUsize,
    }

    impl Operator for Coords {
        fn capabilities(&self) -> Capabilities {
            Capabilities::PER_TILE
        }

        fn compute_tile(
            &self,
            _ctx: &ComputeContext<'_>,
            _raster: &Raster,
            tile: &mut Tile,
        ) -> Result<(), OperatorError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            for (x, y) in tile.positions() {
                tile.set_sample(x, y, (x + 1000 * y) as f64)?;
            }
            Ok(())
        }
    }

    fn setup() -> (Engine, Arc<Coords>, Raster) {
        let engine = Engine::default();
        let op = Arc::new(Coords::default());
        let raster = Raster::new("coords", 100, 100, DataType::Float64);
        engine
            .bind(op.clone(), vec![raster.clone()], Some((40, 40)))
            .unwrap();
        (engine, op, raster)
    }

    #[test]
    fn test_grid_tile_pull_is_cached() {
        let (engine, op, raster) = setup();
        let rect = Rectangle::new(40, 0, 40, 40);
        let a = engine.get_tile(&raster, rect).unwrap();
        let b = engine.get_tile(&raster, rect).unwrap();
        assert_eq!(op.calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(a.storage(), b.storage()));
        assert_eq!(a.sample_double(45, 3), 3045.0);
    }

    #[test]
    fn test_sub_rect_is_view() {
        let (engine, op, raster) = setup();
        let tile = engine.get_tile(&raster, Rectangle::new(42, 42, 5, 5)).unwrap();
        assert!(!tile.is_direct());
        assert_eq!(tile.sample_double(46, 43), 43046.0);
        assert_eq!(op.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_spanning_rect_is_assembled() {
        let (engine, op, raster) = setup();
        let rect = Rectangle::new(30, 30, 20, 20);
        let tile = engine.get_tile(&raster, rect).unwrap();
        assert!(tile.is_direct());
        assert_eq!(op.calls.load(Ordering::SeqCst), 4);
        for (x, y) in tile.positions() {
            assert_eq!(tile.sample_double(x, y), (x + 1000 * y) as f64);
        }
        // the assembled copy itself is not cached
        assert!(!engine.cache().contains(&raster, &rect));
    }

    #[test]
    fn test_edge_tile() {
        let (engine, _op, raster) = setup();
        let tile = engine.get_grid_tile(&raster, 2, 2).unwrap();
        assert_eq!(tile.rect(), Rectangle::new(80, 80, 20, 20));
        assert!(engine.get_grid_tile(&raster, 3, 0).is_err());
    }

    #[test]
    fn test_out_of_bounds_and_unbound() {
        let (engine, _op, raster) = setup();
        assert!(matches!(
            engine.get_tile(&raster, Rectangle::new(90, 90, 20, 20)),
            Err(EngineError::OutOfBounds { .. })
        ));
        let other = Raster::new("other", 10, 10, DataType::UInt8);
        assert!(matches!(
            engine.get_tile(&other, Rectangle::new(0, 0, 1, 1)),
            Err(EngineError::UnboundRaster(_))
        ));
    }

    #[test]
    fn test_double_bind_rejected_and_rolled_back() {
        let (engine, _op, raster) = setup();
        let fresh = Raster::new("fresh", 100, 100, DataType::Float64);
        let err = engine
            .bind(
                Arc::new(Coords::default()),
                vec![fresh.clone(), raster],
                None,
            )
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyBound(_)));
        assert!(!engine.is_bound(&fresh));
    }

    #[test]
    fn test_unbind_releases_tiles() {
        let (engine, _op, raster) = setup();
        engine.get_grid_tile(&raster, 0, 0).unwrap();
        assert_eq!(engine.cache_stats().entry_count, 1);

        let context = engine.context_of(&raster).unwrap();
        engine.unbind(&context);
        assert!(!engine.is_bound(&raster));
        assert!(context.is_disposed());
        assert_eq!(engine.cache_stats().entry_count, 0);
    }

    #[test]
    fn test_configure_cache_keeps_eviction_target() {
        let engine = Engine::default();
        engine.configure_cache_with(CacheConfig::new(1000, 0.75, 0).with_eviction_target(0.1));
        engine.configure_cache(2000, 0.5, 16);
        let config = engine.cache().config();
        assert_eq!(config.capacity, 2000);
        assert_eq!(config.eviction_target, Some(0.1));
    }
}
