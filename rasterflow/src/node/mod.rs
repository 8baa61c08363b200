//! Lazy per-raster tile computation.
//!
//! Every target raster of an [`OperatorContext`] has one
//! [`TileComputationNode`]. Asked for a grid tile, the node serves it from
//! the cache or invokes the operator:
//!
//! ```text
//! compute_tile(rect)
//!   ├── cache hit ───────────────────────────────▶ read-only tile
//!   ├── per tile:  allocate ─▶ compute_tile ─▶ commit ─▶ store
//!   └── stack:     lock index ─▶ re-check cache ─▶ TileStack (all rasters)
//!                  ─▶ compute_tile_stack ─▶ commit + store all ─▶ unlock
//! ```
//!
//! Failed or cancelled computations leave nothing new in the cache.

mod locks;

pub use locks::TileLockTable;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::context::OperatorContext;
use crate::engine::EngineInner;
use crate::error::EngineError;
use crate::observer::TileComputationEvent;
use crate::operator::{source_wait, ComputeContext, TileStack};
use crate::raster::{Raster, Rectangle, TileGrid};
use crate::tile::{Tile, TileStorage};

/// Computes and caches the tiles of one target raster.
pub struct TileComputationNode {
    raster: Raster,
    grid: TileGrid,
    lock_table: Option<Arc<TileLockTable>>,
}

impl TileComputationNode {
    pub(crate) fn new(raster: Raster, grid: TileGrid, lock_table: Option<Arc<TileLockTable>>) -> Self {
        Self {
            raster,
            grid,
            lock_table,
        }
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    /// Returns true if this node shares a stack lock table.
    pub fn is_stack_node(&self) -> bool {
        self.lock_table.is_some()
    }

    /// Produce the grid tile `rect`, computing it if it is not cached.
    ///
    /// The returned tile is read-only.
    pub(crate) fn compute_tile(
        &self,
        engine: &EngineInner,
        context: &OperatorContext,
        rect: Rectangle,
        run: Option<&CancellationToken>,
    ) -> Result<Tile, EngineError> {
        debug_assert!(self.grid.is_tile_rect(&rect));

        if let Some(tile) = engine.cache().lookup(&self.raster, &rect) {
            trace!(raster = %self.raster, %rect, "Tile cache hit");
            return Ok(tile);
        }

        context.ensure_executed(engine, run)?;

        match &self.lock_table {
            Some(table) if context.capabilities().uses_stack() => {
                self.compute_stack(engine, context, table, rect, run)
            }
            _ => self.compute_single(engine, context, rect, run),
        }
    }

    fn compute_single(
        &self,
        engine: &EngineInner,
        context: &OperatorContext,
        rect: Rectangle,
        run: Option<&CancellationToken>,
    ) -> Result<Tile, EngineError> {
        let ctx = ComputeContext::new(engine, context, run);
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let mut tile = Tile::allocate(&self.raster, rect);
        let timer = ComputeTimer::start();
        context
            .operator()
            .compute_tile(&ctx, &self.raster, &mut tile)
            .map_err(|e| context.wrap_error(&self.raster, rect, e))?;
        let timing = timer.stop();

        tile.commit();
        let cached = engine.cache().store(&tile);
        self.notify(engine, context, &self.raster, rect, timing, false, cached);

        Ok(tile.to_read_only())
    }

    fn compute_stack(
        &self,
        engine: &EngineInner,
        context: &OperatorContext,
        table: &TileLockTable,
        rect: Rectangle,
        run: Option<&CancellationToken>,
    ) -> Result<Tile, EngineError> {
        let (tile_x, tile_y) = self.grid.tile_index_of(rect.x, rect.y);
        let _guard = table.lock(tile_x, tile_y).ok_or_else(|| EngineError::OutOfBounds {
            raster: self.raster.name().to_string(),
            rect,
        })?;

        // Another thread may have computed the stack while we waited.
        if let Some(tile) = engine.cache().lookup(&self.raster, &rect) {
            return Ok(tile);
        }

        let ctx = ComputeContext::new(engine, context, run);
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        // Cached siblings start from a private copy of their samples; tiles
        // already handed out are never written.
        let mut reused = 0usize;
        let tiles = context
            .targets()
            .iter()
            .map(|raster| {
                let tile = match engine.cache().lookup(raster, &rect) {
                    Some(cached) => {
                        reused += 1;
                        let samples = cached.with_raw_samples(|samples| samples.clone());
                        let storage = Arc::new(TileStorage::new(rect, samples));
                        Tile::from_storage(raster.clone(), rect, storage, true)
                    }
                    None => Tile::allocate(raster, rect),
                };
                (raster.clone(), tile)
            })
            .collect();
        let mut stack = TileStack::new(rect, tiles);

        let timer = ComputeTimer::start();
        if let Err(e) = context.operator().compute_tile_stack(&ctx, &mut stack, rect) {
            debug!(
                operator = %context.id(),
                %rect,
                reused,
                "Stack computation failed"
            );
            return Err(context.wrap_error(&self.raster, rect, e));
        }
        let timing = timer.stop();

        let mut own = None;
        for (raster, mut tile) in stack.into_tiles() {
            tile.commit();
            let cached = engine.cache().store(&tile);
            self.notify(engine, context, &raster, rect, timing, true, cached);
            if raster == self.raster {
                own = Some(tile.to_read_only());
            }
        }

        own.ok_or_else(|| EngineError::UnboundRaster(self.raster.name().to_string()))
    }

    #[allow(clippy::too_many_arguments)]
    fn notify(
        &self,
        engine: &EngineInner,
        context: &OperatorContext,
        raster: &Raster,
        rect: Rectangle,
        timing: ComputeTiming,
        stack: bool,
        cached: bool,
    ) {
        let Some(observer) = engine.observer() else {
            return;
        };
        let (tile_x, tile_y) = self.grid.tile_index_of(rect.x, rect.y);
        observer.on_tile_computed(&TileComputationEvent {
            operator_id: context.id().to_string(),
            raster: raster.clone(),
            tile_x,
            tile_y,
            rect,
            duration: timing.gross,
            net_duration: timing.net,
            stack,
            cached,
        });
    }
}

// =============================================================================
// Timing
// =============================================================================

/// Wall time of one operator invocation.
#[derive(Debug, Clone, Copy)]
struct ComputeTiming {
    gross: Duration,
    /// `gross` minus the time spent pulling source tiles.
    net: Duration,
}

struct ComputeTimer {
    started: Instant,
    waited: Duration,
}

impl ComputeTimer {
    fn start() -> Self {
        Self {
            started: Instant::now(),
            waited: source_wait(),
        }
    }

    fn stop(self) -> ComputeTiming {
        let gross = self.started.elapsed();
        let pulled = source_wait().saturating_sub(self.waited);
        ComputeTiming {
            gross,
            net: gross.saturating_sub(pulled),
        }
    }
}

impl std::fmt::Debug for TileComputationNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileComputationNode")
            .field("raster", &self.raster.to_string())
            .field("grid", &self.grid)
            .field("stack", &self.lock_table.is_some())
            .finish()
    }
}
