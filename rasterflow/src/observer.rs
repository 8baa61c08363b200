//! Tile computation events.
//!
//! An [`Engine`](crate::engine::Engine) can carry one
//! [`TileComputationObserver`] which is told about every tile an operator
//! computes, after the tile has been committed and offered to the cache.
//! Observers run on the computing thread and must be cheap.

use std::time::Duration;

use crate::raster::{Raster, Rectangle};

/// One completed tile computation.
#[derive(Debug, Clone)]
pub struct TileComputationEvent {
    /// Identifier of the producing operator context.
    pub operator_id: String,
    pub raster: Raster,
    pub tile_x: i32,
    pub tile_y: i32,
    pub rect: Rectangle,
    /// Wall time of the operator invocation.
    pub duration: Duration,
    /// `duration` minus the time the operator spent waiting for source
    /// tiles, i.e. the operator's own work.
    pub net_duration: Duration,
    /// True if the tile came out of a joint stack computation.
    pub stack: bool,
    /// True if the cache admitted the tile.
    pub cached: bool,
}

/// Receives [`TileComputationEvent`]s.
pub trait TileComputationObserver: Send + Sync {
    fn on_tile_computed(&self, event: &TileComputationEvent);
}

/// Observer that logs each event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl TileComputationObserver for TracingObserver {
    fn on_tile_computed(&self, event: &TileComputationEvent) {
        tracing::debug!(
            operator = %event.operator_id,
            raster = %event.raster,
            tile_x = event.tile_x,
            tile_y = event.tile_y,
            duration_ms = event.duration.as_secs_f64() * 1000.0,
            net_ms = event.net_duration.as_secs_f64() * 1000.0,
            stack = event.stack,
            cached = event.cached,
            "Tile computed"
        );
    }
}
