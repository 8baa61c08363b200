//! Raster identity and geometry.
//!
//! A [`Raster`] is the engine's handle for one output raster (typically one
//! band of a product). It carries exactly what the engine needs to size
//! buffers, convert samples and key the tile cache:
//!
//! - dimensions and [`DataType`]
//! - an optional [`Scaling`] between raw and geophysical values
//! - an optional no-data value and [`ValidMask`]
//! - a process-unique [`RasterId`]
//!
//! [`Rectangle`] and [`TileGrid`] describe sample windows and the fixed-size
//! tiling used for caching, locking and bulk scheduling.

mod grid;
mod handle;
mod rect;
mod types;

pub use grid::{preferred_tile_size, TileGrid, MAX_TILE_SIZE, MIN_TILE_SIZE, TILE_SIZE_STEP};
pub use handle::{Raster, RasterBuilder, RasterId, ValidMask};
pub use rect::Rectangle;
pub use types::{DataType, Scaling};

pub(crate) use handle::WeakRaster;
