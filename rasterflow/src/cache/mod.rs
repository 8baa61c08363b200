//! In-memory tile cache.
//!
//! Computed tiles are kept in a [`TileCache`] keyed by raster and rectangle.
//! The cache enforces a soft memory bound at insert time:
//!
//! - tiles of at most `minimum_tile_size` bytes are never cached
//! - an insert beyond `capacity * load_factor` evicts least recently used
//!   entries down to `capacity * eviction_target`
//! - a tile that still does not fit under `capacity` is returned uncached
//!
//! Rejection is never an error; callers always get a usable tile back.

mod config;
mod memory;
mod stats;

pub use config::{CacheConfig, DEFAULT_CACHE_CAPACITY, DEFAULT_LOAD_FACTOR};
pub use memory::TileCache;
pub use stats::CacheStats;
