//! Tiles: typed sample buffers and the windows operators read and write.
//!
//! A [`Tile`] is a view over a rectangle of one raster backed by a shared
//! [`SampleBuffer`]. The cache, the computing node and every reader of a tile
//! share the same storage; only the node hands out writable (target) tiles.

mod border;
mod buffer;
mod view;

pub use border::BorderExtender;
pub use buffer::SampleBuffer;
pub use view::Tile;

pub(crate) use view::TileStorage;
