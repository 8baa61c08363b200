//! Target tiles of one joint stack computation.

use crate::raster::{Raster, Rectangle};
use crate::tile::Tile;

/// One target tile per raster of an operator context, all covering the
/// same rectangle.
///
/// Passed to [`Operator::compute_tile_stack`](super::Operator::compute_tile_stack);
/// the operator fills every tile in a single pass.
pub struct TileStack {
    rect: Rectangle,
    tiles: Vec<(Raster, Tile)>,
}

impl TileStack {
    pub(crate) fn new(rect: Rectangle, tiles: Vec<(Raster, Tile)>) -> Self {
        debug_assert!(tiles.iter().all(|(_, t)| t.rect() == rect));
        Self { rect, tiles }
    }

    /// Rectangle shared by all tiles.
    pub fn rect(&self) -> Rectangle {
        self.rect
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn contains(&self, raster: &Raster) -> bool {
        self.tiles.iter().any(|(r, _)| r == raster)
    }

    pub fn tile(&self, raster: &Raster) -> Option<&Tile> {
        self.tiles.iter().find(|(r, _)| r == raster).map(|(_, t)| t)
    }

    /// Writable target tile of `raster`.
    pub fn tile_mut(&mut self, raster: &Raster) -> Option<&mut Tile> {
        self.tiles
            .iter_mut()
            .find(|(r, _)| r == raster)
            .map(|(_, t)| t)
    }

    /// Writable target tile of the raster named `name`.
    pub fn tile_by_name_mut(&mut self, name: &str) -> Option<&mut Tile> {
        self.tiles
            .iter_mut()
            .find(|(r, _)| r.name() == name)
            .map(|(_, t)| t)
    }

    pub fn rasters(&self) -> impl Iterator<Item = &Raster> {
        self.tiles.iter().map(|(r, _)| r)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Raster, &Tile)> {
        self.tiles.iter().map(|(r, t)| (r, t))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&Raster, &mut Tile)> {
        self.tiles.iter_mut().map(|(r, t)| (&*r, t))
    }

    pub(crate) fn into_tiles(self) -> Vec<(Raster, Tile)> {
        self.tiles
    }
}
