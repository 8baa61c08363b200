//! Fixed-size tilings of a raster extent.

use super::rect::Rectangle;

/// Step between candidate tile sizes.
pub const TILE_SIZE_STEP: i32 = 64;

/// Smallest preferred tile size for large extents.
pub const MIN_TILE_SIZE: i32 = 4 * TILE_SIZE_STEP;

/// Largest preferred tile size; smaller extents become a single tile.
pub const MAX_TILE_SIZE: i32 = 10 * TILE_SIZE_STEP;

/// Granularity used when no candidate divides the extent exactly.
pub const DEFAULT_GRANULARITY: i32 = 4;

/// Regular tiling of a `width × height` extent.
///
/// Tiles at the right and bottom edges are clipped to the extent, so
/// `tile_rect` never reaches outside the raster.
///
/// # Example
///
/// ```
/// use rasterflow::raster::{Rectangle, TileGrid};
///
/// let grid = TileGrid::new(1000, 600, 256, 256);
/// assert_eq!(grid.tile_count_x(), 4);
/// assert_eq!(grid.tile_count_y(), 3);
/// assert_eq!(grid.tile_rect(3, 2), Rectangle::new(768, 512, 232, 88));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileGrid {
    width: i32,
    height: i32,
    tile_width: i32,
    tile_height: i32,
}

impl TileGrid {
    /// Create a grid. Tile dimensions are clamped to at least one sample.
    pub fn new(width: i32, height: i32, tile_width: i32, tile_height: i32) -> Self {
        Self {
            width: width.max(0),
            height: height.max(0),
            tile_width: tile_width.max(1),
            tile_height: tile_height.max(1),
        }
    }

    /// Grid with the preferred tile size for the extent.
    pub fn preferred(width: i32, height: i32) -> Self {
        let (tw, th) = preferred_tile_size(width, height, DEFAULT_GRANULARITY);
        Self::new(width, height, tw, th)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn tile_width(&self) -> i32 {
        self.tile_width
    }

    pub fn tile_height(&self) -> i32 {
        self.tile_height
    }

    pub fn tile_count_x(&self) -> i32 {
        (self.width + self.tile_width - 1) / self.tile_width
    }

    pub fn tile_count_y(&self) -> i32 {
        (self.height + self.tile_height - 1) / self.tile_height
    }

    /// Total number of grid indices.
    pub fn tile_count(&self) -> usize {
        self.tile_count_x() as usize * self.tile_count_y() as usize
    }

    pub fn bounds(&self) -> Rectangle {
        Rectangle::of_size(self.width, self.height)
    }

    /// Rectangle of grid index `(tile_x, tile_y)`, clipped to the extent.
    pub fn tile_rect(&self, tile_x: i32, tile_y: i32) -> Rectangle {
        let x = tile_x * self.tile_width;
        let y = tile_y * self.tile_height;
        Rectangle::new(
            x,
            y,
            self.tile_width.min(self.width - x),
            self.tile_height.min(self.height - y),
        )
    }

    /// Grid index containing sample `(x, y)`.
    pub fn tile_index_of(&self, x: i32, y: i32) -> (i32, i32) {
        (x.div_euclid(self.tile_width), y.div_euclid(self.tile_height))
    }

    /// Returns true if `(tile_x, tile_y)` is a valid grid index.
    pub fn contains_index(&self, tile_x: i32, tile_y: i32) -> bool {
        tile_x >= 0 && tile_y >= 0 && tile_x < self.tile_count_x() && tile_y < self.tile_count_y()
    }

    /// Returns true if `rect` is exactly one (clipped) grid tile.
    pub fn is_tile_rect(&self, rect: &Rectangle) -> bool {
        let (tx, ty) = self.tile_index_of(rect.x, rect.y);
        self.contains_index(tx, ty) && self.tile_rect(tx, ty) == *rect
    }

    /// Grid indices overlapping `rect`, row by row.
    pub fn tiles_covering(&self, rect: &Rectangle) -> Vec<(i32, i32)> {
        let Some(clipped) = rect.intersection(&self.bounds()) else {
            return Vec::new();
        };
        let (tx0, ty0) = self.tile_index_of(clipped.x, clipped.y);
        let (tx1, ty1) = self.tile_index_of(clipped.max_x(), clipped.max_y());
        let mut indices = Vec::with_capacity(((tx1 - tx0 + 1) * (ty1 - ty0 + 1)) as usize);
        for ty in ty0..=ty1 {
            for tx in tx0..=tx1 {
                indices.push((tx, ty));
            }
        }
        indices
    }
}

/// Preferred `(tile_width, tile_height)` for an extent.
pub fn preferred_tile_size(width: i32, height: i32, granularity: i32) -> (i32, i32) {
    (
        preferred_axis_size(width, granularity),
        preferred_axis_size(height, granularity),
    )
}

fn preferred_axis_size(extent: i32, granularity: i32) -> i32 {
    if extent <= MAX_TILE_SIZE {
        return extent.max(1);
    }
    let mut u = MAX_TILE_SIZE;
    while u >= MIN_TILE_SIZE {
        if extent % u == 0 {
            return u;
        }
        u -= TILE_SIZE_STEP;
    }

    // No exact divisor: pick the size with the least padding.
    let step = granularity.max(1);
    let mut best = MAX_TILE_SIZE;
    let mut min_delta = i32::MAX;
    let mut u = MAX_TILE_SIZE;
    while u >= MIN_TILE_SIZE {
        let n = (extent + u - 1) / u;
        let delta = n * u - extent;
        if delta == 0 {
            return u;
        }
        if delta < min_delta {
            min_delta = delta;
            best = u;
        }
        u -= step;
    }
    best
}
