//! Per-grid-index locks for joint stack computation.

use parking_lot::{Mutex, MutexGuard};

use crate::raster::TileGrid;

/// One mutex per grid index of a [`TileGrid`].
///
/// Shared by all rasters of a stack-computing operator context so that the
/// joint computation for one index runs at most once at a time.
pub struct TileLockTable {
    tile_count_x: i32,
    tile_count_y: i32,
    locks: Vec<Mutex<()>>,
}

impl TileLockTable {
    pub fn new(grid: &TileGrid) -> Self {
        let locks = (0..grid.tile_count()).map(|_| Mutex::new(())).collect();
        Self {
            tile_count_x: grid.tile_count_x(),
            tile_count_y: grid.tile_count_y(),
            locks,
        }
    }

    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Block until the lock of `(tile_x, tile_y)` is held.
    ///
    /// Returns `None` for indices outside the grid.
    pub fn lock(&self, tile_x: i32, tile_y: i32) -> Option<MutexGuard<'_, ()>> {
        if tile_x < 0 || tile_y < 0 || tile_x >= self.tile_count_x || tile_y >= self.tile_count_y {
            return None;
        }
        let index = (tile_y * self.tile_count_x + tile_x) as usize;
        Some(self.locks[index].lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_size_matches_grid() {
        let table = TileLockTable::new(&TileGrid::new(100, 50, 32, 32));
        assert_eq!(table.len(), 4 * 2);
    }

    #[test]
    fn test_out_of_grid_index() {
        let table = TileLockTable::new(&TileGrid::new(10, 10, 5, 5));
        assert!(table.lock(2, 0).is_none());
        assert!(table.lock(-1, 0).is_none());
        assert!(table.lock(1, 1).is_some());
    }

    #[test]
    fn test_distinct_indices_lock_independently() {
        let table = TileLockTable::new(&TileGrid::new(10, 10, 5, 5));
        let _a = table.lock(0, 0);
        let b = table.locks[1].try_lock();
        assert!(b.is_some());
        assert!(table.locks[0].try_lock().is_none());
    }
}
