//! Traversal orders for bulk runs.

use std::fmt;

/// Order in which a bulk run submits `(raster, tile_x, tile_y)` work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ExecutionOrder {
    /// For each tile row, for each raster, for each tile column.
    #[default]
    RowRasterColumn,
    /// For each raster, for each tile row, for each tile column.
    RasterRowColumn,
    /// For each tile row and column, all rasters in one work item.
    ///
    /// Suited to stack operators: the first raster triggers the joint
    /// computation and the rest are cache hits.
    RowColumnStackSync,
    /// Row-raster-column on the calling thread, one tile at a time.
    SynchronousPull,
}

impl ExecutionOrder {
    /// All orders, for parsing and help output.
    pub const ALL: [ExecutionOrder; 4] = [
        ExecutionOrder::RowRasterColumn,
        ExecutionOrder::RasterRowColumn,
        ExecutionOrder::RowColumnStackSync,
        ExecutionOrder::SynchronousPull,
    ];

    /// Kebab-case name used in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ExecutionOrder::RowRasterColumn => "row-raster-column",
            ExecutionOrder::RasterRowColumn => "raster-row-column",
            ExecutionOrder::RowColumnStackSync => "row-column-stack-sync",
            ExecutionOrder::SynchronousPull => "synchronous-pull",
        }
    }

    /// Parse a name as produced by [`name`](Self::name), case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|order| order.name().eq_ignore_ascii_case(name))
    }

    /// Returns true if work runs on the calling thread.
    pub fn is_synchronous(&self) -> bool {
        matches!(self, ExecutionOrder::SynchronousPull)
    }
}

impl fmt::Display for ExecutionOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One unit of submitted work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WorkItem {
    pub tile_x: i32,
    pub tile_y: i32,
    /// Index into the run's target rasters.
    pub raster: usize,
    /// Compute every raster at this index, starting with `raster`.
    pub whole_stack: bool,
}

impl WorkItem {
    fn single(raster: usize, tile_x: i32, tile_y: i32) -> Self {
        Self {
            tile_x,
            tile_y,
            raster,
            whole_stack: false,
        }
    }
}

/// Work items of a run over a `tiles_x × tiles_y` grid and `rasters` targets.
pub(crate) fn work_items(
    order: ExecutionOrder,
    tiles_x: i32,
    tiles_y: i32,
    rasters: usize,
) -> Vec<WorkItem> {
    let mut items = Vec::new();
    match order {
        ExecutionOrder::RowRasterColumn | ExecutionOrder::SynchronousPull => {
            for ty in 0..tiles_y {
                for r in 0..rasters {
                    for tx in 0..tiles_x {
                        items.push(WorkItem::single(r, tx, ty));
                    }
                }
            }
        }
        ExecutionOrder::RasterRowColumn => {
            for r in 0..rasters {
                for ty in 0..tiles_y {
                    for tx in 0..tiles_x {
                        items.push(WorkItem::single(r, tx, ty));
                    }
                }
            }
        }
        ExecutionOrder::RowColumnStackSync => {
            if rasters > 0 {
                for ty in 0..tiles_y {
                    for tx in 0..tiles_x {
                        items.push(WorkItem {
                            tile_x: tx,
                            tile_y: ty,
                            raster: 0,
                            whole_stack: true,
                        });
                    }
                }
            }
        }
    }
    items
}
