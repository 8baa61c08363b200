//! The operator contract.
//!
//! An [`Operator`] produces one or more target rasters tile by tile. It
//! declares up front which of the two computation styles it supports:
//!
//! - **per tile**: [`Operator::compute_tile`] fills one tile of one raster
//! - **stack**: [`Operator::compute_tile_stack`] fills the tiles of all its
//!   rasters for the same rectangle in one pass
//!
//! When both are declared the per-tile path is used.
//!
//! # Example
//!
//! ```
//! use rasterflow::error::OperatorError;
//! use rasterflow::operator::{Capabilities, ComputeContext, Operator, OperatorDescriptor};
//! use rasterflow::raster::Raster;
//! use rasterflow::tile::Tile;
//!
//! struct Constant(f64);
//!
//! impl Operator for Constant {
//!     fn descriptor(&self) -> OperatorDescriptor {
//!         OperatorDescriptor::new("ConstantOp").with_alias("Constant")
//!     }
//!
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::PER_TILE
//!     }
//!
//!     fn compute_tile(
//!         &self,
//!         ctx: &ComputeContext<'_>,
//!         _raster: &Raster,
//!         tile: &mut Tile,
//!     ) -> Result<(), OperatorError> {
//!         for (x, y) in tile.positions() {
//!             tile.set_sample(x, y, self.0)?;
//!         }
//!         ctx.check_for_cancellation()
//!     }
//! }
//! ```

mod compute;
mod descriptor;
mod stack;

pub use compute::ComputeContext;
pub(crate) use compute::source_wait;
pub use descriptor::{OperatorDescriptor, ParameterSpec};
pub use stack::TileStack;

use crate::error::OperatorError;
use crate::raster::{Raster, Rectangle};
use crate::tile::Tile;

/// Computation styles an operator implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// Implements [`Operator::compute_tile`].
    pub per_tile: bool,
    /// Implements [`Operator::compute_tile_stack`].
    pub stack: bool,
}

impl Capabilities {
    pub const PER_TILE: Capabilities = Capabilities {
        per_tile: true,
        stack: false,
    };

    pub const STACK: Capabilities = Capabilities {
        per_tile: false,
        stack: true,
    };

    pub const BOTH: Capabilities = Capabilities {
        per_tile: true,
        stack: true,
    };

    /// Returns true if at least one compute method is available.
    pub fn can_compute(&self) -> bool {
        self.per_tile || self.stack
    }

    /// Returns true if tiles are computed jointly for all rasters.
    pub fn uses_stack(&self) -> bool {
        self.stack && !self.per_tile
    }
}

/// A tile-producing raster operator.
///
/// Implementations must be thread-safe: tiles of the same operator are
/// computed concurrently. [`capabilities`](Operator::capabilities) is read
/// once when the operator is bound and must not change afterwards.
pub trait Operator: Send + Sync {
    /// Schema of the operator.
    ///
    /// The default names the operator after its Rust type.
    fn descriptor(&self) -> OperatorDescriptor {
        OperatorDescriptor::for_type::<Self>()
    }

    /// Which compute methods the operator implements.
    fn capabilities(&self) -> Capabilities;

    /// Fill `tile`, a target tile of `raster`.
    ///
    /// # Arguments
    ///
    /// * `ctx` - Access to source tiles and cancellation
    /// * `raster` - The target raster the tile belongs to
    /// * `tile` - Zero-initialized target tile to fill
    fn compute_tile(
        &self,
        ctx: &ComputeContext<'_>,
        raster: &Raster,
        tile: &mut Tile,
    ) -> Result<(), OperatorError> {
        let _ = (ctx, tile);
        Err(OperatorError::failed(format!(
            "compute_tile not implemented for raster '{}'",
            raster.name()
        )))
    }

    /// Fill one target tile per raster of the operator, all covering `rect`.
    fn compute_tile_stack(
        &self,
        ctx: &ComputeContext<'_>,
        stack: &mut TileStack,
        rect: Rectangle,
    ) -> Result<(), OperatorError> {
        let _ = (ctx, stack);
        Err(OperatorError::failed(format!(
            "compute_tile_stack not implemented for {}",
            rect
        )))
    }

    /// One-shot hook run before the first tile of a bulk run or pull.
    ///
    /// Runs at most once per bound context (retried if it fails).
    fn execute(&self, ctx: &ComputeContext<'_>) -> Result<(), OperatorError> {
        let _ = ctx;
        Ok(())
    }

    /// Release resources; called once when the operator is unbound.
    fn dispose(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capability_dispatch() {
        assert!(!Capabilities::PER_TILE.uses_stack());
        assert!(Capabilities::STACK.uses_stack());
        // per-tile wins when both are declared
        assert!(!Capabilities::BOTH.uses_stack());
        assert!(!Capabilities::default().can_compute());
    }
}
