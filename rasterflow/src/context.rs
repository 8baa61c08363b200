//! Binding of an operator to its target rasters.
//!
//! An [`OperatorContext`] is created by [`Engine::bind`](crate::engine::Engine::bind).
//! It reads the operator's capabilities once, builds one
//! [`TileComputationNode`] per target raster and, for stack-computing
//! operators, one [`TileLockTable`] shared by all of them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::EngineInner;
use crate::error::{EngineError, OperatorError};
use crate::node::{TileComputationNode, TileLockTable};
use crate::operator::{Capabilities, ComputeContext, Operator, OperatorDescriptor};
use crate::raster::{Raster, RasterId, Rectangle, TileGrid};
use crate::tile::Tile;

/// Global counter for context identifiers.
static CONTEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// A bound operator: its targets, nodes and lifecycle state.
pub struct OperatorContext {
    id: String,
    operator: Arc<dyn Operator>,
    descriptor: OperatorDescriptor,
    capabilities: Capabilities,
    targets: Vec<Raster>,
    grid: TileGrid,
    nodes: HashMap<RasterId, TileComputationNode>,
    lock_table: Option<Arc<TileLockTable>>,
    cancellation: CancellationToken,
    executed: AtomicBool,
    execute_lock: Mutex<()>,
    disposed: AtomicBool,
}

impl OperatorContext {
    /// Validate the binding and build the nodes.
    ///
    /// # Errors
    ///
    /// [`EngineError::InvalidBinding`] if there are no targets, a target is
    /// listed twice, targets differ in size, or the operator declares no
    /// compute method.
    pub(crate) fn new(
        operator: Arc<dyn Operator>,
        targets: Vec<Raster>,
        tile_size: Option<(i32, i32)>,
    ) -> Result<Self, EngineError> {
        let descriptor = operator.descriptor();
        let capabilities = operator.capabilities();

        let Some(first) = targets.first() else {
            return Err(EngineError::InvalidBinding(format!(
                "operator '{}' has no target rasters",
                descriptor.label()
            )));
        };
        if !capabilities.can_compute() {
            return Err(EngineError::InvalidBinding(format!(
                "operator '{}' declares no compute method",
                descriptor.label()
            )));
        }
        let (width, height) = (first.width(), first.height());
        for (i, raster) in targets.iter().enumerate() {
            if raster.width() != width || raster.height() != height {
                return Err(EngineError::InvalidBinding(format!(
                    "raster '{}' is {}x{}, expected {}x{}",
                    raster.name(),
                    raster.width(),
                    raster.height(),
                    width,
                    height
                )));
            }
            if targets[..i].contains(raster) {
                return Err(EngineError::InvalidBinding(format!(
                    "raster '{}' listed twice",
                    raster.name()
                )));
            }
        }

        let grid = match tile_size {
            Some((tw, th)) => TileGrid::new(width, height, tw, th),
            None => TileGrid::preferred(width, height),
        };
        let lock_table = capabilities
            .uses_stack()
            .then(|| Arc::new(TileLockTable::new(&grid)));
        let nodes = targets
            .iter()
            .map(|r| {
                (
                    r.id(),
                    TileComputationNode::new(r.clone(), grid, lock_table.clone()),
                )
            })
            .collect();

        let id = format!(
            "{}${:x}",
            descriptor.label(),
            CONTEXT_COUNTER.fetch_add(1, Ordering::Relaxed)
        );

        info!(
            context = %id,
            targets = targets.len(),
            tile_width = grid.tile_width(),
            tile_height = grid.tile_height(),
            stack = capabilities.uses_stack(),
            "Bound operator"
        );

        Ok(Self {
            id,
            operator,
            descriptor,
            capabilities,
            targets,
            grid,
            nodes,
            lock_table,
            cancellation: CancellationToken::new(),
            executed: AtomicBool::new(false),
            execute_lock: Mutex::new(()),
            disposed: AtomicBool::new(false),
        })
    }

    /// Identifier `<alias>$<hex>`, unique per process.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn descriptor(&self) -> &OperatorDescriptor {
        &self.descriptor
    }

    /// Capabilities as read at bind time.
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn targets(&self) -> &[Raster] {
        &self.targets
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn node(&self, raster: &Raster) -> Option<&TileComputationNode> {
        self.nodes.get(&raster.id())
    }

    pub fn lock_table(&self) -> Option<&Arc<TileLockTable>> {
        self.lock_table.as_ref()
    }

    pub(crate) fn operator(&self) -> &dyn Operator {
        self.operator.as_ref()
    }

    /// Stop all future computations of this operator.
    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Returns true once the one-shot execute hook has succeeded.
    pub fn is_executed(&self) -> bool {
        self.executed.load(Ordering::Acquire)
    }

    /// Compute (or fetch) grid tile `rect` of `raster`.
    pub(crate) fn compute_tile(
        &self,
        engine: &EngineInner,
        raster: &Raster,
        rect: Rectangle,
        run: Option<&CancellationToken>,
    ) -> Result<Tile, EngineError> {
        let node = self
            .node(raster)
            .ok_or_else(|| EngineError::UnboundRaster(raster.name().to_string()))?;
        node.compute_tile(engine, self, rect, run)
    }

    /// Run [`Operator::execute`] unless it already succeeded.
    pub(crate) fn ensure_executed(
        &self,
        engine: &EngineInner,
        run: Option<&CancellationToken>,
    ) -> Result<(), EngineError> {
        if self.executed.load(Ordering::Acquire) {
            return Ok(());
        }
        let _guard = self.execute_lock.lock();
        if self.executed.load(Ordering::Acquire) {
            return Ok(());
        }

        let ctx = ComputeContext::new(engine, self, run);
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        self.operator.execute(&ctx).map_err(|e| {
            let rect = Rectangle::of_size(self.grid.width(), self.grid.height());
            self.wrap_error(&self.targets[0], rect, e)
        })?;
        self.executed.store(true, Ordering::Release);
        debug!(context = %self.id, "Executed operator");
        Ok(())
    }

    /// Attach operator, raster and rectangle to an operator failure.
    pub(crate) fn wrap_error(&self, raster: &Raster, rect: Rectangle, err: OperatorError) -> EngineError {
        match err {
            OperatorError::Cancelled => EngineError::Cancelled,
            source => EngineError::Operator {
                operator: self.id.clone(),
                raster: raster.name().to_string(),
                rect,
                source,
            },
        }
    }

    /// Cancel outstanding work and dispose the operator once.
    pub(crate) fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.cancellation.cancel();
        self.operator.dispose();
        info!(context = %self.id, "Disposed operator");
    }
}

impl std::fmt::Debug for OperatorContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperatorContext")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("targets", &self.targets.len())
            .field("grid", &self.grid)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::DataType;

    struct Noop(Capabilities);

    impl Operator for Noop {
        fn descriptor(&self) -> OperatorDescriptor {
            OperatorDescriptor::new("NoopOp").with_alias("Noop")
        }

        fn capabilities(&self) -> Capabilities {
            self.0
        }
    }

    fn raster(name: &str) -> Raster {
        Raster::new(name, 100, 80, DataType::Float32)
    }

    #[test]
    fn test_context_id_uses_alias() {
        let ctx =
            OperatorContext::new(Arc::new(Noop(Capabilities::PER_TILE)), vec![raster("a")], None)
                .unwrap();
        assert!(ctx.id().starts_with("Noop$"));
        assert!(ctx.lock_table().is_none());
        assert_eq!(ctx.grid().tile_count(), 1);
    }

    #[test]
    fn test_stack_context_shares_lock_table() {
        let ctx = OperatorContext::new(
            Arc::new(Noop(Capabilities::STACK)),
            vec![raster("a"), raster("b")],
            Some((50, 40)),
        )
        .unwrap();
        let table = ctx.lock_table().unwrap();
        assert_eq!(table.len(), 4);
        assert!(ctx.targets().iter().all(|r| ctx.node(r).unwrap().is_stack_node()));
    }

    #[test]
    fn test_rejects_empty_targets() {
        let err = OperatorContext::new(Arc::new(Noop(Capabilities::PER_TILE)), vec![], None)
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidBinding(_)));
    }

    #[test]
    fn test_rejects_missing_compute_method() {
        let err = OperatorContext::new(
            Arc::new(Noop(Capabilities::default())),
            vec![raster("a")],
            None,
        )
        .unwrap_err();
        assert!(matches!(err, EngineError::InvalidBinding(_)));
    }

    #[test]
    fn test_rejects_mismatched_sizes_and_duplicates() {
        let a = raster("a");
        let small = Raster::new("small", 10, 10, DataType::Float32);
        let op = Arc::new(Noop(Capabilities::STACK));
        assert!(OperatorContext::new(op.clone(), vec![a.clone(), small], None).is_err());
        assert!(OperatorContext::new(op, vec![a.clone(), a], None).is_err());
    }

    #[test]
    fn test_dispose_cancels_once() {
        let ctx =
            OperatorContext::new(Arc::new(Noop(Capabilities::PER_TILE)), vec![raster("a")], None)
                .unwrap();
        ctx.dispose();
        ctx.dispose();
        assert!(ctx.is_disposed());
        assert!(ctx.is_cancelled());
    }
}
