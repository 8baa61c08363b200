//! Per-invocation context handed to operators.

use std::cell::Cell;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::context::OperatorContext;
use crate::engine::EngineInner;
use crate::error::OperatorError;
use crate::raster::{Raster, Rectangle, TileGrid};
use crate::tile::{BorderExtender, Tile};

thread_local! {
    /// Wall time this thread has spent inside source pulls.
    static SOURCE_WAIT: Cell<Duration> = const { Cell::new(Duration::ZERO) };
}

/// Running total of source pull time on the current thread.
///
/// Callers take the difference of two readings; the absolute value is
/// meaningless.
pub(crate) fn source_wait() -> Duration {
    SOURCE_WAIT.with(Cell::get)
}

/// Run a source pull and add its wall time to [`source_wait`].
///
/// The total is reset to `before + elapsed` afterwards, so pulls nested
/// inside the upstream computation are counted once.
fn timed_pull<T>(pull: impl FnOnce() -> T) -> T {
    let before = source_wait();
    let started = Instant::now();
    let result = pull();
    SOURCE_WAIT.with(|wait| wait.set(before + started.elapsed()));
    result
}

/// What an operator can reach while computing.
///
/// Source tiles are pulled through [`source_tile`](Self::source_tile), which
/// goes back through the engine (cache first, then the producing operator).
/// Long computations should call
/// [`check_for_cancellation`](Self::check_for_cancellation) between chunks.
pub struct ComputeContext<'a> {
    engine: &'a EngineInner,
    context: &'a OperatorContext,
    run: Option<&'a CancellationToken>,
}

impl<'a> ComputeContext<'a> {
    pub(crate) fn new(
        engine: &'a EngineInner,
        context: &'a OperatorContext,
        run: Option<&'a CancellationToken>,
    ) -> Self {
        Self {
            engine,
            context,
            run,
        }
    }

    /// Fetch `rect` of a source raster, computing it if necessary.
    ///
    /// # Errors
    ///
    /// Cancellation surfaces as [`OperatorError::Cancelled`]; any other
    /// failure as [`OperatorError::Upstream`].
    pub fn source_tile(&self, raster: &Raster, rect: Rectangle) -> Result<Tile, OperatorError> {
        self.check_for_cancellation()?;
        Ok(timed_pull(|| self.engine.pull_tile(raster, rect, self.run))?)
    }

    /// Fetch `rect` of a source raster where `rect` may extend past the
    /// raster bounds, e.g. for a filter kernel at the image edge.
    ///
    /// Samples outside the bounds are produced by `extender`.
    pub fn source_tile_extended(
        &self,
        raster: &Raster,
        rect: Rectangle,
        extender: BorderExtender,
    ) -> Result<Tile, OperatorError> {
        self.check_for_cancellation()?;
        Ok(timed_pull(|| {
            self.engine
                .pull_tile_extended(raster, rect, extender, self.run)
        })?)
    }

    /// Returns true if the current run or this operator's context was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.context.is_cancelled() || self.run.is_some_and(|t| t.is_cancelled())
    }

    /// Return [`OperatorError::Cancelled`] if cancellation was requested.
    pub fn check_for_cancellation(&self) -> Result<(), OperatorError> {
        if self.is_cancelled() {
            Err(OperatorError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Identifier of the operator context, e.g. `BandMaths$1f`.
    pub fn operator_id(&self) -> &str {
        self.context.id()
    }

    /// Rasters this operator produces.
    pub fn target_rasters(&self) -> &[Raster] {
        self.context.targets()
    }

    /// Tiling of the target rasters.
    pub fn grid(&self) -> TileGrid {
        self.context.grid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nested_pulls_counted_once() {
        let start = source_wait();
        timed_pull(|| timed_pull(|| std::thread::sleep(Duration::from_millis(50))));
        let waited = source_wait() - start;
        assert!(waited >= Duration::from_millis(50));
        // double counting would report at least 100ms
        assert!(waited < Duration::from_millis(90));
    }

    #[test]
    fn test_wait_is_per_thread() {
        let start = source_wait();
        std::thread::spawn(|| timed_pull(|| std::thread::sleep(Duration::from_millis(5))))
            .join()
            .unwrap();
        assert_eq!(source_wait(), start);
    }
}
