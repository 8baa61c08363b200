//! State of one bulk run.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::order::{work_items, ExecutionOrder, WorkItem};
use super::permits::PermitPool;
use super::progress::ProgressSink;
use crate::context::OperatorContext;
use crate::engine::EngineInner;
use crate::error::{EngineError, OperatorError, SchedulingError};
use crate::raster::{Raster, TileGrid};

/// Lifecycle of a [`SchedulingJob`].
///
/// ```text
/// Idle ─▶ Scheduling ─┬─▶ Draining ──┬─▶ Done
///                     ├─▶ Cancelled ─┤
///                     └─▶ Failed ────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Scheduling,
    Draining,
    Cancelled,
    Failed,
    Done,
}

/// One bulk computation over a set of target rasters sharing a tile grid.
///
/// Created by [`Scheduler::prepare`](super::Scheduler::prepare); run once.
pub struct SchedulingJob {
    engine: Arc<EngineInner>,
    label: String,
    targets: Vec<(Raster, Arc<OperatorContext>)>,
    grid: TileGrid,
    order: ExecutionOrder,
    parallelism: usize,
    permits: PermitPool,
    first_error: Mutex<Option<SchedulingError>>,
    cancellation: CancellationToken,
    progress: Arc<dyn ProgressSink>,
    state: Mutex<RunState>,
    started: AtomicBool,
}

impl SchedulingJob {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: Arc<EngineInner>,
        label: String,
        targets: Vec<(Raster, Arc<OperatorContext>)>,
        grid: TileGrid,
        order: ExecutionOrder,
        parallelism: usize,
        cancellation: CancellationToken,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        let parallelism = parallelism.max(1);
        Self {
            engine,
            label,
            targets,
            grid,
            order,
            parallelism,
            permits: PermitPool::new(parallelism),
            first_error: Mutex::new(None),
            cancellation,
            progress,
            state: Mutex::new(RunState::Idle),
            started: AtomicBool::new(false),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    pub fn grid(&self) -> TileGrid {
        self.grid
    }

    pub fn order(&self) -> ExecutionOrder {
        self.order
    }

    pub fn parallelism(&self) -> usize {
        self.parallelism
    }

    pub fn targets(&self) -> impl Iterator<Item = &Raster> {
        self.targets.iter().map(|(r, _)| r)
    }

    /// Units of progress the run reports: tiles × rasters.
    pub fn total_work(&self) -> u64 {
        self.grid.tile_count() as u64 * self.targets.len() as u64
    }

    /// Token observed by the run; cancelling it stops further submissions.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }

    /// Run to completion on the calling thread plus the worker pool.
    ///
    /// Blocks until all submitted work drained, then returns the first
    /// error of the run, if any.
    pub fn run(self: &Arc<Self>) -> Result<(), SchedulingError> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(SchedulingError::InvalidRequest(format!(
                "job '{}' already ran",
                self.label
            )));
        }
        self.set_state(RunState::Scheduling);

        let total = self.total_work();
        info!(
            label = %self.label,
            rasters = self.targets.len(),
            tiles_x = self.grid.tile_count_x(),
            tiles_y = self.grid.tile_count_y(),
            parallelism = self.parallelism,
            order = %self.order,
            "Starting scene computation"
        );
        self.progress.begin(&self.label, total);
        let started = Instant::now();

        let result = self.drive();

        self.progress.done();
        self.set_state(RunState::Done);
        info!(
            label = %self.label,
            elapsed_ms = started.elapsed().as_millis() as u64,
            success = result.is_ok(),
            "Finished scene computation"
        );
        result
    }

    fn drive(self: &Arc<Self>) -> Result<(), SchedulingError> {
        if self.cancellation.is_cancelled() {
            self.record(SchedulingError::Cancelled);
            return self.take_result();
        }
        self.execute_operators()?;

        let items = work_items(
            self.order,
            self.grid.tile_count_x(),
            self.grid.tile_count_y(),
            self.targets.len(),
        );

        if self.order.is_synchronous() {
            for item in items {
                if self.cancellation.is_cancelled() {
                    self.record(SchedulingError::Cancelled);
                    break;
                }
                if !self.process(item) {
                    break;
                }
            }
            self.transition(RunState::Scheduling, RunState::Draining);
            return self.take_result();
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.parallelism)
            .thread_name(|i| format!("rasterflow-worker-{}", i))
            .build()
            .map_err(|e| SchedulingError::ThreadPool(e.to_string()))?;

        for item in items {
            if self.cancellation.is_cancelled() {
                self.record(SchedulingError::Cancelled);
                break;
            }
            if !self.permits.acquire() {
                break;
            }
            let job = Arc::clone(self);
            pool.spawn(move || job.run_item(item));
        }

        self.transition(RunState::Scheduling, RunState::Draining);
        self.permits.drain();
        self.take_result()
    }

    /// Run the one-shot execute hook of each involved context.
    fn execute_operators(&self) -> Result<(), SchedulingError> {
        let mut seen: Vec<&Arc<OperatorContext>> = Vec::new();
        for (_, context) in &self.targets {
            if seen.iter().any(|c| Arc::ptr_eq(c, context)) {
                continue;
            }
            seen.push(context);
            if let Err(e) = context.ensure_executed(&self.engine, Some(&self.cancellation)) {
                let err = if e.is_cancelled() {
                    SchedulingError::Cancelled
                } else {
                    SchedulingError::Initialization {
                        operator: context.id().to_string(),
                        source: e,
                    }
                };
                self.record(err);
                return self.take_result();
            }
        }
        Ok(())
    }

    /// Worker entry: compute one item, then return its permit.
    fn run_item(&self, item: WorkItem) {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.process(item))) {
            let (raster, context) = &self.targets[item.raster];
            let rect = self.grid.tile_rect(item.tile_x, item.tile_y);
            self.record(SchedulingError::Failed {
                raster: raster.name().to_string(),
                tile_x: item.tile_x,
                tile_y: item.tile_y,
                source: EngineError::Operator {
                    operator: context.id().to_string(),
                    raster: raster.name().to_string(),
                    rect,
                    source: OperatorError::failed(format!(
                        "worker panicked: {}",
                        panic_message(panic.as_ref())
                    )),
                },
            });
        }
        self.permits.release();
    }

    /// Compute the tiles of one item. Returns false if the run should stop.
    fn process(&self, item: WorkItem) -> bool {
        let end = if item.whole_stack {
            self.targets.len()
        } else {
            item.raster + 1
        };
        let rect = self.grid.tile_rect(item.tile_x, item.tile_y);

        for (raster, context) in &self.targets[item.raster..end] {
            if self.has_failed() {
                return false;
            }
            match context.compute_tile(&self.engine, raster, rect, Some(&self.cancellation)) {
                Ok(_) => self.progress.worked(1),
                Err(e) => {
                    let err = if e.is_cancelled() {
                        SchedulingError::Cancelled
                    } else {
                        SchedulingError::Failed {
                            raster: raster.name().to_string(),
                            tile_x: item.tile_x,
                            tile_y: item.tile_y,
                            source: e,
                        }
                    };
                    self.record(err);
                    return false;
                }
            }
        }
        true
    }

    /// Keep the first error; log later ones and open the permit pool.
    fn record(&self, err: SchedulingError) {
        let mut slot = self.first_error.lock();
        if slot.is_some() {
            if !matches!(err, SchedulingError::Cancelled) {
                warn!(label = %self.label, error = %err, "Additional failure after first error");
            }
            return;
        }
        let next = match err {
            SchedulingError::Cancelled => RunState::Cancelled,
            _ => RunState::Failed,
        };
        debug!(label = %self.label, error = %err, "Recorded first error");
        *slot = Some(err);
        drop(slot);

        self.set_state(next);
        self.permits.release_all();
    }

    fn has_failed(&self) -> bool {
        self.first_error.lock().is_some()
    }

    fn take_result(&self) -> Result<(), SchedulingError> {
        match self.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn set_state(&self, next: RunState) {
        let mut state = self.state.lock();
        let previous = *state;
        debug!(label = %self.label, from = ?previous, to = ?next, "Run state");
        *state = next;
    }

    fn transition(&self, from: RunState, to: RunState) {
        let mut state = self.state.lock();
        if *state == from {
            *state = to;
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
