//! Bulk ("push") computation of whole rasters.
//!
//! A [`Scheduler`] turns a [`SceneRequest`] into a [`SchedulingJob`] and runs
//! it on a bounded rayon pool:
//!
//! ```text
//! submitter thread                     worker pool (P threads)
//! ────────────────                     ───────────────────────
//! for item in order:
//!   cancelled? ── yes ─▶ record Cancelled, stop
//!   permits.acquire()  ◀──────────────  permits.release() per item
//!     └── pool open ─▶ stop            first error ─▶ release_all()
//!   spawn(item) ──────────────────────▶ compute tile(s), progress.worked
//! drain in-flight
//! return first error
//! ```
//!
//! Only the first error of a run is returned; later ones are logged. A run
//! returns exactly once, after all submitted work has finished.

mod job;
mod order;
mod permits;
mod progress;

pub use job::{RunState, SchedulingJob};
pub use order::ExecutionOrder;
pub use permits::PermitPool;
pub use progress::{CountingProgress, NullProgress, ProgressSink};

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::context::OperatorContext;
use crate::engine::{Engine, EngineInner};
use crate::error::SchedulingError;
use crate::raster::Raster;

/// Default worker count: the host's available parallelism.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

/// Defaults for bulk runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Worker threads and in-flight work items.
    pub parallelism: usize,
    pub order: ExecutionOrder,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            parallelism: default_parallelism(),
            order: ExecutionOrder::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism;
        self
    }

    pub fn with_order(mut self, order: ExecutionOrder) -> Self {
        self.order = order;
        self
    }
}

/// What to compute in one bulk run.
///
/// # Example
///
/// ```ignore
/// let progress = Arc::new(CountingProgress::new());
/// let request = SceneRequest::new(vec![b1.clone(), b2.clone()])
///     .with_parallelism(2)
///     .with_order(ExecutionOrder::RowColumnStackSync)
///     .with_progress(progress.clone());
/// engine.schedule_scene(request)?;
/// assert_eq!(progress.completed(), progress.total());
/// ```
#[derive(Clone)]
pub struct SceneRequest {
    targets: Vec<Raster>,
    label: Option<String>,
    order: Option<ExecutionOrder>,
    parallelism: Option<usize>,
    progress: Option<Arc<dyn ProgressSink>>,
    cancellation: Option<CancellationToken>,
}

impl SceneRequest {
    /// Request computing every tile of `targets`.
    pub fn new(targets: Vec<Raster>) -> Self {
        Self {
            targets,
            label: None,
            order: None,
            parallelism: None,
            progress: None,
            cancellation: None,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_order(mut self, order: ExecutionOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = Some(parallelism);
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Token the run observes; cancel it to stop the run.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn targets(&self) -> &[Raster] {
        &self.targets
    }
}

/// Runs [`SceneRequest`]s against an [`Engine`].
#[derive(Clone)]
pub struct Scheduler {
    engine: Arc<EngineInner>,
    config: SchedulerConfig,
}

impl Scheduler {
    pub fn new(engine: &Engine, config: SchedulerConfig) -> Self {
        Self {
            engine: Arc::clone(engine.inner()),
            config,
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    /// Validate `request` and build its job without running it.
    ///
    /// # Errors
    ///
    /// [`SchedulingError::InvalidRequest`] if there are no targets, a target
    /// is unbound, or the targets do not share one tile grid.
    pub fn prepare(&self, request: SceneRequest) -> Result<Arc<SchedulingJob>, SchedulingError> {
        let Some(first) = request.targets.first() else {
            return Err(SchedulingError::InvalidRequest(
                "no target rasters".to_string(),
            ));
        };

        let mut targets: Vec<(Raster, Arc<OperatorContext>)> =
            Vec::with_capacity(request.targets.len());
        for raster in &request.targets {
            if targets.iter().any(|(listed, _)| listed == raster) {
                return Err(SchedulingError::InvalidRequest(format!(
                    "raster '{}' listed twice",
                    raster.name()
                )));
            }
            let context = self.engine.context_of(raster).ok_or_else(|| {
                SchedulingError::InvalidRequest(format!(
                    "raster '{}' is not bound to an operator",
                    raster.name()
                ))
            })?;
            targets.push((raster.clone(), context));
        }

        let grid = targets[0].1.grid();
        if let Some((raster, _)) = targets.iter().find(|(_, c)| c.grid() != grid) {
            return Err(SchedulingError::InvalidRequest(format!(
                "raster '{}' uses a different tile grid than '{}'",
                raster.name(),
                first.name()
            )));
        }

        let label = request.label.clone().unwrap_or_else(|| {
            request
                .targets
                .iter()
                .map(|r| r.name())
                .collect::<Vec<_>>()
                .join(", ")
        });

        Ok(Arc::new(SchedulingJob::new(
            Arc::clone(&self.engine),
            label,
            targets,
            grid,
            request.order.unwrap_or(self.config.order),
            request.parallelism.unwrap_or(self.config.parallelism),
            request.cancellation.unwrap_or_else(CancellationToken::new),
            request.progress.unwrap_or_else(|| Arc::new(NullProgress)),
        )))
    }

    /// Prepare and run `request`, blocking until it drained.
    pub fn run(&self, request: SceneRequest) -> Result<(), SchedulingError> {
        self.prepare(request)?.run()
    }
}
