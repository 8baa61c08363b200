//! rasterflow - tile computation engine for chains of raster operators
//!
//! Operators produce rasters tile by tile. The engine computes tiles on
//! demand ("pull") and whole rasters in bulk ("push"), sharing one memory
//! bounded tile cache:
//!
//! ```text
//! Engine::get_tile ──▶ TileCache ──miss──▶ OperatorContext ──▶ Operator
//!        ▲                                        │
//!        └──────── ComputeContext::source_tile ◀──┘
//!
//! Scheduler ──▶ SchedulingJob ──▶ rayon workers ──▶ OperatorContext
//! ```
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use rasterflow::error::OperatorError;
//! use rasterflow::operator::{Capabilities, ComputeContext, Operator};
//! use rasterflow::raster::{DataType, Raster, Rectangle};
//! use rasterflow::tile::Tile;
//! use rasterflow::{Engine, EngineConfig};
//!
//! struct Ramp;
//!
//! impl Operator for Ramp {
//!     fn capabilities(&self) -> Capabilities {
//!         Capabilities::PER_TILE
//!     }
//!
//!     fn compute_tile(
//!         &self,
//!         _ctx: &ComputeContext<'_>,
//!         _raster: &Raster,
//!         tile: &mut Tile,
//!     ) -> Result<(), OperatorError> {
//!         for (x, y) in tile.positions() {
//!             tile.set_sample(x, y, (x + y) as f64)?;
//!         }
//!         Ok(())
//!     }
//! }
//!
//! let engine = Engine::new(EngineConfig::default());
//! let band = Raster::new("ramp", 100, 80, DataType::Float32);
//! engine.bind(Arc::new(Ramp), vec![band.clone()], None).unwrap();
//!
//! let tile = engine.get_tile(&band, Rectangle::new(10, 10, 4, 4)).unwrap();
//! assert_eq!(tile.sample_double(12, 11), 23.0);
//! ```

pub mod cache;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod logging;
pub mod node;
pub mod observer;
pub mod operator;
pub mod raster;
pub mod scheduler;
pub mod tile;

pub use config::{ConfigError, EngineConfig};
pub use engine::Engine;
pub use error::{EngineError, OperatorError, SchedulingError, TileError};
pub use scheduler::{ExecutionOrder, SceneRequest, Scheduler};
