//! Error taxonomy for tiles, operators, the engine and bulk scheduling.
//!
//! Errors nest along the call chain: an operator failure becomes an
//! [`EngineError::Operator`] naming the operator, raster and rectangle; a
//! bulk run wraps the first such error in [`SchedulingError::Failed`] with the
//! grid index that produced it. Cancellation is a distinct variant at every
//! level so hosts can tell it apart from failure.

use std::error::Error as StdError;

use thiserror::Error;

use crate::raster::Rectangle;

/// Boxed error used as an operator failure cause.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Errors raised by [`Tile`](crate::tile::Tile) accessors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TileError {
    /// Write attempted on a read-only tile.
    #[error("Tile {rect} of raster '{raster}' is not a target tile")]
    NotTarget { raster: String, rect: Rectangle },

    /// Bulk access with a slice of the wrong length.
    #[error("Sample count mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    /// Bit access on a floating-point raster.
    #[error("Raster '{0}' is not integral")]
    NotIntegral(String),

    /// Bit index beyond the width of the sample type.
    #[error("Bit {bit} out of range for {bits}-bit samples")]
    BitOutOfRange { bit: u32, bits: u32 },
}

/// Errors returned by [`Operator`](crate::operator::Operator) implementations.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// The computation itself failed.
    #[error("{message}")]
    Failed {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// The operator observed cancellation and stopped.
    #[error("Operation cancelled")]
    Cancelled,

    /// Pulling a source tile failed.
    #[error("Source tile failed: {0}")]
    Upstream(#[source] Box<EngineError>),
}

impl OperatorError {
    /// Failure with a message only.
    pub fn failed(message: impl Into<String>) -> Self {
        OperatorError::Failed {
            message: message.into(),
            source: None,
        }
    }

    /// Failure caused by another error.
    pub fn with_source(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        OperatorError::Failed {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Returns true if this error (or its upstream chain) is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            OperatorError::Cancelled => true,
            OperatorError::Upstream(inner) => inner.is_cancelled(),
            OperatorError::Failed { .. } => false,
        }
    }
}

impl From<EngineError> for OperatorError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Cancelled => OperatorError::Cancelled,
            other => OperatorError::Upstream(Box::new(other)),
        }
    }
}

impl From<TileError> for OperatorError {
    fn from(err: TileError) -> Self {
        OperatorError::with_source("Tile access failed", err)
    }
}

/// Errors from the pull path and from binding operators.
#[derive(Debug, Error)]
pub enum EngineError {
    /// An operator failed while computing a tile.
    #[error("Operator '{operator}' failed on raster '{raster}' at {rect}: {source}")]
    Operator {
        operator: String,
        raster: String,
        rect: Rectangle,
        #[source]
        source: OperatorError,
    },

    /// The computation was cancelled.
    #[error("Computation cancelled")]
    Cancelled,

    /// No operator context produces the raster.
    #[error("Raster '{0}' is not bound to an operator")]
    UnboundRaster(String),

    /// The raster already belongs to another context.
    #[error("Raster '{0}' is already bound to an operator")]
    AlreadyBound(String),

    /// The binding request is inconsistent.
    #[error("Invalid binding: {0}")]
    InvalidBinding(String),

    /// The requested rectangle is not inside the raster.
    #[error("Rectangle {rect} is outside raster '{raster}'")]
    OutOfBounds { raster: String, rect: Rectangle },

    /// Tile access failed outside operator code.
    #[error("Tile error: {0}")]
    Tile(#[from] TileError),
}

impl EngineError {
    /// Returns true if the error stems from cancellation.
    pub fn is_cancelled(&self) -> bool {
        match self {
            EngineError::Cancelled => true,
            EngineError::Operator { source, .. } => source.is_cancelled(),
            _ => false,
        }
    }
}

/// Errors from a bulk scheduling run.
#[derive(Debug, Error)]
pub enum SchedulingError {
    /// The run was cancelled before it completed.
    #[error("Scheduling cancelled")]
    Cancelled,

    /// The first tile failure of the run.
    #[error("Tile ({tile_x}, {tile_y}) of raster '{raster}' failed: {source}")]
    Failed {
        raster: String,
        tile_x: i32,
        tile_y: i32,
        #[source]
        source: EngineError,
    },

    /// An operator's one-shot execute hook failed before tiling started.
    #[error("Operator '{operator}' failed to execute: {source}")]
    Initialization {
        operator: String,
        #[source]
        source: EngineError,
    },

    /// The request cannot be scheduled.
    #[error("Invalid scheduling request: {0}")]
    InvalidRequest(String),

    /// The worker pool could not be created or joined.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_cancel_maps_to_operator_cancel() {
        let err: OperatorError = EngineError::Cancelled.into();
        assert!(matches!(err, OperatorError::Cancelled));
    }

    #[test]
    fn test_engine_failure_maps_to_upstream() {
        let err: OperatorError = EngineError::UnboundRaster("b1".into()).into();
        assert!(matches!(err, OperatorError::Upstream(_)));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_nested_cancellation_detected() {
        let err = EngineError::Operator {
            operator: "op".into(),
            raster: "b1".into(),
            rect: Rectangle::new(0, 0, 1, 1),
            source: OperatorError::Cancelled,
        };
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err = TileError::LengthMismatch {
            expected: 4,
            actual: 3,
        };
        assert_eq!(format!("{}", err), "Sample count mismatch: expected 4, got 3");

        let err = OperatorError::failed("boom");
        assert_eq!(format!("{}", err), "boom");
    }
}
