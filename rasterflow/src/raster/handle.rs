//! Raster identity handles.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use super::rect::Rectangle;
use super::types::{DataType, Scaling};

// =============================================================================
// Raster Id
// =============================================================================

/// Global counter for raster identities.
static RASTER_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_raster_id() -> RasterId {
    RasterId(RASTER_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Opaque, process-unique key of one raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RasterId(u64);

impl RasterId {
    /// The raw numeric value, for logging.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RasterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// =============================================================================
// Valid Mask
// =============================================================================

/// Per-sample validity of a raster beyond its no-data value.
///
/// Implementations must be cheap; they are consulted on every
/// [`Tile::is_sample_valid`](crate::tile::Tile::is_sample_valid) call.
pub trait ValidMask: Send + Sync {
    /// Returns true if the sample at `(x, y)` holds valid data.
    fn is_valid(&self, x: i32, y: i32) -> bool;
}

impl<F> ValidMask for F
where
    F: Fn(i32, i32) -> bool + Send + Sync,
{
    fn is_valid(&self, x: i32, y: i32) -> bool {
        self(x, y)
    }
}

// =============================================================================
// Raster
// =============================================================================

struct RasterInner {
    id: RasterId,
    name: String,
    width: i32,
    height: i32,
    data_type: DataType,
    scaling: Scaling,
    no_data: Option<f64>,
    valid_mask: Option<Arc<dyn ValidMask>>,
}

/// Immutable handle identifying one raster (e.g. one band of a product).
///
/// Cloning is cheap. Equality and hashing use the [`RasterId`] only, so two
/// rasters with identical metadata but built separately are distinct.
///
/// # Example
///
/// ```
/// use rasterflow::raster::{DataType, Raster, Scaling};
///
/// let raster = Raster::builder("radiance_1", 1024, 768, DataType::UInt16)
///     .scaling(Scaling::linear(0.01, 0.0))
///     .no_data(0.0)
///     .build();
/// assert_eq!(raster.width(), 1024);
/// assert!(raster.is_scaled());
/// ```
#[derive(Clone)]
pub struct Raster {
    inner: Arc<RasterInner>,
}

impl Raster {
    /// Start building a raster description.
    pub fn builder(
        name: impl Into<String>,
        width: i32,
        height: i32,
        data_type: DataType,
    ) -> RasterBuilder {
        RasterBuilder {
            name: name.into(),
            width,
            height,
            data_type,
            scaling: Scaling::IDENTITY,
            no_data: None,
            valid_mask: None,
        }
    }

    /// Shorthand for an unscaled raster without no-data value.
    pub fn new(name: impl Into<String>, width: i32, height: i32, data_type: DataType) -> Self {
        Self::builder(name, width, height, data_type).build()
    }

    pub fn id(&self) -> RasterId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn width(&self) -> i32 {
        self.inner.width
    }

    pub fn height(&self) -> i32 {
        self.inner.height
    }

    pub fn data_type(&self) -> DataType {
        self.inner.data_type
    }

    pub fn scaling(&self) -> &Scaling {
        &self.inner.scaling
    }

    /// Returns true if reads and writes go through a scaling transform.
    pub fn is_scaled(&self) -> bool {
        self.inner.scaling.is_applied()
    }

    /// Raw no-data value, if declared.
    pub fn no_data(&self) -> Option<f64> {
        self.inner.no_data
    }

    /// Full extent of the raster.
    pub fn bounds(&self) -> Rectangle {
        Rectangle::of_size(self.inner.width, self.inner.height)
    }

    /// Validity of a raw sample at `(x, y)`.
    pub(crate) fn is_valid(&self, x: i32, y: i32, raw: f64) -> bool {
        if let Some(no_data) = self.inner.no_data {
            if raw == no_data || (raw.is_nan() && no_data.is_nan()) {
                return false;
            }
        }
        match &self.inner.valid_mask {
            Some(mask) => mask.is_valid(x, y),
            None => true,
        }
    }

    /// Bytes needed to hold `rect` samples of this raster.
    pub fn byte_size(&self, rect: &Rectangle) -> usize {
        rect.area() * self.inner.data_type.elem_size()
    }

    pub(crate) fn downgrade(&self) -> WeakRaster {
        WeakRaster {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl PartialEq for Raster {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Raster {}

impl Hash for Raster {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Raster")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("data_type", &self.inner.data_type)
            .field("scaling", &self.inner.scaling)
            .field("no_data", &self.inner.no_data)
            .field("valid_mask", &self.inner.valid_mask.is_some())
            .finish()
    }
}

impl fmt::Display for Raster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.inner.name, self.inner.id)
    }
}

/// Builder for [`Raster`].
pub struct RasterBuilder {
    name: String,
    width: i32,
    height: i32,
    data_type: DataType,
    scaling: Scaling,
    no_data: Option<f64>,
    valid_mask: Option<Arc<dyn ValidMask>>,
}

impl RasterBuilder {
    pub fn scaling(mut self, scaling: Scaling) -> Self {
        self.scaling = scaling;
        self
    }

    /// Raw sample value marking missing data.
    pub fn no_data(mut self, value: f64) -> Self {
        self.no_data = Some(value);
        self
    }

    pub fn valid_mask(mut self, mask: impl ValidMask + 'static) -> Self {
        self.valid_mask = Some(Arc::new(mask));
        self
    }

    pub fn build(self) -> Raster {
        Raster {
            inner: Arc::new(RasterInner {
                id: next_raster_id(),
                name: self.name,
                width: self.width.max(0),
                height: self.height.max(0),
                data_type: self.data_type,
                scaling: self.scaling,
                no_data: self.no_data,
                valid_mask: self.valid_mask,
            }),
        }
    }
}

/// Non-owning reference kept by the tile cache.
#[derive(Clone)]
pub(crate) struct WeakRaster {
    id: RasterId,
    inner: Weak<RasterInner>,
}

impl WeakRaster {
    pub(crate) fn id(&self) -> RasterId {
        self.id
    }

    pub(crate) fn upgrade(&self) -> Option<Raster> {
        self.inner.upgrade().map(|inner| Raster { inner })
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique() {
        let a = Raster::new("a", 10, 10, DataType::Float32);
        let b = Raster::new("a", 10, 10, DataType::Float32);
        assert_ne!(a.id(), b.id());
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn test_bounds_and_byte_size() {
        let r = Raster::new("b", 100, 50, DataType::Int16);
        assert_eq!(r.bounds(), Rectangle::new(0, 0, 100, 50));
        assert_eq!(r.byte_size(&Rectangle::new(0, 0, 10, 10)), 200);
    }

    #[test]
    fn test_no_data_validity() {
        let r = Raster::builder("c", 4, 4, DataType::UInt8)
            .no_data(0.0)
            .build();
        assert!(!r.is_valid(0, 0, 0.0));
        assert!(r.is_valid(0, 0, 1.0));
    }

    #[test]
    fn test_valid_mask_validity() {
        let r = Raster::builder("d", 4, 4, DataType::Float32)
            .valid_mask(|x: i32, _y: i32| x % 2 == 0)
            .build();
        assert!(r.is_valid(2, 1, 5.0));
        assert!(!r.is_valid(1, 1, 5.0));
    }

    #[test]
    fn test_weak_raster_tracks_liveness() {
        let r = Raster::new("e", 4, 4, DataType::Float32);
        let weak = r.downgrade();
        assert!(weak.is_alive());
        assert_eq!(weak.upgrade().map(|r| r.id()), Some(r.id()));
        drop(r);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }
}
