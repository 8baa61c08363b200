//! Tile views over shared sample storage.

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::buffer::{round_half_up, SampleBuffer};
use crate::error::TileError;
use crate::raster::{DataType, Raster, Rectangle};

// =============================================================================
// Storage
// =============================================================================

/// Backing samples of one computed tile, shared between the cache and
/// every [`Tile`] view of it.
pub(crate) struct TileStorage {
    rect: Rectangle,
    byte_size: usize,
    samples: RwLock<SampleBuffer>,
}

impl TileStorage {
    pub(crate) fn new(rect: Rectangle, samples: SampleBuffer) -> Self {
        debug_assert_eq!(rect.area(), samples.len());
        Self {
            rect,
            byte_size: samples.byte_size(),
            samples: RwLock::new(samples),
        }
    }

    pub(crate) fn zeroed(data_type: DataType, rect: Rectangle) -> Self {
        Self::new(rect, SampleBuffer::zeroed(data_type, rect.area()))
    }

    pub(crate) fn rect(&self) -> Rectangle {
        self.rect
    }

    pub(crate) fn byte_size(&self) -> usize {
        self.byte_size
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, SampleBuffer> {
        self.samples.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, SampleBuffer> {
        self.samples.write()
    }
}

// =============================================================================
// Tile
// =============================================================================

/// A rectangular window of one raster's samples.
///
/// Sample accessors take absolute raster coordinates and convert between raw
/// and geophysical values using the raster's [`Scaling`](crate::raster::Scaling).
/// Only target tiles, i.e. the tiles an operator is asked to fill, accept
/// writes; tiles handed out by the engine are read-only.
///
/// A tile whose rectangle equals its storage rectangle is *direct*: raw
/// access works on the backing buffer itself. Other tiles are pass-through
/// views; raw access materializes a contiguous copy once and
/// [`commit`](Tile::commit) writes it back.
///
/// # Example
///
/// ```
/// use rasterflow::raster::{DataType, Raster, Rectangle, Scaling};
/// use rasterflow::tile::Tile;
///
/// let raster = Raster::builder("sigma0", 64, 64, DataType::Int16)
///     .scaling(Scaling::linear(2.0, 0.0))
///     .build();
/// let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 8, 8));
/// tile.set_sample(3, 4, 10.0).unwrap();
/// assert_eq!(tile.sample_double(3, 4), 10.0);
/// assert_eq!(tile.raw_sample_double(3, 4), 5.0);
/// ```
pub struct Tile {
    raster: Raster,
    rect: Rectangle,
    target: bool,
    storage: Arc<TileStorage>,
    scratch: Mutex<Option<SampleBuffer>>,
}

impl Tile {
    /// Allocate a zero-filled target tile for scratch work.
    pub fn allocate(raster: &Raster, rect: Rectangle) -> Self {
        let storage = Arc::new(TileStorage::zeroed(raster.data_type(), rect));
        Self::from_storage(raster.clone(), rect, storage, true)
    }

    pub(crate) fn from_storage(
        raster: Raster,
        rect: Rectangle,
        storage: Arc<TileStorage>,
        target: bool,
    ) -> Self {
        debug_assert!(storage.rect().contains_rect(&rect) || rect.is_empty());
        Self {
            raster,
            rect,
            target,
            storage,
            scratch: Mutex::new(None),
        }
    }

    /// Read-only view of `rect`, which must lie inside the storage.
    pub(crate) fn view(&self, rect: Rectangle) -> Tile {
        Tile::from_storage(self.raster.clone(), rect, Arc::clone(&self.storage), false)
    }

    /// Read-only view of this tile's own rectangle.
    pub fn to_read_only(&self) -> Tile {
        self.view(self.rect)
    }

    pub(crate) fn storage(&self) -> &Arc<TileStorage> {
        &self.storage
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    pub fn rect(&self) -> Rectangle {
        self.rect
    }

    pub fn min_x(&self) -> i32 {
        self.rect.x
    }

    pub fn min_y(&self) -> i32 {
        self.rect.y
    }

    pub fn max_x(&self) -> i32 {
        self.rect.max_x()
    }

    pub fn max_y(&self) -> i32 {
        self.rect.max_y()
    }

    pub fn width(&self) -> i32 {
        self.rect.width
    }

    pub fn height(&self) -> i32 {
        self.rect.height
    }

    pub fn data_type(&self) -> DataType {
        self.raster.data_type()
    }

    /// Returns true if the tile accepts writes.
    pub fn is_target(&self) -> bool {
        self.target
    }

    /// Returns true if the tile covers its whole backing buffer.
    pub fn is_direct(&self) -> bool {
        self.rect == self.storage.rect()
    }

    /// Bytes held by the backing buffer.
    pub fn byte_size(&self) -> usize {
        self.storage.byte_size()
    }

    #[inline]
    fn index(&self, x: i32, y: i32) -> usize {
        assert!(
            self.rect.contains(x, y),
            "sample ({}, {}) outside tile {}",
            x,
            y,
            self.rect
        );
        self.storage.rect().offset_of(x, y)
    }

    fn ensure_target(&self) -> Result<(), TileError> {
        if self.target {
            Ok(())
        } else {
            Err(TileError::NotTarget {
                raster: self.raster.name().to_string(),
                rect: self.rect,
            })
        }
    }

    #[inline]
    fn to_geophysical(&self, raw: f64) -> f64 {
        if self.raster.is_scaled() {
            self.raster.scaling().scale(raw)
        } else {
            raw
        }
    }

    #[inline]
    fn to_raw(&self, value: f64) -> f64 {
        if self.raster.is_scaled() {
            self.raster.scaling().scale_inverse(value)
        } else {
            value
        }
    }

    /// Returns true if writes may be held in a materialized copy until
    /// [`commit`](Tile::commit).
    #[inline]
    fn is_deferred(&self) -> bool {
        self.target && !self.is_direct()
    }

    /// Read the raw sample at `(x, y)` from the materialized copy, if there is
    /// one, otherwise from storage.
    fn read_raw<R>(&self, x: i32, y: i32, f: impl FnOnce(&SampleBuffer, usize) -> R) -> R {
        let index = self.index(x, y);
        if self.is_deferred() {
            if let Some(buffer) = self.scratch.lock().as_ref() {
                return f(buffer, self.rect.offset_of(x, y));
            }
        }
        f(&self.storage.read(), index)
    }

    /// Write the raw sample at `(x, y)`; once a copy is materialized all
    /// writes go there.
    fn write_raw(
        &mut self,
        x: i32,
        y: i32,
        f: impl FnOnce(&mut SampleBuffer, usize),
    ) -> Result<(), TileError> {
        self.ensure_target()?;
        let index = self.index(x, y);
        let rect = self.rect;
        if let Some(buffer) = self.scratch.get_mut().as_mut() {
            f(buffer, rect.offset_of(x, y));
        } else {
            f(&mut self.storage.write(), index);
        }
        Ok(())
    }

    fn check_bit(&self, bit: u32) -> Result<(), TileError> {
        let data_type = self.raster.data_type();
        if !data_type.is_integral() {
            return Err(TileError::NotIntegral(self.raster.name().to_string()));
        }
        let bits = data_type.elem_size() as u32 * 8;
        if bit >= bits {
            return Err(TileError::BitOutOfRange { bit, bits });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Single samples
    // -------------------------------------------------------------------------

    /// Unscaled sample at `(x, y)`.
    pub fn raw_sample_double(&self, x: i32, y: i32) -> f64 {
        self.read_raw(x, y, |samples, i| samples.get_f64(i))
    }

    /// Geophysical sample at `(x, y)`.
    pub fn sample_double(&self, x: i32, y: i32) -> f64 {
        self.to_geophysical(self.raw_sample_double(x, y))
    }

    pub fn sample_float(&self, x: i32, y: i32) -> f32 {
        self.sample_double(x, y) as f32
    }

    /// Geophysical sample rounded half-up to an integer.
    pub fn sample_int(&self, x: i32, y: i32) -> i32 {
        if self.raster.is_scaled() {
            round_half_up(self.sample_double(x, y)) as i32
        } else {
            self.read_raw(x, y, |samples, i| samples.get_i64(i)) as i32
        }
    }

    /// Write a geophysical value at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::NotTarget`] for read-only tiles.
    pub fn set_sample(&mut self, x: i32, y: i32, value: f64) -> Result<(), TileError> {
        let raw = self.to_raw(value);
        self.set_raw_sample(x, y, raw)
    }

    pub fn set_sample_int(&mut self, x: i32, y: i32, value: i32) -> Result<(), TileError> {
        self.set_sample(x, y, value as f64)
    }

    pub fn set_sample_float(&mut self, x: i32, y: i32, value: f32) -> Result<(), TileError> {
        self.set_sample(x, y, value as f64)
    }

    /// Write an unscaled value at `(x, y)`.
    pub fn set_raw_sample(&mut self, x: i32, y: i32, raw: f64) -> Result<(), TileError> {
        self.write_raw(x, y, |samples, i| samples.set_f64(i, raw))
    }

    /// Bit `bit` of the raw sample at `(x, y)`.
    ///
    /// # Errors
    ///
    /// [`TileError::NotIntegral`] for floating-point rasters,
    /// [`TileError::BitOutOfRange`] if `bit` exceeds the sample width.
    pub fn sample_bit(&self, x: i32, y: i32, bit: u32) -> Result<bool, TileError> {
        self.check_bit(bit)?;
        Ok(self.read_raw(x, y, |samples, i| (samples.get_i64(i) >> bit) & 1 == 1))
    }

    /// Set or clear bit `bit` of the raw sample at `(x, y)`.
    pub fn set_sample_bit(&mut self, x: i32, y: i32, bit: u32, value: bool) -> Result<(), TileError> {
        self.ensure_target()?;
        self.check_bit(bit)?;
        self.write_raw(x, y, |samples, i| {
            let raw = samples.get_i64(i);
            let updated = if value {
                raw | (1 << bit)
            } else {
                raw & !(1 << bit)
            };
            samples.set_f64(i, updated as f64);
        })
    }

    /// Returns true if the sample is not no-data and passes the valid mask.
    pub fn is_sample_valid(&self, x: i32, y: i32) -> bool {
        let raw = self.raw_sample_double(x, y);
        self.raster.is_valid(x, y, raw)
    }

    // -------------------------------------------------------------------------
    // Bulk access
    // -------------------------------------------------------------------------

    /// All `(x, y)` positions of the tile, row by row.
    pub fn positions(&self) -> impl Iterator<Item = (i32, i32)> {
        let rect = self.rect;
        (rect.y..rect.y + rect.height)
            .flat_map(move |y| (rect.x..rect.x + rect.width).map(move |x| (x, y)))
    }

    /// Geophysical samples of the tile rectangle, row-major.
    pub fn samples_double(&self) -> Vec<f64> {
        self.with_raw_samples(|samples| {
            (0..samples.len())
                .map(|i| self.to_geophysical(samples.get_f64(i)))
                .collect()
        })
    }

    /// Overwrite the tile rectangle with geophysical `values`, row-major.
    pub fn set_samples_double(&mut self, values: &[f64]) -> Result<(), TileError> {
        self.ensure_target()?;
        let expected = self.rect.area();
        if values.len() != expected {
            return Err(TileError::LengthMismatch {
                expected,
                actual: values.len(),
            });
        }
        let raw: Vec<f64> = values.iter().map(|v| self.to_raw(*v)).collect();
        self.with_raw_samples_mut(|samples| {
            for (i, value) in raw.into_iter().enumerate() {
                samples.set_f64(i, value);
            }
        })
    }

    /// Run `f` on the raw samples of the tile rectangle.
    ///
    /// For pass-through views the samples are a contiguous copy taken on
    /// first access.
    pub fn with_raw_samples<R>(&self, f: impl FnOnce(&SampleBuffer) -> R) -> R {
        if self.is_direct() {
            return f(&self.storage.read());
        }
        let mut scratch = self.scratch.lock();
        let buffer = scratch.get_or_insert_with(|| {
            self.storage
                .read()
                .window(&self.storage.rect(), &self.rect)
        });
        f(buffer)
    }

    /// Run `f` on the writable raw samples of the tile rectangle.
    ///
    /// On a pass-through target tile this materializes a copy; from then on
    /// every write lands in the copy and becomes visible in storage after
    /// [`commit`](Tile::commit).
    pub fn with_raw_samples_mut<R>(
        &mut self,
        f: impl FnOnce(&mut SampleBuffer) -> R,
    ) -> Result<R, TileError> {
        self.ensure_target()?;
        if self.is_direct() {
            return Ok(f(&mut self.storage.write()));
        }
        let storage = &self.storage;
        let rect = self.rect;
        let buffer = self
            .scratch
            .get_mut()
            .get_or_insert_with(|| storage.read().window(&storage.rect(), &rect));
        Ok(f(buffer))
    }

    /// Copy a materialized raw buffer back into storage.
    ///
    /// No-op for read-only and direct tiles.
    pub fn commit(&mut self) {
        if !self.target {
            return;
        }
        if let Some(buffer) = self.scratch.get_mut().take() {
            self.storage
                .write()
                .copy_region(&self.storage.rect(), &buffer, &self.rect, &self.rect);
        }
    }
}

impl Clone for Tile {
    fn clone(&self) -> Self {
        Tile::from_storage(
            self.raster.clone(),
            self.rect,
            Arc::clone(&self.storage),
            self.target,
        )
    }
}

impl fmt::Debug for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tile")
            .field("raster", &self.raster.to_string())
            .field("rect", &self.rect)
            .field("target", &self.target)
            .field("storage_rect", &self.storage.rect())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Scaling;

    fn scaled_raster() -> Raster {
        Raster::builder("scaled", 16, 16, DataType::Int16)
            .scaling(Scaling::linear(2.0, 0.0))
            .build()
    }

    #[test]
    fn test_scaled_round_trip() {
        let raster = scaled_raster();
        let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 4, 4));
        tile.set_sample(1, 2, 10.0).unwrap();
        assert_eq!(tile.sample_double(1, 2), 10.0);
        assert_eq!(tile.sample_int(1, 2), 10);
        assert_eq!(tile.raw_sample_double(1, 2), 5.0);
    }

    #[test]
    fn test_scaled_integral_write_rounds() {
        let raster = scaled_raster();
        let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 2, 2));
        // 7 / 2 = 3.5 rounds half-up to 4
        tile.set_sample(0, 0, 7.0).unwrap();
        assert_eq!(tile.raw_sample_double(0, 0), 4.0);
        assert_eq!(tile.sample_double(0, 0), 8.0);
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let raster = Raster::new("ro", 8, 8, DataType::Float32);
        let tile = Tile::allocate(&raster, Rectangle::new(0, 0, 8, 8));
        let mut view = tile.to_read_only();
        assert!(!view.is_target());
        assert!(matches!(
            view.set_sample(0, 0, 1.0),
            Err(TileError::NotTarget { .. })
        ));
        assert!(view.with_raw_samples_mut(|_| ()).is_err());
    }

    #[test]
    fn test_views_share_storage() {
        let raster = Raster::new("share", 8, 8, DataType::Float64);
        let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 8, 8));
        tile.set_sample(5, 5, 3.25).unwrap();
        let view = tile.view(Rectangle::new(4, 4, 2, 2));
        assert!(!view.is_direct());
        assert_eq!(view.sample_double(5, 5), 3.25);
        assert_eq!(view.samples_double(), vec![0.0, 0.0, 0.0, 3.25]);
    }

    #[test]
    fn test_raw_samples_direct() {
        let raster = Raster::new("direct", 4, 1, DataType::Float32);
        let mut tile = Tile::allocate(&raster, Rectangle::new(0, 0, 4, 1));
        tile.with_raw_samples_mut(|buf| {
            buf.as_f32_mut().unwrap().copy_from_slice(&[1.0, 2.0, 3.0, 4.0]);
        })
        .unwrap();
        assert_eq!(tile.sample_double(2, 0), 3.0);
    }

    #[test]
    fn test_raw_samples_view_commit() {
        let raster = Raster::new("commit", 4, 4, DataType::Float32);
        let whole = Tile::allocate(&raster, Rectangle::new(0, 0, 4, 4));
        let mut part = Tile::from_storage(
            raster.clone(),
            Rectangle::new(1, 1, 2, 2),
            Arc::clone(whole.storage()),
            true,
        );
        part.with_raw_samples_mut(|buf| {
            buf.as_f32_mut().unwrap().fill(9.0);
        })
        .unwrap();
        // not yet visible
        assert_eq!(whole.sample_double(1, 1), 0.0);
        part.commit();
        assert_eq!(whole.sample_double(1, 1), 9.0);
        assert_eq!(whole.sample_double(2, 2), 9.0);
        assert_eq!(whole.sample_double(0, 0), 0.0);
    }

    #[test]
    fn test_writes_after_materialize_survive_commit() {
        let raster = Raster::new("mixed", 4, 4, DataType::Float64);
        let whole = Tile::allocate(&raster, Rectangle::new(0, 0, 4, 4));
        let mut part = Tile::from_storage(
            raster.clone(),
            Rectangle::new(1, 1, 2, 2),
            Arc::clone(whole.storage()),
            true,
        );

        // before any copy exists, writes go straight to storage
        part.set_sample(1, 1, 5.0).unwrap();
        assert_eq!(whole.sample_double(1, 1), 5.0);

        // index 3 of the 2x2 window is (2, 2)
        part.with_raw_samples_mut(|buf| buf.set_f64(3, 9.0)).unwrap();
        part.set_sample(1, 2, 4.0).unwrap();
        assert_eq!(part.sample_double(1, 2), 4.0);
        assert_eq!(part.samples_double(), vec![5.0, 0.0, 4.0, 9.0]);
        assert_eq!(whole.sample_double(1, 2), 0.0);

        part.commit();
        assert_eq!(whole.sample_double(1, 1), 5.0);
        assert_eq!(whole.sample_double(2, 2), 9.0);
        assert_eq!(whole.sample_double(1, 2), 4.0);
    }

    #[test]
    fn test_sample_bits() {
        let raster = Raster::new("flags", 2, 2, DataType::UInt8);
        let mut tile = Tile::allocate(&raster, raster.bounds());
        tile.set_sample_bit(0, 0, 3, true).unwrap();
        tile.set_sample_bit(0, 0, 0, true).unwrap();
        assert_eq!(tile.sample_int(0, 0), 9);
        tile.set_sample_bit(0, 0, 3, false).unwrap();
        assert!(!tile.sample_bit(0, 0, 3).unwrap());
        assert!(tile.sample_bit(0, 0, 0).unwrap());
    }

    #[test]
    fn test_bit_index_checked_against_sample_width() {
        let raster = Raster::new("flags", 2, 2, DataType::UInt8);
        let mut tile = Tile::allocate(&raster, raster.bounds());
        assert_eq!(
            tile.set_sample_bit(0, 0, 8, true),
            Err(TileError::BitOutOfRange { bit: 8, bits: 8 })
        );
        assert_eq!(
            tile.sample_bit(0, 0, 64),
            Err(TileError::BitOutOfRange { bit: 64, bits: 8 })
        );

        let wide = Raster::new("wide", 1, 1, DataType::UInt32);
        let mut tile = Tile::allocate(&wide, wide.bounds());
        tile.set_sample_bit(0, 0, 31, true).unwrap();
        assert!(tile.sample_bit(0, 0, 31).unwrap());
        assert!(tile.sample_bit(0, 0, 32).is_err());
    }

    #[test]
    fn test_bits_on_float_raster_rejected() {
        let raster = Raster::new("floats", 2, 2, DataType::Float32);
        let mut tile = Tile::allocate(&raster, raster.bounds());
        assert!(matches!(
            tile.set_sample_bit(0, 0, 1, true),
            Err(TileError::NotIntegral(_))
        ));
        assert!(matches!(
            tile.sample_bit(0, 0, 1),
            Err(TileError::NotIntegral(_))
        ));
    }

    #[test]
    fn test_sample_validity() {
        let raster = Raster::builder("valid", 2, 1, DataType::Int32)
            .no_data(-1.0)
            .build();
        let mut tile = Tile::allocate(&raster, raster.bounds());
        tile.set_sample(0, 0, -1.0).unwrap();
        tile.set_sample(1, 0, 7.0).unwrap();
        assert!(!tile.is_sample_valid(0, 0));
        assert!(tile.is_sample_valid(1, 0));
    }

    #[test]
    fn test_positions_are_row_major() {
        let raster = Raster::new("pos", 10, 10, DataType::UInt8);
        let tile = Tile::allocate(&raster, Rectangle::new(3, 4, 2, 2));
        let positions: Vec<_> = tile.positions().collect();
        assert_eq!(positions, vec![(3, 4), (4, 4), (3, 5), (4, 5)]);
    }

    #[test]
    fn test_set_samples_length_mismatch() {
        let raster = Raster::new("len", 4, 4, DataType::Float32);
        let mut tile = Tile::allocate(&raster, raster.bounds());
        assert_eq!(
            tile.set_samples_double(&[1.0; 3]),
            Err(TileError::LengthMismatch {
                expected: 16,
                actual: 3
            })
        );
        tile.set_samples_double(&[2.0; 16]).unwrap();
        assert!(tile.samples_double().iter().all(|v| *v == 2.0));
    }

    #[test]
    #[should_panic(expected = "outside tile")]
    fn test_out_of_tile_access_panics() {
        let raster = Raster::new("oob", 8, 8, DataType::Float32);
        let tile = Tile::allocate(&raster, Rectangle::new(0, 0, 4, 4));
        tile.sample_double(5, 5);
    }
}
