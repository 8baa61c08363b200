//! Typed primitive sample storage.

use crate::raster::{DataType, Rectangle};

/// One contiguous, row-major buffer of raw samples.
///
/// The variant always matches the [`DataType`] of the raster the buffer
/// belongs to.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleBuffer {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
}

/// Apply `$body` to the inner vector of any variant.
macro_rules! with_vec {
    ($buffer:expr, $v:ident => $body:expr) => {
        match $buffer {
            SampleBuffer::Int8($v) => $body,
            SampleBuffer::UInt8($v) => $body,
            SampleBuffer::Int16($v) => $body,
            SampleBuffer::UInt16($v) => $body,
            SampleBuffer::Int32($v) => $body,
            SampleBuffer::UInt32($v) => $body,
            SampleBuffer::Float32($v) => $body,
            SampleBuffer::Float64($v) => $body,
        }
    };
}

/// Round half-up, as used for every write into an integral raster.
#[inline]
pub(crate) fn round_half_up(value: f64) -> f64 {
    (value + 0.5).floor()
}

impl SampleBuffer {
    /// Zero-filled buffer of `len` samples.
    pub fn zeroed(data_type: DataType, len: usize) -> Self {
        match data_type {
            DataType::Int8 => SampleBuffer::Int8(vec![0; len]),
            DataType::UInt8 => SampleBuffer::UInt8(vec![0; len]),
            DataType::Int16 => SampleBuffer::Int16(vec![0; len]),
            DataType::UInt16 => SampleBuffer::UInt16(vec![0; len]),
            DataType::Int32 => SampleBuffer::Int32(vec![0; len]),
            DataType::UInt32 => SampleBuffer::UInt32(vec![0; len]),
            DataType::Float32 => SampleBuffer::Float32(vec![0.0; len]),
            DataType::Float64 => SampleBuffer::Float64(vec![0.0; len]),
        }
    }

    pub fn data_type(&self) -> DataType {
        match self {
            SampleBuffer::Int8(_) => DataType::Int8,
            SampleBuffer::UInt8(_) => DataType::UInt8,
            SampleBuffer::Int16(_) => DataType::Int16,
            SampleBuffer::UInt16(_) => DataType::UInt16,
            SampleBuffer::Int32(_) => DataType::Int32,
            SampleBuffer::UInt32(_) => DataType::UInt32,
            SampleBuffer::Float32(_) => DataType::Float32,
            SampleBuffer::Float64(_) => DataType::Float64,
        }
    }

    pub fn len(&self) -> usize {
        with_vec!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Memory footprint of the samples in bytes.
    pub fn byte_size(&self) -> usize {
        self.len() * self.data_type().elem_size()
    }

    /// Raw sample at `index`, widened to `f64`.
    #[inline]
    pub fn get_f64(&self, index: usize) -> f64 {
        with_vec!(self, v => v[index] as f64)
    }

    /// Store a raw value at `index`.
    ///
    /// Integral buffers round half-up and saturate to the type's range;
    /// floating buffers store the value as is.
    #[inline]
    pub fn set_f64(&mut self, index: usize, value: f64) {
        match self {
            SampleBuffer::Int8(v) => v[index] = round_half_up(value) as i8,
            SampleBuffer::UInt8(v) => v[index] = round_half_up(value) as u8,
            SampleBuffer::Int16(v) => v[index] = round_half_up(value) as i16,
            SampleBuffer::UInt16(v) => v[index] = round_half_up(value) as u16,
            SampleBuffer::Int32(v) => v[index] = round_half_up(value) as i32,
            SampleBuffer::UInt32(v) => v[index] = round_half_up(value) as u32,
            SampleBuffer::Float32(v) => v[index] = value as f32,
            SampleBuffer::Float64(v) => v[index] = value,
        }
    }

    /// Raw integral sample at `index` (floating samples are truncated).
    #[inline]
    pub fn get_i64(&self, index: usize) -> i64 {
        with_vec!(self, v => v[index] as i64)
    }

    /// Copy `region` from `src` (laid out over `src_rect`) into `self`
    /// (laid out over `dst_rect`).
    ///
    /// `region` must lie inside both rectangles. Buffers of the same type
    /// are copied row by row; mixed types go through `f64`.
    pub fn copy_region(
        &mut self,
        dst_rect: &Rectangle,
        src: &SampleBuffer,
        src_rect: &Rectangle,
        region: &Rectangle,
    ) {
        debug_assert!(dst_rect.contains_rect(region) && src_rect.contains_rect(region));
        let row_len = region.width as usize;

        macro_rules! copy_rows {
            ($dst:expr, $src:expr) => {
                for y in region.y..region.y + region.height {
                    let d = dst_rect.offset_of(region.x, y);
                    let s = src_rect.offset_of(region.x, y);
                    $dst[d..d + row_len].copy_from_slice(&$src[s..s + row_len]);
                }
            };
        }

        match (self, src) {
            (SampleBuffer::Int8(d), SampleBuffer::Int8(s)) => copy_rows!(d, s),
            (SampleBuffer::UInt8(d), SampleBuffer::UInt8(s)) => copy_rows!(d, s),
            (SampleBuffer::Int16(d), SampleBuffer::Int16(s)) => copy_rows!(d, s),
            (SampleBuffer::UInt16(d), SampleBuffer::UInt16(s)) => copy_rows!(d, s),
            (SampleBuffer::Int32(d), SampleBuffer::Int32(s)) => copy_rows!(d, s),
            (SampleBuffer::UInt32(d), SampleBuffer::UInt32(s)) => copy_rows!(d, s),
            (SampleBuffer::Float32(d), SampleBuffer::Float32(s)) => copy_rows!(d, s),
            (SampleBuffer::Float64(d), SampleBuffer::Float64(s)) => copy_rows!(d, s),
            (dst, src) => {
                for y in region.y..region.y + region.height {
                    for x in region.x..region.x + region.width {
                        let value = src.get_f64(src_rect.offset_of(x, y));
                        dst.set_f64(dst_rect.offset_of(x, y), value);
                    }
                }
            }
        }
    }

    /// Extract `region` (inside `rect`) into a new contiguous buffer.
    pub fn window(&self, rect: &Rectangle, region: &Rectangle) -> SampleBuffer {
        let mut out = SampleBuffer::zeroed(self.data_type(), region.area());
        out.copy_region(region, self, rect, region);
        out
    }

    pub fn as_u8(&self) -> Option<&[u8]> {
        match self {
            SampleBuffer::UInt8(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i16(&self) -> Option<&[i16]> {
        match self {
            SampleBuffer::Int16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16(&self) -> Option<&[u16]> {
        match self {
            SampleBuffer::UInt16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&[i32]> {
        match self {
            SampleBuffer::Int32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match self {
            SampleBuffer::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<&[f64]> {
        match self {
            SampleBuffer::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f32_mut(&mut self) -> Option<&mut [f32]> {
        match self {
            SampleBuffer::Float32(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_f64_mut(&mut self) -> Option<&mut [f64]> {
        match self {
            SampleBuffer::Float64(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_u16_mut(&mut self) -> Option<&mut [u16]> {
        match self {
            SampleBuffer::UInt16(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_i32_mut(&mut self) -> Option<&mut [i32]> {
        match self {
            SampleBuffer::Int32(v) => Some(v),
            _ => None,
        }
    }
}
