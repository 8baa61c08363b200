//! Sample data types and raw ⇄ geophysical scaling.

use std::fmt;

/// Primitive type of a raster's raw samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Float32,
    Float64,
}

impl DataType {
    /// Size of one raw sample in bytes.
    pub fn elem_size(&self) -> usize {
        match self {
            DataType::Int8 | DataType::UInt8 => 1,
            DataType::Int16 | DataType::UInt16 => 2,
            DataType::Int32 | DataType::UInt32 | DataType::Float32 => 4,
            DataType::Float64 => 8,
        }
    }

    /// Returns true for integral sample types.
    ///
    /// Writes into integral rasters are rounded half-up and saturated.
    pub fn is_integral(&self) -> bool {
        !matches!(self, DataType::Float32 | DataType::Float64)
    }

    /// Lower-case name, as used in configuration and log output.
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Int8 => "int8",
            DataType::UInt8 => "uint8",
            DataType::Int16 => "int16",
            DataType::UInt16 => "uint16",
            DataType::Int32 => "int32",
            DataType::UInt32 => "uint32",
            DataType::Float32 => "float32",
            DataType::Float64 => "float64",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Linear (optionally log10) transform from raw samples to geophysical values.
///
/// `scale(raw) = raw * factor + offset`, followed by `10^v` when `log10` is set.
/// The inverse is applied on writes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scaling {
    pub factor: f64,
    pub offset: f64,
    pub log10: bool,
}

impl Scaling {
    /// Identity transform.
    pub const IDENTITY: Scaling = Scaling {
        factor: 1.0,
        offset: 0.0,
        log10: false,
    };

    /// Create a linear scaling.
    pub fn linear(factor: f64, offset: f64) -> Self {
        Self {
            factor,
            offset,
            log10: false,
        }
    }

    /// Create a log10 scaling (`10^(raw * factor + offset)`).
    pub fn log10(factor: f64, offset: f64) -> Self {
        Self {
            factor,
            offset,
            log10: true,
        }
    }

    /// Returns true if the transform changes values.
    pub fn is_applied(&self) -> bool {
        self.factor != 1.0 || self.offset != 0.0 || self.log10
    }

    /// Raw → geophysical.
    #[inline]
    pub fn scale(&self, raw: f64) -> f64 {
        let v = raw * self.factor + self.offset;
        if self.log10 {
            10f64.powf(v)
        } else {
            v
        }
    }

    /// Geophysical → raw (unrounded).
    #[inline]
    pub fn scale_inverse(&self, value: f64) -> f64 {
        let v = if self.log10 { value.log10() } else { value };
        (v - self.offset) / self.factor
    }
}

impl Default for Scaling {
    fn default() -> Self {
        Self::IDENTITY
    }
}
