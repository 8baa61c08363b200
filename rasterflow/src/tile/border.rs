//! Sample policies for source pulls that reach past a raster's edge.
//!
//! ```text
//!   x:      -2  -1 | 0   1   2   3 |  4   5
//!   Copy:    a   a | a   b   c   d |  d   d
//!   Reflect: b   a | a   b   c   d |  d   c
//!   Wrap:    c   d | a   b   c   d |  a   b
//!   Zero:    0   0 | a   b   c   d |  0   0
//! ```

/// How samples outside the raster bounds are filled.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum BorderExtender {
    /// Raw zero.
    #[default]
    Zero,
    /// A fixed geophysical value, stored through the raster's scaling.
    Constant(f64),
    /// Nearest edge sample.
    Copy,
    /// Mirror image including the edge sample.
    Reflect,
    /// Periodic continuation.
    Wrap,
}

impl BorderExtender {
    /// Source coordinate for `v` on the axis `[origin, origin + len)`.
    ///
    /// `None` means the sample takes the fill value.
    pub(crate) fn map(&self, v: i32, origin: i32, len: i32) -> Option<i32> {
        let rel = v - origin;
        if (0..len).contains(&rel) {
            return Some(v);
        }
        if len <= 0 {
            return None;
        }
        let mapped = match self {
            BorderExtender::Zero | BorderExtender::Constant(_) => return None,
            BorderExtender::Copy => rel.clamp(0, len - 1),
            BorderExtender::Reflect => {
                let period = 2 * len;
                let m = rel.rem_euclid(period);
                if m < len {
                    m
                } else {
                    period - 1 - m
                }
            }
            BorderExtender::Wrap => rel.rem_euclid(len),
        };
        Some(origin + mapped)
    }

    /// Geophysical fill value for unmapped samples, `None` for raw zero.
    pub(crate) fn fill_value(&self) -> Option<f64> {
        match self {
            BorderExtender::Constant(value) => Some(*value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(extender: BorderExtender) -> Vec<Option<i32>> {
        (-2..6).map(|x| extender.map(x, 0, 4)).collect()
    }

    #[test]
    fn test_copy_clamps() {
        assert_eq!(
            row(BorderExtender::Copy),
            [0, 0, 0, 1, 2, 3, 3, 3].map(Some).to_vec()
        );
    }

    #[test]
    fn test_reflect_mirrors_with_edge() {
        assert_eq!(
            row(BorderExtender::Reflect),
            [1, 0, 0, 1, 2, 3, 3, 2].map(Some).to_vec()
        );
    }

    #[test]
    fn test_wrap_is_periodic() {
        assert_eq!(
            row(BorderExtender::Wrap),
            [2, 3, 0, 1, 2, 3, 0, 1].map(Some).to_vec()
        );
    }

    #[test]
    fn test_fill_extenders_leave_outside_unmapped() {
        for extender in [BorderExtender::Zero, BorderExtender::Constant(7.5)] {
            let mapped = row(extender);
            assert_eq!(mapped[..2], [None, None]);
            assert_eq!(mapped[2..6], [0, 1, 2, 3].map(Some));
            assert_eq!(mapped[6..], [None, None]);
        }
        assert_eq!(BorderExtender::Constant(7.5).fill_value(), Some(7.5));
        assert_eq!(BorderExtender::Zero.fill_value(), None);
    }

    #[test]
    fn test_offset_origin() {
        assert_eq!(BorderExtender::Copy.map(3, 10, 5), Some(10));
        assert_eq!(BorderExtender::Wrap.map(16, 10, 5), Some(11));
    }
}
