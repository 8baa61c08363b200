//! Sample-space rectangles.

use std::fmt;

/// A rectangular window in raster sample coordinates.
///
/// `x`/`y` address the upper-left sample, `width`/`height` are sample counts.
/// Equality is structural, which makes rectangles usable as cache keys.
///
/// # Example
///
/// ```
/// use rasterflow::raster::Rectangle;
///
/// let a = Rectangle::new(0, 0, 256, 256);
/// let b = Rectangle::new(128, 128, 256, 256);
/// assert_eq!(a.intersection(&b), Some(Rectangle::new(128, 128, 128, 128)));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rectangle {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rectangle {
    /// Create a new rectangle.
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin.
    pub const fn of_size(width: i32, height: i32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Number of samples covered (0 for degenerate rectangles).
    pub fn area(&self) -> usize {
        if self.is_empty() {
            0
        } else {
            self.width as usize * self.height as usize
        }
    }

    /// Returns true if the rectangle covers no samples.
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    /// Inclusive maximum x coordinate.
    pub fn max_x(&self) -> i32 {
        self.x + self.width - 1
    }

    /// Inclusive maximum y coordinate.
    pub fn max_y(&self) -> i32 {
        self.y + self.height - 1
    }

    /// Returns true if the sample `(x, y)` lies inside the rectangle.
    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && y >= self.y && x < self.x + self.width && y < self.y + self.height
    }

    /// Returns true if `other` lies completely inside this rectangle.
    pub fn contains_rect(&self, other: &Rectangle) -> bool {
        !other.is_empty()
            && other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.y + other.height <= self.y + self.height
    }

    /// Common area of two rectangles, `None` if they do not overlap.
    pub fn intersection(&self, other: &Rectangle) -> Option<Rectangle> {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width).min(other.x + other.width);
        let y1 = (self.y + self.height).min(other.y + other.height);
        if x1 > x0 && y1 > y0 {
            Some(Rectangle::new(x0, y0, x1 - x0, y1 - y0))
        } else {
            None
        }
    }

    /// Row-major offset of `(x, y)` inside this rectangle.
    ///
    /// The caller guarantees that the sample lies inside the rectangle.
    #[inline]
    pub(crate) fn offset_of(&self, x: i32, y: i32) -> usize {
        debug_assert!(
            self.contains(x, y),
            "sample ({}, {}) outside of {}",
            x,
            y,
            self
        );
        (y - self.y) as usize * self.width as usize + (x - self.x) as usize
    }
}

impl fmt::Display for Rectangle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[x={}, y={}, w={}, h={}]",
            self.x, self.y, self.width, self.height
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_and_bounds() {
        let r = Rectangle::new(10, 20, 30, 40);
        assert_eq!(r.area(), 1200);
        assert_eq!(r.max_x(), 39);
        assert_eq!(r.max_y(), 59);
        assert!(!r.is_empty());
    }

    #[test]
    fn test_degenerate_rectangle_is_empty() {
        assert!(Rectangle::new(0, 0, 0, 5).is_empty());
        assert_eq!(Rectangle::new(0, 0, -3, 5).area(), 0);
    }

    #[test]
    fn test_contains() {
        let r = Rectangle::new(0, 0, 4, 4);
        assert!(r.contains(0, 0));
        assert!(r.contains(3, 3));
        assert!(!r.contains(4, 3));
        assert!(!r.contains(-1, 0));
    }

    #[test]
    fn test_contains_rect() {
        let outer = Rectangle::new(0, 0, 10, 10);
        assert!(outer.contains_rect(&Rectangle::new(2, 2, 8, 8)));
        assert!(outer.contains_rect(&outer));
        assert!(!outer.contains_rect(&Rectangle::new(5, 5, 6, 2)));
    }

    #[test]
    fn test_intersection_disjoint() {
        let a = Rectangle::new(0, 0, 4, 4);
        let b = Rectangle::new(4, 0, 4, 4);
        assert_eq!(a.intersection(&b), None);
    }

    #[test]
    fn test_offset_of_is_row_major() {
        let r = Rectangle::new(100, 200, 8, 4);
        assert_eq!(r.offset_of(100, 200), 0);
        assert_eq!(r.offset_of(107, 200), 7);
        assert_eq!(r.offset_of(100, 201), 8);
        assert_eq!(r.offset_of(103, 203), 27);
    }

    #[test]
    fn test_display() {
        let r = Rectangle::new(1, 2, 3, 4);
        assert_eq!(r.to_string(), "[x=1, y=2, w=3, h=4]");
    }
}
