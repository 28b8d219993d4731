//! Screen points and rectangles in pixels.

/// A screen point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    /// Create a point.
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A screen rectangle stored as left/top/right/bottom edges.
///
/// `right` and `bottom` are exclusive, as in the platform `RECT`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl Rect {
    /// Size of the wire encoding: four little-endian `i32`.
    pub const WIRE_SIZE: usize = 16;

    /// Create a rectangle from its edges.
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Create a rectangle from origin and size, as returned by `accLocation`.
    pub const fn from_xywh(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self::new(x, y, x.saturating_add(width), y.saturating_add(height))
    }

    pub const fn width(&self) -> i32 {
        self.right - self.left
    }

    pub const fn height(&self) -> i32 {
        self.bottom - self.top
    }

    /// Whether the rectangle has no area.
    pub const fn is_empty(&self) -> bool {
        self.right <= self.left || self.bottom <= self.top
    }

    /// Area in pixels, 0 for empty rectangles.
    pub fn area(&self) -> i64 {
        if self.is_empty() {
            0
        } else {
            i64::from(self.width()) * i64::from(self.height())
        }
    }

    /// The top-left corner.
    pub const fn origin(&self) -> Point {
        Point::new(self.left, self.top)
    }

    /// The bottom-right corner (exclusive).
    pub const fn corner(&self) -> Point {
        Point::new(self.right, self.bottom)
    }

    /// The center point.
    pub const fn center(&self) -> Point {
        Point::new(
            self.left + self.width() / 2,
            self.top + self.height() / 2,
        )
    }

    pub const fn contains(&self, p: Point) -> bool {
        p.x >= self.left && p.x < self.right && p.y >= self.top && p.y < self.bottom
    }

    /// The overlapping part of two rectangles, or `None` if they do not overlap.
    pub fn intersect(&self, other: &Rect) -> Option<Rect> {
        let r = Rect::new(
            self.left.max(other.left),
            self.top.max(other.top),
            self.right.min(other.right),
            self.bottom.min(other.bottom),
        );
        if r.is_empty() { None } else { Some(r) }
    }

    /// Encode as four little-endian `i32` (left, top, right, bottom).
    pub fn to_le_bytes(&self) -> [u8; Self::WIRE_SIZE] {
        let mut b = [0u8; Self::WIRE_SIZE];
        b[0..4].copy_from_slice(&self.left.to_le_bytes());
        b[4..8].copy_from_slice(&self.top.to_le_bytes());
        b[8..12].copy_from_slice(&self.right.to_le_bytes());
        b[12..16].copy_from_slice(&self.bottom.to_le_bytes());
        b
    }

    /// Decode from [`Rect::to_le_bytes`] output.
    pub fn from_le_bytes(b: [u8; Self::WIRE_SIZE]) -> Self {
        let at = |i: usize| i32::from_le_bytes([b[i], b[i + 1], b[i + 2], b[i + 3]]);
        Self::new(at(0), at(4), at(8), at(12))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intersect() {
        let a = Rect::from_xywh(0, 0, 100, 100);
        let b = Rect::from_xywh(50, 60, 100, 100);
        assert_eq!(a.intersect(&b), Some(Rect::new(50, 60, 100, 100)));
        assert_eq!(a.intersect(&Rect::from_xywh(200, 0, 5, 5)), None);
    }

    #[test]
    fn test_contains_is_half_open() {
        let r = Rect::new(10, 10, 20, 20);
        assert!(r.contains(Point::new(10, 10)));
        assert!(!r.contains(Point::new(20, 15)));
    }

    #[test]
    fn test_area_of_empty() {
        assert_eq!(Rect::new(5, 5, 5, 50).area(), 0);
        assert_eq!(Rect::from_xywh(1, 1, 3, 4).area(), 12);
    }
}
