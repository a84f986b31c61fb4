//! Integer layout geometry.
//!
//! All coordinates are database units (DBU). Rectangles are closed: a point
//! on the boundary is inside, and two rectangles sharing only an edge
//! intersect. Abutting wire pieces rely on this to stay electrically joined.

mod decompose;

use std::fmt;

pub use decompose::decompose;

/// A point in database units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Point {
    pub x: i64,
    pub y: i64,
}

impl Point {
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Swap the x and y coordinates.
    pub fn transposed(&self) -> Self {
        Self::new(self.y, self.x)
    }

    pub fn translate(&self, by: Point) -> Self {
        Self::new(self.x + by.x, self.y + by.y)
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

/// An axis-aligned, closed rectangle in database units.
///
/// The derived ordering compares `xlo`, `ylo`, `xhi`, `yhi` in that order and
/// is used wherever shapes need a deterministic sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Rect {
    pub xlo: i64,
    pub ylo: i64,
    pub xhi: i64,
    pub yhi: i64,
}

impl Rect {
    /// Build a rectangle from two opposite corners in any order.
    pub fn new(x0: i64, y0: i64, x1: i64, y1: i64) -> Self {
        Self {
            xlo: x0.min(x1),
            ylo: y0.min(y1),
            xhi: x0.max(x1),
            yhi: y0.max(y1),
        }
    }

    /// A square of side `size` centered on `center`.
    pub fn centered(center: Point, size: i64) -> Self {
        let half = size / 2;
        Self::new(
            center.x - half,
            center.y - half,
            center.x + half,
            center.y + half,
        )
    }

    pub fn dx(&self) -> i64 {
        self.xhi - self.xlo
    }

    pub fn dy(&self) -> i64 {
        self.yhi - self.ylo
    }

    pub fn min_dxdy(&self) -> i64 {
        self.dx().min(self.dy())
    }

    pub fn max_dxdy(&self) -> i64 {
        self.dx().max(self.dy())
    }

    pub fn center(&self) -> Point {
        Point::new(
            (self.xlo + self.xhi).div_euclid(2),
            (self.ylo + self.yhi).div_euclid(2),
        )
    }

    /// True when the rectangle has no area.
    pub fn is_degenerate(&self) -> bool {
        self.dx() == 0 || self.dy() == 0
    }

    pub fn contains(&self, p: Point) -> bool {
        self.xlo <= p.x && p.x <= self.xhi && self.ylo <= p.y && p.y <= self.yhi
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        self.xlo <= other.xhi && other.xlo <= self.xhi && self.ylo <= other.yhi && other.ylo <= self.yhi
    }

    /// The (possibly degenerate) overlap of two rectangles.
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        if !self.intersects(other) {
            return None;
        }
        Some(Rect {
            xlo: self.xlo.max(other.xlo),
            ylo: self.ylo.max(other.ylo),
            xhi: self.xhi.min(other.xhi),
            yhi: self.yhi.min(other.yhi),
        })
    }

    /// Smallest rectangle covering both.
    pub fn merge(&self, other: &Rect) -> Rect {
        Rect {
            xlo: self.xlo.min(other.xlo),
            ylo: self.ylo.min(other.ylo),
            xhi: self.xhi.max(other.xhi),
            yhi: self.yhi.max(other.yhi),
        }
    }

    pub fn translate(&self, by: Point) -> Rect {
        Rect {
            xlo: self.xlo + by.x,
            ylo: self.ylo + by.y,
            xhi: self.xhi + by.x,
            yhi: self.yhi + by.y,
        }
    }

    /// Mirror across the x = y diagonal.
    pub fn transposed(&self) -> Rect {
        Rect {
            xlo: self.ylo,
            ylo: self.xlo,
            xhi: self.yhi,
            yhi: self.xhi,
        }
    }
}

impl fmt::Display for Rect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}) - ({}, {})", self.xlo, self.ylo, self.xhi, self.yhi)
    }
}

/// Preferred routing direction of a layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Direction {
    #[default]
    None,
    Horizontal,
    Vertical,
}

impl Direction {
    /// Parse a direction keyword from the design file.
    pub fn from_keyword(keyword: &str) -> Option<Self> {
        match keyword.to_ascii_lowercase().as_str() {
            "none" => Some(Self::None),
            "horizontal" | "h" => Some(Self::Horizontal),
            "vertical" | "v" => Some(Self::Vertical),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_normalizes_corners() {
        let r = Rect::new(10, 20, 0, 5);
        assert_eq!(r, Rect { xlo: 0, ylo: 5, xhi: 10, yhi: 20 });
        assert_eq!(r.dx(), 10);
        assert_eq!(r.dy(), 15);
        assert_eq!(r.min_dxdy(), 10);
        assert_eq!(r.max_dxdy(), 15);
    }

    #[test]
    fn test_touching_rects_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(10, 0, 20, 10);
        assert!(a.intersects(&b));
        let overlap = a.intersection(&b).unwrap();
        assert!(overlap.is_degenerate());
        assert_eq!(overlap.center(), Point::new(10, 5));

        let c = Rect::new(11, 0, 20, 10);
        assert!(a.intersection(&c).is_none());
    }

    #[test]
    fn test_contains_boundary() {
        let r = Rect::new(0, 0, 4, 4);
        assert!(r.contains(Point::new(0, 4)));
        assert!(!r.contains(Point::new(5, 4)));
    }

    #[test]
    fn test_center_of_negative_rect() {
        let r = Rect::new(-3, -3, 0, 0);
        assert_eq!(r.center(), Point::new(-2, -2));
    }
}
