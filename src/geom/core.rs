use std::ops::Mul;

use serde::Serialize;

// ─────────────────────────────────────────────────────────────────────────────
// Point3
// ─────────────────────────────────────────────────────────────────────────────

/// A position in model space. Unless stated otherwise coordinates are metres.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub const ORIGIN: Self = Self::new(0.0, 0.0, 0.0);

    #[must_use]
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    #[must_use]
    pub const fn from_array(arr: [f64; 3]) -> Self {
        Self::new(arr[0], arr[1], arr[2])
    }

    #[must_use]
    pub const fn to_array(self) -> [f64; 3] {
        [self.x, self.y, self.z]
    }

    /// Component along `axis` (0 = x, 1 = y, anything else = z).
    #[must_use]
    pub const fn axis(self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    /// Distance from the coordinate origin.
    #[must_use]
    pub fn norm(self) -> f64 {
        self.distance_squared_to(Self::ORIGIN).sqrt()
    }

    #[must_use]
    pub fn distance_to(self, other: Self) -> f64 {
        self.distance_squared_to(other).sqrt()
    }

    #[must_use]
    pub fn distance_squared_to(self, other: Self) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    #[must_use]
    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Default for Point3 {
    fn default() -> Self {
        Self::ORIGIN
    }
}

impl From<[f64; 3]> for Point3 {
    fn from(arr: [f64; 3]) -> Self {
        Self::from_array(arr)
    }
}

impl From<Point3> for [f64; 3] {
    fn from(p: Point3) -> Self {
        p.to_array()
    }
}

impl Mul<f64> for Point3 {
    type Output = Self;

    fn mul(self, rhs: f64) -> Self::Output {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// BBox
// ─────────────────────────────────────────────────────────────────────────────

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub min: Point3,
    pub max: Point3,
}

impl BBox {
    #[must_use]
    pub const fn new(min: Point3, max: Point3) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub const fn from_point(p: Point3) -> Self {
        Self::new(p, p)
    }

    #[must_use]
    pub fn from_points(points: &[Point3]) -> Option<Self> {
        let mut iter = points.iter().copied();
        let first = iter.next()?;
        Some(iter.fold(Self::from_point(first), Self::include))
    }

    /// Grows the box so that it contains `p`.
    #[must_use]
    pub fn include(self, p: Point3) -> Self {
        Self::new(
            Point3::new(self.min.x.min(p.x), self.min.y.min(p.y), self.min.z.min(p.z)),
            Point3::new(self.max.x.max(p.x), self.max.y.max(p.y), self.max.z.max(p.z)),
        )
    }

    /// Extent along `axis`.
    #[must_use]
    pub fn extent(self, axis: usize) -> f64 {
        self.max.axis(axis) - self.min.axis(axis)
    }

    /// Index of the axis with the largest extent, x winning ties.
    #[must_use]
    pub fn longest_axis(self) -> usize {
        let (ex, ey, ez) = (self.extent(0), self.extent(1), self.extent(2));
        if ex >= ey && ex >= ez {
            0
        } else if ey >= ez {
            1
        } else {
            2
        }
    }

    /// Squared distance from `point` to the closest point of the box; zero inside.
    #[must_use]
    pub fn distance_squared_to_point(self, point: Point3) -> f64 {
        let mut d2 = 0.0;
        for axis in 0..3 {
            let p = point.axis(axis);
            let lo = self.min.axis(axis);
            let hi = self.max.axis(axis);
            let d = if p < lo {
                lo - p
            } else if p > hi {
                p - hi
            } else {
                0.0
            };
            d2 += d * d;
        }
        d2
    }
}
