mod bvh;
mod core;
mod extent;

pub use bvh::{Nearest, PointBvh};
pub use self::core::{BBox, Point3};
pub use extent::{EXTENT_MARGIN, domain_extent, max_gap};

#[cfg(test)]
mod tests;
