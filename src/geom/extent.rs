//! Estimate of how far a query may stray from the tabulated grid before it is
//! considered to lie outside the modelled structure.

use super::Point3;
use crate::units::AU;

/// Margin added to the combined grid gap, in metres.
pub const EXTENT_MARGIN: f64 = 0.1 * AU;

/// Largest gap between consecutive distinct values; zero for fewer than two.
#[must_use]
pub fn max_gap(values: impl IntoIterator<Item = f64>) -> f64 {
    let mut distinct: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
    distinct.sort_unstable_by(f64::total_cmp);
    distinct.dedup();

    distinct
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold(0.0, f64::max)
}

/// Distance threshold for the out-of-domain test: the Euclidean norm of the
/// per-axis maximum gaps plus [`EXTENT_MARGIN`].
#[must_use]
pub fn domain_extent(points: &[Point3]) -> f64 {
    let gaps: [f64; 3] =
        std::array::from_fn(|axis| max_gap(points.iter().map(|p| p.axis(axis))));
    let combined = Point3::from_array(gaps).norm();
    log::debug!(
        "grid gaps x={:e} y={:e} z={:e}, max_dist={:e}",
        gaps[0],
        gaps[1],
        gaps[2],
        combined + EXTENT_MARGIN
    );
    combined + EXTENT_MARGIN
}
