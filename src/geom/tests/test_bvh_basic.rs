use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::geom::{Point3, PointBvh};

fn brute_force_nearest(points: &[Point3], query: Point3) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (idx, p) in points.iter().enumerate() {
        let d2 = p.distance_squared_to(query);
        if d2 < best.1 {
            best = (idx, d2);
        }
    }
    (best.0, best.1.sqrt())
}

fn random_cloud(rng: &mut StdRng, count: usize, span: f64) -> Vec<Point3> {
    (0..count)
        .map(|_| {
            Point3::new(
                rng.random_range(-span..span),
                rng.random_range(-span..span),
                rng.random_range(-span..span),
            )
        })
        .collect()
}

#[test]
fn bvh_rejects_empty_cloud() {
    assert!(PointBvh::build(Vec::new()).is_none());
}

#[test]
fn bvh_nearest_finds_closest_point() {
    let points = vec![
        Point3::new(10.0, 0.0, 0.0),
        Point3::new(1.0, 0.0, 0.0),
        Point3::new(-5.0, 0.0, 0.0),
    ];

    let bvh = PointBvh::build_with_leaf_size(points, 1).expect("bvh build");
    let hit = bvh.nearest(Point3::new(0.0, 0.5, 0.5)).expect("nearest hit");

    assert_eq!(hit.index, 1);
    assert!((hit.distance - 1.5f64.sqrt()).abs() < 1e-12);
}

#[test]
fn bvh_returns_own_row_for_every_stored_point() {
    let mut rng = StdRng::seed_from_u64(7);
    let points = random_cloud(&mut rng, 2_000, 1e12);
    let bvh = PointBvh::build(points.clone()).expect("bvh build");

    for (idx, p) in points.iter().enumerate() {
        let hit = bvh.nearest(*p).expect("nearest hit");
        assert_eq!(hit.index, idx);
        assert_eq!(hit.distance, 0.0);
    }
}

#[test]
fn bvh_matches_brute_force_on_random_queries() {
    let mut rng = StdRng::seed_from_u64(42);
    for leaf_size in [1, 4, 8, 64] {
        let points = random_cloud(&mut rng, 1_500, 50.0);
        let bvh = PointBvh::build_with_leaf_size(points.clone(), leaf_size).expect("bvh build");

        for _ in 0..300 {
            let query = Point3::new(
                rng.random_range(-80.0..80.0),
                rng.random_range(-80.0..80.0),
                rng.random_range(-80.0..80.0),
            );
            let hit = bvh.nearest(query).expect("nearest hit");
            let (expected_idx, expected_dist) = brute_force_nearest(&points, query);
            assert_eq!(hit.index, expected_idx, "leaf size {leaf_size}");
            assert!((hit.distance - expected_dist).abs() < 1e-9);
        }
    }
}

#[test]
fn bvh_ties_resolve_to_lowest_row() {
    // A regular grid with duplicates: every query in the middle of a cell is
    // equidistant from several rows.
    let mut points = Vec::new();
    for x in 0..6 {
        for y in 0..6 {
            for z in 0..6 {
                points.push(Point3::new(f64::from(x), f64::from(y), f64::from(z)));
            }
        }
    }
    let duplicates = points.clone();
    points.extend(duplicates);

    let bvh = PointBvh::build_with_leaf_size(points.clone(), 2).expect("bvh build");

    let on_point = bvh.nearest(Point3::new(3.0, 2.0, 1.0)).expect("nearest hit");
    assert_eq!(on_point.index, 3 * 36 + 2 * 6 + 1);

    let query = Point3::new(2.5, 2.5, 2.5);
    let hit = bvh.nearest(query).expect("nearest hit");
    let (expected_idx, _) = brute_force_nearest(&points, query);
    assert_eq!(hit.index, expected_idx);
    assert_eq!(hit.index, 2 * 36 + 2 * 6 + 2);
}

#[test]
fn bvh_single_leaf_behaves_like_scan() {
    let points = vec![
        Point3::new(0.0, 0.0, 0.0),
        Point3::new(2.0, 0.0, 0.0),
        Point3::new(0.0, 2.0, 0.0),
    ];
    let bvh = PointBvh::build(points).expect("bvh build");
    let hit = bvh.nearest(Point3::new(1.0, 0.0, 0.0)).expect("nearest hit");
    // Rows 0 and 1 are both at distance 1.
    assert_eq!(hit.index, 0);
    assert_eq!(hit.distance, 1.0);
    assert_eq!(bvh.len(), 3);
}
