use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{BBox, Point3};

#[derive(Debug, Clone, Copy)]
struct BvhNode {
    bbox: BBox,
    left: u32,
    right: u32,
    start: u32,
    count: u32,
}

impl BvhNode {
    const fn leaf(bbox: BBox, start: u32, count: u32) -> Self {
        Self {
            bbox,
            left: u32::MAX,
            right: u32::MAX,
            start,
            count,
        }
    }

    const fn inner(bbox: BBox, left: u32, right: u32) -> Self {
        Self {
            bbox,
            left,
            right,
            start: 0,
            count: 0,
        }
    }

    const fn is_leaf(self) -> bool {
        self.count != 0
    }
}

/// Result of a nearest-neighbour query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Nearest {
    /// Row identity: position of the point in the slice the index was built from.
    pub index: usize,
    /// Euclidean distance to the query point.
    pub distance: f64,
}

/// Bounding volume hierarchy over a static point cloud.
///
/// Built once, never mutated, so shared references can be queried from any
/// number of threads. Tables that fit in a single leaf degrade to a linear scan
/// over that leaf; that only costs time, results are identical.
#[derive(Debug, Clone)]
pub struct PointBvh {
    nodes: Vec<BvhNode>,
    prim_indices: Vec<u32>,
    points: Vec<Point3>,
}

impl PointBvh {
    const DEFAULT_LEAF_SIZE: usize = 8;

    /// Builds the index. Returns `None` for an empty cloud or one with more
    /// than `u32::MAX` points.
    #[must_use]
    pub fn build(points: Vec<Point3>) -> Option<Self> {
        Self::build_with_leaf_size(points, Self::DEFAULT_LEAF_SIZE)
    }

    #[must_use]
    pub fn build_with_leaf_size(points: Vec<Point3>, leaf_size: usize) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let count = u32::try_from(points.len()).ok()?;

        let leaf_size = leaf_size.clamp(1, 256);
        let prim_indices: Vec<u32> = (0..count).collect();
        let nodes = Vec::with_capacity(points.len().saturating_mul(2) / leaf_size + 1);

        let mut bvh = Self {
            nodes,
            prim_indices,
            points,
        };
        let len = bvh.points.len();
        bvh.build_node(0, len, leaf_size);
        log::debug!(
            "bvh built over {} points with {} nodes",
            bvh.points.len(),
            bvh.nodes.len()
        );
        Some(bvh)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Points in their original order.
    #[must_use]
    pub fn points(&self) -> &[Point3] {
        &self.points
    }

    #[allow(clippy::cast_possible_truncation)]
    fn build_node(&mut self, start: usize, end: usize, leaf_size: usize) -> u32 {
        let node_index = self.nodes.len() as u32;
        let seed = BBox::from_point(self.points[self.prim_indices[start] as usize]);
        self.nodes.push(BvhNode::leaf(seed, 0, 0));

        let bbox = self.range_bbox(start, end);
        let count = end - start;

        if count <= leaf_size {
            self.nodes[node_index as usize] = BvhNode::leaf(bbox, start as u32, count as u32);
            return node_index;
        }

        let axis = bbox.longest_axis();
        let mid = start + count / 2;
        let points = &self.points;
        self.prim_indices[start..end].select_nth_unstable_by(mid - start, |a, b| {
            let ca = points[*a as usize].axis(axis);
            let cb = points[*b as usize].axis(axis);
            ca.total_cmp(&cb)
        });

        let left = self.build_node(start, mid, leaf_size);
        let right = self.build_node(mid, end, leaf_size);
        self.nodes[node_index as usize] = BvhNode::inner(bbox, left, right);
        node_index
    }

    fn range_bbox(&self, start: usize, end: usize) -> BBox {
        let mut bbox = BBox::from_point(self.points[self.prim_indices[start] as usize]);
        for &idx in &self.prim_indices[(start + 1)..end] {
            bbox = bbox.include(self.points[idx as usize]);
        }
        bbox
    }

    /// Closest stored point to `point`. Equidistant candidates resolve to the
    /// lowest row index.
    #[must_use]
    pub fn nearest(&self, point: Point3) -> Option<Nearest> {
        if self.nodes.is_empty() {
            return None;
        }

        let mut best_dist2 = f64::INFINITY;
        let mut best_prim: Option<usize> = None;

        let mut heap = BinaryHeap::new();
        heap.push(HeapEntry {
            dist2: self.nodes[0].bbox.distance_squared_to_point(point),
            node: 0u32,
        });

        while let Some(entry) = heap.pop() {
            // Equal distances are still visited so a lower row index can win the tie.
            if entry.dist2 > best_dist2 {
                break;
            }

            let node = self.nodes[entry.node as usize];
            if node.is_leaf() {
                let start = node.start as usize;
                let end = start + node.count as usize;
                for &prim in &self.prim_indices[start..end] {
                    let prim_idx = prim as usize;
                    let d2 = self.points[prim_idx].distance_squared_to(point);
                    if d2.is_nan() {
                        continue;
                    }
                    let closer = d2 < best_dist2;
                    let tie_wins = d2 == best_dist2 && best_prim.is_none_or(|best| prim_idx < best);
                    if closer || tie_wins {
                        best_dist2 = d2;
                        best_prim = Some(prim_idx);
                    }
                }
                continue;
            }

            for child in [node.left, node.right] {
                let child_dist2 = self.nodes[child as usize]
                    .bbox
                    .distance_squared_to_point(point);
                if child_dist2 <= best_dist2 {
                    heap.push(HeapEntry {
                        dist2: child_dist2,
                        node: child,
                    });
                }
            }
        }

        best_prim.map(|index| Nearest {
            index,
            distance: best_dist2.sqrt(),
        })
    }
}

#[derive(Debug, Clone, Copy)]
struct HeapEntry {
    dist2: f64,
    node: u32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.dist2 == other.dist2 && self.node == other.node
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse ordering so BinaryHeap acts as a min-heap on dist2.
        other
            .dist2
            .total_cmp(&self.dist2)
            .then_with(|| other.node.cmp(&self.node))
    }
}
