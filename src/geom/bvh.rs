//! Bounding volume hierarchy over primitive boxes, for "is anything within
//! distance d of this point" queries against large triangle soups.

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

#[derive(Debug, Clone)]
pub struct Bvh {
    nodes: Vec<BvhNode>,
    prims: Vec<u32>,
}

impl Bvh {
    const LEAF_SIZE: usize = 8;

    /// Median-split hierarchy over `bboxes`; `None` when there is nothing to index.
    #[must_use]
    pub fn build(bboxes: &[BBox]) -> Option<Self> {
        if bboxes.is_empty() {
            return None;
        }
        let mut bvh = Self {
            nodes: Vec::with_capacity(bboxes.len().saturating_mul(2)),
            prims: (0..bboxes.len() as u32).collect(),
        };
        bvh.build_node(bboxes, 0, bboxes.len());
        Some(bvh)
    }

    fn build_node(&mut self, bboxes: &[BBox], start: usize, end: usize) -> u32 {
        let index = self.nodes.len() as u32;
        let bbox = self.prims[start + 1..end]
            .iter()
            .fold(bboxes[self.prims[start] as usize], |acc, &p| acc.union(bboxes[p as usize]));
        self.nodes.push(BvhNode::leaf(bbox, start as u32, (end - start) as u32));

        if end - start <= Self::LEAF_SIZE {
            return index;
        }

        let axis = widest_centroid_axis(bboxes, &self.prims[start..end]);
        let mid = start + (end - start) / 2;
        self.prims[start..end].select_nth_unstable_by(mid - start, |a, b| {
            let ca = bboxes[*a as usize].center().to_array()[axis];
            let cb = bboxes[*b as usize].center().to_array()[axis];
            ca.total_cmp(&cb)
        });

        let left = self.build_node(bboxes, start, mid);
        let right = self.build_node(bboxes, mid, end);
        self.nodes[index as usize] = BvhNode::inner(bbox, left, right);
        index
    }

    /// Visits primitives whose box lies within `radius` of `point` until
    /// `hit` returns `true`. Returns whether any primitive was hit.
    pub fn any_within<F>(&self, point: Point3, radius: f64, mut hit: F) -> bool
    where
        F: FnMut(usize) -> bool,
    {
        let limit = radius * radius;
        let mut stack = vec![0u32];
        while let Some(node_index) = stack.pop() {
            let node = self.nodes[node_index as usize];
            if node.bbox.distance_squared_to(point) > limit {
                continue;
            }
            if node.is_leaf() {
                let start = node.start as usize;
                let end = start + node.count as usize;
                if self.prims[start..end].iter().any(|&p| hit(p as usize)) {
                    return true;
                }
                continue;
            }
            stack.push(node.left);
            stack.push(node.right);
        }
        false
    }
}

fn widest_centroid_axis(bboxes: &[BBox], prims: &[u32]) -> usize {
    let mut min = [f64::INFINITY; 3];
    let mut max = [f64::NEG_INFINITY; 3];
    for &p in prims {
        let c = bboxes[p as usize].center().to_array();
        for axis in 0..3 {
            min[axis] = min[axis].min(c[axis]);
            max[axis] = max[axis].max(c[axis]);
        }
    }
    let extent = [max[0] - min[0], max[1] - min[1], max[2] - min[2]];
    if extent[0] >= extent[1] && extent[0] >= extent[2] {
        0
    } else if extent[1] >= extent[2] {
        1
    } else {
        2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit_boxes_along_x(n: usize) -> Vec<BBox> {
        (0..n)
            .map(|i| {
                let x = i as f64 * 2.0;
                BBox::new(Point3::new(x, 0.0, 0.0), Point3::new(x + 1.0, 1.0, 1.0))
            })
            .collect()
    }

    #[test]
    fn empty_input_builds_nothing() {
        assert!(Bvh::build(&[]).is_none());
    }

    #[test]
    fn query_only_visits_nearby_boxes() {
        let boxes = unit_boxes_along_x(100);
        let bvh = Bvh::build(&boxes).unwrap();
        let mut visited = Vec::new();
        let found = bvh.any_within(Point3::new(41.5, 0.5, 0.5), 0.6, |p| {
            visited.push(p);
            false
        });
        assert!(!found);
        assert!(visited.contains(&20) && visited.contains(&21));
        assert!(visited.len() <= 2 * Bvh::LEAF_SIZE);

        assert!(bvh.any_within(Point3::new(41.5, 0.5, 3.0), 2.5, |p| p == 20));
        assert!(!bvh.any_within(Point3::new(41.5, 0.5, 3.0), 1.5, |_| true));
    }

    #[test]
    fn matches_brute_force() {
        let boxes = unit_boxes_along_x(37);
        let bvh = Bvh::build(&boxes).unwrap();
        for i in 0..80 {
            let p = Point3::new(i as f64 * 0.97 - 3.0, 1.6, 0.5);
            let expected = boxes.iter().any(|b| b.distance_squared_to(p) <= 0.36);
            let found = bvh.any_within(p, 0.6, |prim| boxes[prim].distance_squared_to(p) <= 0.36);
            assert_eq!(found, expected, "point {p:?}");
        }
    }
}
