use std::collections::BinaryHeap;

use ordered_float::OrderedFloat;

use crate::finders::FinderBase;
use crate::finders::NeighborFinder;
use crate::finders::NeighborRecord;
use crate::geometry::Extent;
use crate::geometry::Vector;
use crate::prelude::Float;
use crate::scheduler::Scheduler;

pub const DEFAULT_LEAF_SIZE: usize = 25;

/// Sub-trees below this size are built on the caller thread.
const PARALLEL_BUILD_THRESHOLD: usize = 2048;

#[derive(Clone, Debug)]
enum KdNode {
    /// The left child immediately follows its parent; the right child
    /// is at `self + right_offset`, which stays valid when sub-tree
    /// node lists are concatenated.
    Inner {
        axis: usize,
        split: Float,
        right_offset: u32,
    },
    Leaf {
        from: u32,
        to: u32,
    },
}

/// K-d tree with median splits along the longest axis of the node
/// extent. Rebuilt every step; the build recursion forks into the
/// scheduler above a size threshold.
pub struct KdTree {
    leaf_size: usize,
    base: FinderBase,
    nodes: Vec<KdNode>,
    /// Point indices permuted into leaf order.
    ordered: Vec<u32>,
}

impl KdTree {
    pub fn new(leaf_size: usize) -> Self {
        assert!(leaf_size > 0);
        Self {
            leaf_size,
            base: FinderBase::default(),
            nodes: vec![],
            ordered: vec![],
        }
    }

    fn build_recursive(
        points: &[Vector],
        indices: &mut [u32],
        offset: usize,
        leaf_size: usize,
        scheduler: &Scheduler,
    ) -> Vec<KdNode> {
        if indices.len() <= leaf_size {
            return vec![KdNode::Leaf {
                from: offset as u32,
                to: (offset + indices.len()) as u32,
            }];
        }
        let extent =
            Extent::from_positions(indices.iter().map(|&i| &points[i as usize])).unwrap();
        let side = extent.side_lengths();
        let axis = if side.x() >= side.y() && side.x() >= side.z() {
            0
        } else if side.y() >= side.z() {
            1
        } else {
            2
        };
        let mid = indices.len() / 2;
        indices.select_nth_unstable_by(mid, |&a, &b| {
            points[a as usize][axis]
                .partial_cmp(&points[b as usize][axis])
                .unwrap()
                .then(a.cmp(&b))
        });
        let split = points[indices[mid] as usize][axis];
        let total_len = indices.len();
        let (left_indices, right_indices) = indices.split_at_mut(mid);
        let right_offset = offset + mid;
        let (left, right) = if total_len >= PARALLEL_BUILD_THRESHOLD {
            scheduler.parallel_invoke(
                || Self::build_recursive(points, left_indices, offset, leaf_size, scheduler),
                || {
                    Self::build_recursive(
                        points,
                        right_indices,
                        right_offset,
                        leaf_size,
                        scheduler,
                    )
                },
            )
        } else {
            (
                Self::build_recursive(points, left_indices, offset, leaf_size, scheduler),
                Self::build_recursive(points, right_indices, right_offset, leaf_size, scheduler),
            )
        };
        let mut nodes = Vec::with_capacity(1 + left.len() + right.len());
        nodes.push(KdNode::Inner {
            axis,
            split,
            right_offset: (1 + left.len()) as u32,
        });
        nodes.extend(left);
        nodes.extend(right);
        nodes
    }

    fn find_filtered(
        &self,
        pos: Vector,
        radius: Float,
        max_rank: Option<u32>,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        neighs.clear();
        if self.nodes.is_empty() {
            return 0;
        }
        let radius_sqr = radius * radius;
        let mut stack = vec![0usize];
        while let Some(node) = stack.pop() {
            match self.nodes[node] {
                KdNode::Inner {
                    axis,
                    split,
                    right_offset,
                } => {
                    let signed_dist = pos[axis] - split;
                    if signed_dist <= radius {
                        stack.push(node + 1);
                    }
                    if signed_dist >= -radius {
                        stack.push(node + right_offset as usize);
                    }
                }
                KdNode::Leaf { from, to } => {
                    for &index in &self.ordered[from as usize..to as usize] {
                        let index = index as usize;
                        let dist_sqr = self.base.points[index].distance_sqr(pos);
                        if dist_sqr < radius_sqr
                            && max_rank.map_or(true, |rank| self.base.rank[index] < rank)
                        {
                            neighs.push(NeighborRecord { index, dist_sqr });
                        }
                    }
                }
            }
        }
        neighs.len()
    }

    /// The `k` nearest neighbors of a point, closest first.
    pub fn find_k_nearest(&self, pos: Vector, k: usize) -> Vec<NeighborRecord> {
        if k == 0 || self.nodes.is_empty() {
            return vec![];
        }
        let mut heap: BinaryHeap<(OrderedFloat<Float>, usize)> = BinaryHeap::new();
        self.k_nearest_recursive(0, pos, k, &mut heap);
        let mut result: Vec<NeighborRecord> = heap
            .into_iter()
            .map(|(dist_sqr, index)| NeighborRecord {
                index,
                dist_sqr: dist_sqr.0,
            })
            .collect();
        result.sort_by(|a, b| {
            a.dist_sqr
                .partial_cmp(&b.dist_sqr)
                .unwrap()
                .then(a.index.cmp(&b.index))
        });
        result
    }

    fn k_nearest_recursive(
        &self,
        node: usize,
        pos: Vector,
        k: usize,
        heap: &mut BinaryHeap<(OrderedFloat<Float>, usize)>,
    ) {
        match self.nodes[node] {
            KdNode::Inner {
                axis,
                split,
                right_offset,
            } => {
                let signed_dist = pos[axis] - split;
                let (near, far) = if signed_dist <= 0.0 {
                    (node + 1, node + right_offset as usize)
                } else {
                    (node + right_offset as usize, node + 1)
                };
                self.k_nearest_recursive(near, pos, k, heap);
                let worst = heap
                    .peek()
                    .map(|(dist_sqr, _)| dist_sqr.0)
                    .unwrap_or(Float::INFINITY);
                if heap.len() < k || signed_dist * signed_dist < worst {
                    self.k_nearest_recursive(far, pos, k, heap);
                }
            }
            KdNode::Leaf { from, to } => {
                for &index in &self.ordered[from as usize..to as usize] {
                    let index = index as usize;
                    let dist_sqr = self.base.points[index].distance_sqr(pos);
                    if heap.len() < k {
                        heap.push((OrderedFloat(dist_sqr), index));
                    } else if dist_sqr < heap.peek().unwrap().0 .0 {
                        heap.pop();
                        heap.push((OrderedFloat(dist_sqr), index));
                    }
                }
            }
        }
    }
}

impl Default for KdTree {
    fn default() -> Self {
        Self::new(DEFAULT_LEAF_SIZE)
    }
}

impl NeighborFinder for KdTree {
    fn build(&mut self, scheduler: &Scheduler, points: &[Vector]) {
        self.base.build(points);
        let mut indices: Vec<u32> = (0..points.len() as u32).collect();
        self.nodes = if points.is_empty() {
            vec![]
        } else {
            Self::build_recursive(points, &mut indices, 0, self.leaf_size, scheduler)
        };
        self.ordered = indices;
    }

    fn find_all(&self, pos: Vector, radius: Float, neighs: &mut Vec<NeighborRecord>) -> usize {
        self.find_filtered(pos, radius, None, neighs)
    }

    fn find_all_of(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.find_filtered(self.base.points[index], radius, None, neighs)
    }

    fn find_lower_rank(
        &self,
        index: usize,
        radius: Float,
        neighs: &mut Vec<NeighborRecord>,
    ) -> usize {
        self.find_filtered(
            self.base.points[index],
            radius,
            Some(self.base.rank[index]),
            neighs,
        )
    }

    fn rank_of(&self, index: usize) -> u32 {
        self.base.rank[index]
    }

    fn point(&self, index: usize) -> Vector {
        self.base.points[index]
    }

    fn point_count(&self) -> usize {
        self.base.points.len()
    }
}
