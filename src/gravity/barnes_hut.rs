use crate::geometry::Extent;
use crate::geometry::Vector;
use crate::gravity::moments::MassMoments;
use crate::gravity::moments::MultipoleOrder;
use crate::gravity::Gravity;
use crate::kernel::GravityLutKernel;
use crate::prelude::Float;
use crate::scheduler::Scheduler;
use crate::statistics::Statistics;
use crate::statistics::StatisticsId;
use crate::storage::QuantityId;
use crate::storage::Storage;

const MAX_DEPTH: usize = 40;
const LEAF_SIZE: usize = 16;

struct LeafData {
    index: u32,
    pos: Vector,
    mass: Float,
}

type Children = Box<[OctTree; 8]>;

enum Node {
    Tree(Children),
    Leaf(Vec<LeafData>),
}

struct OctTree {
    node: Node,
    moments: MassMoments,
    extent: Extent,
}

impl OctTree {
    fn make_empty_leaf_from_extent(extent: Extent) -> Self {
        Self {
            node: Node::Leaf(vec![]),
            moments: MassMoments::default(),
            extent,
        }
    }

    fn insert_new(&mut self, leaf_data: LeafData, depth: usize) {
        self.moments.add_mass_at(&leaf_data.pos, leaf_data.mass);
        self.insert(leaf_data, depth);
    }

    fn insert(&mut self, leaf_data: LeafData, depth: usize) {
        if let Node::Leaf(ref mut leaf) = self.node {
            if depth < MAX_DEPTH && leaf.len() >= LEAF_SIZE {
                self.subdivide(depth);
            } else {
                leaf.push(leaf_data);
                return;
            }
        }
        if let Node::Tree(ref mut children) = self.node {
            let octant = &mut children[self.extent.octant_index(&leaf_data.pos)];
            octant.insert_new(leaf_data, depth + 1);
        }
    }

    fn subdivide(&mut self, depth: usize) {
        debug_assert!(matches!(self.node, Node::Leaf(_)));
        let octants = self.extent.octants();
        let children = Box::new(octants.map(Self::make_empty_leaf_from_extent));
        let particles = match std::mem::replace(&mut self.node, Node::Tree(children)) {
            Node::Leaf(leaf) => leaf,
            Node::Tree(_) => unreachable!(),
        };
        for particle in particles {
            self.insert(particle, depth);
        }
    }
}

/// Barnes-Hut tree gravity: an octree over the particles where distant
/// nodes are accepted as multipoles when `size/distance < θ`, and
/// nearby interactions fall back to softened particle-particle forces.
/// The tree is rebuilt by `build` and immutable during evaluation.
pub struct BarnesHut {
    opening_angle: Float,
    order: MultipoleOrder,
    kernel: GravityLutKernel,
    root: Option<OctTree>,
    constant: Float,
}

struct TraversalCounts {
    approximated: usize,
    exact: usize,
}

impl BarnesHut {
    pub fn new(opening_angle: Float, order: MultipoleOrder, kernel: GravityLutKernel) -> Self {
        assert!(opening_angle > 0.0);
        Self {
            opening_angle,
            order,
            kernel,
            root: None,
            constant: crate::config::GRAVITY_CONSTANT,
        }
    }

    /// Overrides the gravitational constant, for scaled test problems.
    pub fn with_constant(mut self, constant: Float) -> Self {
        self.constant = constant;
        self
    }

    fn should_be_opened(&self, child: &OctTree, pos: &Vector) -> bool {
        let distance = pos.distance(child.extent.center());
        let length = child.extent.max_side_length();
        length >= distance * self.opening_angle
    }

    fn traverse(
        &self,
        tree: &OctTree,
        pos: &Vector,
        h: Float,
        self_index: Option<u32>,
        counts: &mut TraversalCounts,
    ) -> Vector {
        match tree.node {
            Node::Tree(ref children) => {
                let mut acc = Vector::ZERO;
                for child in children.iter() {
                    if child.moments.count() == 0 {
                        continue;
                    }
                    if self.should_be_opened(child, pos) {
                        acc += self.traverse(child, pos, h, self_index, counts);
                    } else {
                        counts.approximated += 1;
                        acc += child.moments.evaluate(pos, self.order) * self.constant;
                    }
                }
                acc
            }
            Node::Leaf(ref leaf) => {
                let mut acc = Vector::ZERO;
                for particle in leaf {
                    if self_index == Some(particle.index) {
                        continue;
                    }
                    counts.exact += 1;
                    let dr = *pos - particle.pos;
                    let dist = dr.length();
                    if dist == 0.0 {
                        continue;
                    }
                    // softened within the kernel support of the pair
                    let h_bar = 0.5 * (h + particle.pos.h());
                    let factor = if h_bar > 0.0 {
                        self.kernel.grad(dist, h_bar)
                    } else {
                        1.0 / (dist * dist * dist)
                    };
                    acc -= dr * (self.constant * particle.mass * factor);
                }
                acc
            }
        }
    }
}

fn build_subtree(extent: Extent, particles: Vec<LeafData>) -> OctTree {
    let mut tree = OctTree::make_empty_leaf_from_extent(extent);
    for particle in particles {
        tree.insert_new(particle, 1);
    }
    tree
}

impl Gravity for BarnesHut {
    fn build(&mut self, scheduler: &Scheduler, storage: &Storage) {
        let positions = storage.values::<Vector>(QuantityId::Position);
        let masses = storage.values::<Float>(QuantityId::Mass);
        let Some(extent) = Extent::from_positions(positions.iter()) else {
            self.root = None;
            return;
        };
        // pad so that boundary particles fall strictly inside
        let extent = extent.pad(1.0e-6 * extent.max_side_length().max(1.0));

        // partition by root octant, then build the eight subtrees
        // concurrently
        let mut groups: [Vec<LeafData>; 8] = Default::default();
        for (index, (pos, &mass)) in positions.iter().zip(masses).enumerate() {
            groups[extent.octant_index(pos)].push(LeafData {
                index: index as u32,
                pos: *pos,
                mass,
            });
        }
        let octants = extent.octants();
        let futures: Vec<_> = octants
            .into_iter()
            .zip(groups)
            .map(|(octant, group)| scheduler.submit(move || build_subtree(octant, group)))
            .collect();
        let children: Vec<OctTree> = futures.into_iter().map(|future| future.wait()).collect();
        let mut moments = MassMoments::default();
        for child in &children {
            moments += &child.moments;
        }
        let children: Box<[OctTree; 8]> = match children.try_into() {
            Ok(children) => Box::new(children),
            Err(_) => unreachable!("octant partition always yields eight subtrees"),
        };
        self.root = Some(OctTree {
            node: Node::Tree(children),
            moments,
            extent,
        });
    }

    fn eval_all(
        &self,
        scheduler: &Scheduler,
        storage: &Storage,
        dv: &mut [Vector],
        stats: &mut Statistics,
    ) {
        let Some(root) = &self.root else {
            return;
        };
        let positions = storage.values::<Vector>(QuantityId::Position);
        assert_eq!(dv.len(), positions.len());
        let granularity = scheduler.recommended_granularity(dv.len());
        let counts = std::sync::Mutex::new(TraversalCounts {
            approximated: 0,
            exact: 0,
        });
        // chunks are disjoint index ranges, so the writes do not alias
        let dv_addr = SendPtr(dv.as_mut_ptr());
        scheduler.parallel_for(0..positions.len(), granularity, |range| {
            let dv_addr = &dv_addr;
            let mut local = TraversalCounts {
                approximated: 0,
                exact: 0,
            };
            for i in range {
                let pos = positions[i];
                let acc = self.traverse(root, &pos, pos.h(), Some(i as u32), &mut local);
                unsafe {
                    *dv_addr.0.add(i) += acc;
                }
            }
            let mut counts = counts.lock().unwrap();
            counts.approximated += local.approximated;
            counts.exact += local.exact;
        });
        let counts = counts.into_inner().unwrap();
        stats.increment(
            StatisticsId::GravityNodesApproximated,
            counts.approximated as i64,
        );
        stats.increment(StatisticsId::GravityNodesExact, counts.exact as i64);
    }

    fn eval_at(&self, pos: Vector) -> Vector {
        let Some(root) = &self.root else {
            return Vector::ZERO;
        };
        let mut counts = TraversalCounts {
            approximated: 0,
            exact: 0,
        };
        self.traverse(root, &pos, pos.h(), None, &mut counts)
    }
}

struct SendPtr(*mut Vector);

// Safety: every index is written by exactly one parallel_for chunk.
unsafe impl Send for SendPtr {}
unsafe impl Sync for SendPtr {}
