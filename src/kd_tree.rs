use std::cmp::Reverse;
use std::collections::BinaryHeap;

use anyhow::{bail, Result};

use crate::feature::{descriptor_dist_sq, Descriptor};

/// Binary partition tree over descriptor space. Nodes own their children;
/// leaves store indices into the template slice the tree was built from,
/// so the tree never copies or outlives the template.
enum Node {
    Leaf {
        index: usize,
    },
    Split {
        dim: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

/// K-d tree over a fixed descriptor set, append-only at construction and
/// read-only afterward.
pub struct KdTree {
    root: Node,
    dim: usize,
    leaf_count: usize,
}

/// One query result: template index plus squared descriptor distance.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub dist_sq: f64,
}

/// Priority-queue entry for best-bin-first search, keyed by the squared
/// distance from the query to the bin's splitting hyperplane.
struct Bin<'a> {
    dist_sq: f64,
    node: &'a Node,
}

impl PartialEq for Bin<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.dist_sq == other.dist_sq
    }
}

impl Eq for Bin<'_> {}

impl PartialOrd for Bin<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Bin<'_> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist_sq.total_cmp(&other.dist_sq)
    }
}

impl KdTree {
    /// Build a balanced tree over `features`. Every descriptor must have
    /// the same nonzero length.
    pub fn build(features: &[Descriptor]) -> Result<KdTree> {
        if features.is_empty() {
            bail!("cannot build a k-d tree from an empty feature set");
        }
        let dim = features[0].len();
        if dim == 0 {
            bail!("cannot build a k-d tree over zero-length descriptors");
        }
        for (i, feature) in features.iter().enumerate() {
            if feature.len() != dim {
                bail!(
                    "descriptor {} has dimension {}, expected {}",
                    i,
                    feature.len(),
                    dim
                );
            }
        }

        let mut indices: Vec<usize> = (0..features.len()).collect();
        let root = build_node(features, &mut indices);
        Ok(KdTree {
            root,
            dim,
            leaf_count: features.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.leaf_count
    }

    pub fn is_empty(&self) -> bool {
        self.leaf_count == 0
    }

    /// Best-bin-first k-nearest-neighbor query, examining at most
    /// `max_checks` leaves. Results come back in ascending squared
    /// distance. The search is exact once `max_checks` covers the whole
    /// tree; smaller budgets trade accuracy for speed. A query whose
    /// dimensionality does not match the tree is disqualified outright
    /// and returns no neighbors.
    pub fn knn(
        &self,
        features: &[Descriptor],
        query: &[f64],
        k: usize,
        max_checks: usize,
    ) -> Vec<Neighbor> {
        if k == 0 || query.len() != self.dim {
            return vec![];
        }

        let mut best: Vec<Neighbor> = Vec::with_capacity(k + 1);
        let mut bins = BinaryHeap::new();
        bins.push(Reverse(Bin {
            dist_sq: 0.,
            node: &self.root,
        }));

        let mut checks = 0;
        while let Some(Reverse(bin)) = bins.pop() {
            if checks >= max_checks {
                break;
            }
            // A bin further than the current k-th best cannot contribute.
            if best.len() == k && bin.dist_sq > best[k - 1].dist_sq {
                continue;
            }

            let mut node = bin.node;
            loop {
                match node {
                    Node::Leaf { index } => {
                        checks += 1;
                        let dist_sq = descriptor_dist_sq(&features[*index].vector, query);
                        if dist_sq.is_finite() {
                            let pos = best.partition_point(|n| n.dist_sq <= dist_sq);
                            if pos < k {
                                best.insert(
                                    pos,
                                    Neighbor {
                                        index: *index,
                                        dist_sq,
                                    },
                                );
                                best.truncate(k);
                            }
                        }
                        break;
                    }
                    Node::Split {
                        dim,
                        threshold,
                        left,
                        right,
                    } => {
                        let delta = query[*dim] - *threshold;
                        let (near, far) = if delta <= 0. {
                            (&**left, &**right)
                        } else {
                            (&**right, &**left)
                        };
                        bins.push(Reverse(Bin {
                            dist_sq: delta * delta,
                            node: far,
                        }));
                        node = near;
                    }
                }
            }
        }
        best
    }
}

fn build_node(features: &[Descriptor], indices: &mut [usize]) -> Node {
    if indices.len() == 1 {
        return Node::Leaf { index: indices[0] };
    }

    // Split on the dimension of greatest spread among the remaining
    // features, at the median element.
    let dim_count = features[indices[0]].len();
    let mut split_dim = 0;
    let mut best_spread = f64::NEG_INFINITY;
    for dim in 0..dim_count {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for &i in indices.iter() {
            let v = features[i].vector[dim];
            min = min.min(v);
            max = max.max(v);
        }
        if max - min > best_spread {
            best_spread = max - min;
            split_dim = dim;
        }
    }

    let mid = indices.len() / 2;
    indices.select_nth_unstable_by(mid, |&a, &b| {
        features[a].vector[split_dim].total_cmp(&features[b].vector[split_dim])
    });
    let threshold = features[indices[mid]].vector[split_dim];

    let (left_indices, right_indices) = indices.split_at_mut(mid);
    Node::Split {
        dim: split_dim,
        threshold,
        left: Box::new(build_node(features, left_indices)),
        right: Box::new(build_node(features, right_indices)),
    }
}
