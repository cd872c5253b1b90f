//! Isolation forest over fixed-width feature vectors.
//!
//! Points that are isolated by few random axis-aligned splits are outliers.
//! `decision_function` is shifted so that the `contamination` fraction of the
//! training set scores below zero.

use rand::rngs::StdRng;
use rand::seq::{index, SliceRandom};
use rand::{Rng, SeedableRng};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
const MAX_SUBSAMPLE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub contamination: f64,
    pub random_state: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        ForestParams {
            n_estimators: 100,
            contamination: 0.01,
            random_state: 42,
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
    root: usize,
}

impl IsolationTree {
    fn grow<const D: usize>(
        points: &[[f64; D]],
        indices: Vec<usize>,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = Vec::new();
        let root = Self::grow_node(points, indices, 0, max_depth, rng, &mut nodes);
        IsolationTree { nodes, root }
    }

    fn grow_node<const D: usize>(
        points: &[[f64; D]],
        indices: Vec<usize>,
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
        nodes: &mut Vec<Node>,
    ) -> usize {
        if depth >= max_depth || indices.len() <= 1 {
            nodes.push(Node::Leaf {
                size: indices.len(),
            });
            return nodes.len() - 1;
        }

        let mut features: Vec<usize> = (0..D).collect();
        features.shuffle(rng);
        for feature in features {
            let (min, max) = indices.iter().fold((f64::MAX, f64::MIN), |(lo, hi), &i| {
                (lo.min(points[i][feature]), hi.max(points[i][feature]))
            });
            if max <= min {
                continue;
            }
            let threshold = rng.random_range(min..max);
            let (left, right): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| points[i][feature] <= threshold);
            let left = Self::grow_node(points, left, depth + 1, max_depth, rng, nodes);
            let right = Self::grow_node(points, right, depth + 1, max_depth, rng, nodes);
            nodes.push(Node::Split {
                feature,
                threshold,
                left,
                right,
            });
            return nodes.len() - 1;
        }

        // Every feature is constant across this node.
        nodes.push(Node::Leaf {
            size: indices.len(),
        });
        nodes.len() - 1
    }

    fn path_length<const D: usize>(&self, point: &[f64; D]) -> f64 {
        let mut node = self.root;
        let mut depth = 0usize;
        loop {
            match self.nodes[node] {
                Node::Leaf { size } => return depth as f64 + average_path_length(size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if point[feature] <= threshold { left } else { right };
                    depth += 1;
                }
            }
        }
    }
}

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
pub struct IsolationForest<const D: usize> {
    trees: Vec<IsolationTree>,
    subsample_size: usize,
    offset: f64,
}

impl<const D: usize> IsolationForest<D> {
    /// Returns `None` for an empty training set.
    pub fn fit(points: &[[f64; D]], params: &ForestParams) -> Option<Self> {
        if points.is_empty() || params.n_estimators == 0 {
            return None;
        }
        let mut rng = StdRng::seed_from_u64(params.random_state);
        let subsample_size = points.len().min(MAX_SUBSAMPLE);
        let max_depth = (subsample_size.max(2) as f64).log2().ceil() as usize;

        let trees = (0..params.n_estimators)
            .map(|_| {
                let indices = index::sample(&mut rng, points.len(), subsample_size).into_vec();
                IsolationTree::grow(points, indices, max_depth, &mut rng)
            })
            .collect();

        let mut forest = IsolationForest {
            trees,
            subsample_size,
            offset: 0.0,
        };
        let mut training_scores: Vec<f64> = points.iter().map(|p| forest.score_sample(p)).collect();
        training_scores.sort_by(f64::total_cmp);
        forest.offset = percentile(&training_scores, params.contamination * 100.0);
        Some(forest)
    }

    /// Raw score in `[-1, 0)`; lower is more abnormal.
    pub fn score_sample(&self, point: &[f64; D]) -> f64 {
        let mean_depth = self
            .trees
            .iter()
            .map(|tree| tree.path_length(point))
            .sum::<f64>()
            / self.trees.len() as f64;
        let normaliser = average_path_length(self.subsample_size);
        if normaliser == 0.0 {
            return -1.0;
        }
        -(2f64.powf(-mean_depth / normaliser))
    }

    /// Negative for outliers, non-negative for inliers.
    pub fn decision_function(&self, point: &[f64; D]) -> f64 {
        self.score_sample(point) - self.offset
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    pub fn n_estimators(&self) -> usize {
        self.trees.len()
    }
}

/// Linear-interpolated percentile of an ascending slice, `q` in `[0, 100]`.
pub fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
        }
    }
}
