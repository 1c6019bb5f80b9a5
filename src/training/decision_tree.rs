//! CART decision trees
//!
//! [`Tree`] is the shared growing/prediction core: classification trees store
//! class proportions in their leaves, regression trees store a single mean.
//! [`DecisionTree`] is the standalone classifier; the forest and boosting
//! families reuse [`Tree`] directly.

use super::models::{
    check_fit_input, check_predict_input, decode_argmax, to_bincode, Classifier, LabelEncoder,
};
use crate::error::{HarnessError, Result};
use ndarray::{Array1, Array2, ArrayView1};
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Decision tree node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    /// Class proportions (classification) or `[mean]` (regression)
    Leaf { value: Vec<f64>, n_samples: usize },
    /// Rows with `x[feature_idx] <= threshold` go left
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Impurity criterion for classification trees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    #[default]
    Gini,
    Entropy,
}

/// Number of candidate features examined at each split
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    #[default]
    All,
    Sqrt,
    Log2,
    Fixed(usize),
}

impl MaxFeatures {
    pub fn resolve(&self, n_features: usize) -> usize {
        let m = match self {
            MaxFeatures::All => n_features,
            MaxFeatures::Sqrt => (n_features as f64).sqrt().round() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2().round() as usize,
            MaxFeatures::Fixed(m) => *m,
        };
        m.clamp(1, n_features.max(1))
    }
}

/// Growth limits shared by every tree family
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::All,
            criterion: Criterion::Gini,
        }
    }
}

impl TreeParams {
    pub(crate) fn validate(&self) -> Result<()> {
        if self.min_samples_split < 2 {
            return Err(HarnessError::invalid_parameter(
                "min_samples_split",
                self.min_samples_split,
                "must be at least 2",
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(HarnessError::invalid_parameter(
                "min_samples_leaf",
                0,
                "must be at least 1",
            ));
        }
        if self.max_depth == Some(0) {
            return Err(HarnessError::invalid_parameter("max_depth", 0, "must be at least 1"));
        }
        if self.max_features == MaxFeatures::Fixed(0) {
            return Err(HarnessError::invalid_parameter("max_features", 0, "must be at least 1"));
        }
        Ok(())
    }
}

/// Sufficient statistics of a node's targets
trait SplitTarget {
    type Stats: Clone;

    fn empty(&self) -> Self::Stats;
    fn add(&self, stats: &mut Self::Stats, idx: usize);
    fn difference(&self, total: &Self::Stats, part: &Self::Stats) -> Self::Stats;
    /// Impurity summed over the node's samples
    fn impurity(&self, stats: &Self::Stats) -> f64;
    fn leaf_value(&self, stats: &Self::Stats) -> Vec<f64>;
}

struct ClassTarget<'a> {
    y: &'a [usize],
    n_classes: usize,
    criterion: Criterion,
}

impl SplitTarget for ClassTarget<'_> {
    type Stats = Vec<f64>;

    fn empty(&self) -> Vec<f64> {
        vec![0.0; self.n_classes]
    }

    fn add(&self, stats: &mut Vec<f64>, idx: usize) {
        stats[self.y[idx]] += 1.0;
    }

    fn difference(&self, total: &Vec<f64>, part: &Vec<f64>) -> Vec<f64> {
        total.iter().zip(part).map(|(t, p)| t - p).collect()
    }

    fn impurity(&self, counts: &Vec<f64>) -> f64 {
        let n: f64 = counts.iter().sum();
        if n <= 0.0 {
            return 0.0;
        }
        match self.criterion {
            Criterion::Gini => n - counts.iter().map(|c| c * c).sum::<f64>() / n,
            Criterion::Entropy => counts
                .iter()
                .filter(|&&c| c > 0.0)
                .map(|&c| -c * (c / n).ln())
                .sum(),
        }
    }

    fn leaf_value(&self, counts: &Vec<f64>) -> Vec<f64> {
        let n: f64 = counts.iter().sum();
        counts.iter().map(|c| c / n.max(1.0)).collect()
    }
}

struct RegressionTarget<'a> {
    y: &'a [f64],
}

/// `(count, sum, sum of squares)`
type Moments = (f64, f64, f64);

impl SplitTarget for RegressionTarget<'_> {
    type Stats = Moments;

    fn empty(&self) -> Moments {
        (0.0, 0.0, 0.0)
    }

    fn add(&self, stats: &mut Moments, idx: usize) {
        let v = self.y[idx];
        stats.0 += 1.0;
        stats.1 += v;
        stats.2 += v * v;
    }

    fn difference(&self, total: &Moments, part: &Moments) -> Moments {
        (total.0 - part.0, total.1 - part.1, total.2 - part.2)
    }

    fn impurity(&self, stats: &Moments) -> f64 {
        if stats.0 <= 0.0 {
            return 0.0;
        }
        (stats.2 - stats.1 * stats.1 / stats.0).max(0.0)
    }

    fn leaf_value(&self, stats: &Moments) -> Vec<f64> {
        vec![if stats.0 > 0.0 { stats.1 / stats.0 } else { 0.0 }]
    }
}

struct BestSplit {
    feature_idx: usize,
    threshold: f64,
    cost: f64,
}

/// A grown tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tree {
    root: TreeNode,
    n_features: usize,
}

impl Tree {
    /// Grow a classification tree over `indices`; `y` holds encoded class indices
    pub(crate) fn grow_classification<R: Rng>(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
        importances: &mut [f64],
    ) -> Tree {
        let target = ClassTarget {
            y,
            n_classes,
            criterion: params.criterion,
        };
        let grower = Grower {
            x,
            target: &target,
            params,
            max_features: params.max_features.resolve(x.ncols()),
        };
        Tree {
            root: grower.grow(indices, 0, rng, importances),
            n_features: x.ncols(),
        }
    }

    /// Grow a least-squares regression tree over `indices`
    pub(crate) fn grow_regression<R: Rng>(
        x: &Array2<f64>,
        y: &[f64],
        indices: Vec<usize>,
        params: &TreeParams,
        rng: &mut R,
        importances: &mut [f64],
    ) -> Tree {
        let target = RegressionTarget { y };
        let grower = Grower {
            x,
            target: &target,
            params,
            max_features: params.max_features.resolve(x.ncols()),
        };
        Tree {
            root: grower.grow(indices, 0, rng, importances),
            n_features: x.ncols(),
        }
    }

    /// Leaf value reached by one row
    pub fn predict_row(&self, row: ArrayView1<f64>) -> &[f64] {
        let mut node = &self.root;
        loop {
            match node {
                TreeNode::Leaf { value, .. } => return value,
                TreeNode::Split {
                    feature_idx,
                    threshold,
                    left,
                    right,
                } => {
                    node = if row[*feature_idx] <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn depth(&self) -> usize {
        fn depth_of(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + depth_of(left).max(depth_of(right)),
            }
        }
        depth_of(&self.root)
    }
}

struct Grower<'a, T: SplitTarget> {
    x: &'a Array2<f64>,
    target: &'a T,
    params: &'a TreeParams,
    max_features: usize,
}

impl<T: SplitTarget> Grower<'_, T> {
    fn grow<R: Rng>(
        &self,
        indices: Vec<usize>,
        depth: usize,
        rng: &mut R,
        importances: &mut [f64],
    ) -> TreeNode {
        let mut stats = self.target.empty();
        for &i in &indices {
            self.target.add(&mut stats, i);
        }
        let node_impurity = self.target.impurity(&stats);
        let n_samples = indices.len();

        let should_stop = n_samples < self.params.min_samples_split
            || n_samples < 2 * self.params.min_samples_leaf
            || self.params.max_depth.map_or(false, |d| depth >= d)
            || node_impurity <= 1e-12;

        let best = if should_stop {
            None
        } else {
            self.best_split(&indices, &stats, rng)
        };

        match best {
            Some(split) if node_impurity - split.cost > 1e-12 => {
                importances[split.feature_idx] += node_impurity - split.cost;
                let (left_idx, right_idx): (Vec<usize>, Vec<usize>) = indices
                    .into_iter()
                    .partition(|&i| self.x[[i, split.feature_idx]] <= split.threshold);
                let left = self.grow(left_idx, depth + 1, rng, importances);
                let right = self.grow(right_idx, depth + 1, rng, importances);
                TreeNode::Split {
                    feature_idx: split.feature_idx,
                    threshold: split.threshold,
                    left: Box::new(left),
                    right: Box::new(right),
                }
            }
            _ => TreeNode::Leaf {
                value: self.target.leaf_value(&stats),
                n_samples,
            },
        }
    }

    fn best_split<R: Rng>(
        &self,
        indices: &[usize],
        total: &T::Stats,
        rng: &mut R,
    ) -> Option<BestSplit> {
        let n_features = self.x.ncols();
        let mut candidates: Vec<usize> = if self.max_features < n_features {
            sample(rng, n_features, self.max_features).into_vec()
        } else {
            (0..n_features).collect()
        };
        candidates.sort_unstable();

        let min_leaf = self.params.min_samples_leaf;
        let n = indices.len();
        let mut best: Option<BestSplit> = None;
        let mut sorted = indices.to_vec();

        for &f in &candidates {
            sorted.sort_by(|&a, &b| {
                self.x[[a, f]]
                    .partial_cmp(&self.x[[b, f]])
                    .unwrap_or(std::cmp::Ordering::Equal)
            });

            let mut left = self.target.empty();
            for pos in 0..n - 1 {
                self.target.add(&mut left, sorted[pos]);
                let n_left = pos + 1;
                let here = self.x[[sorted[pos], f]];
                let next = self.x[[sorted[pos + 1], f]];
                if next <= here || n_left < min_leaf || n - n_left < min_leaf {
                    continue;
                }

                let right = self.target.difference(total, &left);
                let cost = self.target.impurity(&left) + self.target.impurity(&right);
                if best.as_ref().map_or(true, |b| cost < b.cost - 1e-12) {
                    best = Some(BestSplit {
                        feature_idx: f,
                        threshold: here + (next - here) / 2.0,
                        cost,
                    });
                }
            }
        }

        best
    }
}

/// Decision tree hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionTreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub criterion: Criterion,
}

impl Default for DecisionTreeConfig {
    fn default() -> Self {
        let p = TreeParams::default();
        Self {
            max_depth: p.max_depth,
            min_samples_split: p.min_samples_split,
            min_samples_leaf: p.min_samples_leaf,
            max_features: p.max_features,
            criterion: p.criterion,
        }
    }
}

impl DecisionTreeConfig {
    pub fn params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: self.max_features,
            criterion: self.criterion,
        }
    }
}

/// Single CART classifier
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    config: DecisionTreeConfig,
    random_state: u64,
    encoder: LabelEncoder,
    tree: Option<Tree>,
    feature_importances: Option<Array1<f64>>,
}

impl Default for DecisionTree {
    fn default() -> Self {
        Self::new(DecisionTreeConfig::default())
    }
}

impl DecisionTree {
    pub fn new(config: DecisionTreeConfig) -> Self {
        Self {
            config,
            random_state: 0,
            encoder: LabelEncoder::default(),
            tree: None,
            feature_importances: None,
        }
    }

    /// Seed for feature subsampling
    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = seed;
        self
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Normalized impurity decrease per feature
    pub fn feature_importances(&self) -> Option<&Array1<f64>> {
        self.feature_importances.as_ref()
    }

    fn probabilities(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let tree = self.tree.as_ref().ok_or(HarnessError::ModelNotFitted)?;
        check_predict_input(x, tree.n_features())?;
        let k = self.encoder.n_classes();
        let mut out = Array2::zeros((x.nrows(), k));
        for (i, row) in x.rows().into_iter().enumerate() {
            for (c, &p) in tree.predict_row(row).iter().enumerate() {
                out[[i, c]] = p;
            }
        }
        Ok(out)
    }
}

pub(crate) fn normalize_importances(mut importances: Vec<f64>) -> Array1<f64> {
    let total: f64 = importances.iter().sum();
    if total > 0.0 {
        for imp in &mut importances {
            *imp /= total;
        }
    }
    Array1::from_vec(importances)
}

impl Classifier for DecisionTree {
    fn name(&self) -> &'static str {
        "decision_tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<i64>) -> Result<()> {
        let params = self.config.params();
        params.validate()?;
        check_fit_input(x, y)?;

        let encoder = LabelEncoder::fit(y);
        let encoded = encoder.encode(y)?;
        let mut rng = ChaCha8Rng::seed_from_u64(self.random_state);
        let mut importances = vec![0.0; x.ncols()];

        let tree = Tree::grow_classification(
            x,
            &encoded,
            encoder.n_classes(),
            (0..x.nrows()).collect(),
            &params,
            &mut rng,
            &mut importances,
        );

        self.encoder = encoder;
        self.tree = Some(tree);
        self.feature_importances = Some(normalize_importances(importances));
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<i64>> {
        let probs = self.probabilities(x)?;
        Ok(decode_argmax(&probs, &self.encoder))
    }

    fn predict_score(&self, x: &Array2<f64>) -> Result<Option<Array2<f64>>> {
        self.probabilities(x).map(Some)
    }

    fn classes(&self) -> &[i64] {
        self.encoder.classes()
    }

    fn to_bytes(&self) -> Result<Vec<u8>> {
        to_bincode(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Class 1 occupies a band in the middle, so two splits are needed
    fn band_data() -> (Array2<f64>, Array1<i64>) {
        let x = array![[0.0, 1.0], [1.0, 0.0], [2.0, 1.0], [3.0, 0.0], [4.0, 1.0], [5.0, 0.0]];
        let y = array![0, 0, 1, 1, 0, 0];
        (x, y)
    }

    #[test]
    fn test_tree_fits_band() {
        let (x, y) = band_data();
        let mut tree = DecisionTree::default();
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.predict(&x).unwrap(), y);
        assert_eq!(tree.tree().unwrap().depth(), 2);
    }

    #[test]
    fn test_max_depth_limits_growth() {
        let (x, y) = band_data();
        let mut tree = DecisionTree::new(DecisionTreeConfig {
            max_depth: Some(1),
            ..Default::default()
        });
        tree.fit(&x, &y).unwrap();
        assert!(tree.tree().unwrap().depth() <= 1);
    }

    #[test]
    fn test_entropy_criterion_and_importances() {
        let x = array![[0.0, 5.0], [1.0, 5.0], [2.0, 5.0], [3.0, 5.0]];
        let y = array![0, 0, 1, 1];
        let mut tree = DecisionTree::new(DecisionTreeConfig {
            criterion: Criterion::Entropy,
            ..Default::default()
        });
        tree.fit(&x, &y).unwrap();

        let imp = tree.feature_importances().unwrap();
        assert!((imp[0] - 1.0).abs() < 1e-12);
        assert_eq!(imp[1], 0.0);
        match tree.tree().unwrap().root() {
            TreeNode::Split { threshold, .. } => assert!((threshold - 1.5).abs() < 1e-12),
            TreeNode::Leaf { .. } => panic!("expected a split at the root"),
        }
    }

    #[test]
    fn test_regression_tree_means() {
        let x = array![[0.0], [1.0], [10.0], [11.0]];
        let y = [1.0, 1.0, 5.0, 7.0];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        let mut imp = vec![0.0];
        let params = TreeParams {
            max_depth: Some(1),
            ..Default::default()
        };
        let tree = Tree::grow_regression(&x, &y, vec![0, 1, 2, 3], &params, &mut rng, &mut imp);

        assert_eq!(tree.predict_row(x.row(0)), &[1.0]);
        assert_eq!(tree.predict_row(x.row(3)), &[6.0]);
    }

    #[test]
    fn test_invalid_min_samples_split() {
        let (x, y) = band_data();
        let mut tree = DecisionTree::new(DecisionTreeConfig {
            min_samples_split: 1,
            ..Default::default()
        });
        assert!(matches!(
            tree.fit(&x, &y),
            Err(HarnessError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn test_max_features_resolve() {
        assert_eq!(MaxFeatures::Sqrt.resolve(16), 4);
        assert_eq!(MaxFeatures::Log2.resolve(8), 3);
        assert_eq!(MaxFeatures::Fixed(50).resolve(7), 7);
        assert_eq!(MaxFeatures::All.resolve(7), 7);
    }
}
