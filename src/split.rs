//! Stratified, seeded train/test splitting

use crate::dataset::Dataset;
use crate::error::{HarnessError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::debug;

/// Row indices of a train/test partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Partitions a dataset into training and held-out subsets, preserving class proportions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSplitter {
    /// Fraction of samples held out for evaluation, in (0, 1)
    pub test_fraction: f64,
    /// Seed for the within-class shuffle
    pub seed: u64,
}

impl Default for DatasetSplitter {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl DatasetSplitter {
    pub fn new(test_fraction: f64) -> Self {
        Self {
            test_fraction,
            ..Default::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Split into `(train, test)` datasets
    pub fn split(&self, dataset: &Dataset) -> Result<(Dataset, Dataset)> {
        let indices = self.split_indices(dataset)?;
        Ok((dataset.subset(&indices.train), dataset.subset(&indices.test)))
    }

    /// Compute the stratified partition without copying any rows
    pub fn split_indices(&self, dataset: &Dataset) -> Result<SplitIndices> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(HarnessError::invalid_parameter(
                "test_fraction",
                self.test_fraction,
                "must lie strictly between 0 and 1",
            ));
        }

        // BTreeMap keeps class iteration order independent of hashing
        let mut class_indices: BTreeMap<i64, Vec<usize>> = BTreeMap::new();
        for (idx, &label) in dataset.labels().iter().enumerate() {
            class_indices.entry(label).or_default().push(idx);
        }

        if class_indices.len() < 2 {
            return Err(HarnessError::InsufficientData(format!(
                "need at least 2 distinct classes, found {}",
                class_indices.len()
            )));
        }
        if let Some((label, members)) = class_indices.iter().find(|(_, m)| m.len() < 2) {
            return Err(HarnessError::InsufficientData(format!(
                "class {} has {} member(s); stratification needs at least 2",
                label,
                members.len()
            )));
        }

        let n_samples = dataset.n_samples();
        let n_test = (self.test_fraction * n_samples as f64).ceil() as usize;
        if n_test == 0 || n_test >= n_samples {
            return Err(HarnessError::InsufficientData(format!(
                "test_fraction {} of {} samples leaves an empty subset",
                self.test_fraction, n_samples
            )));
        }

        let counts: Vec<usize> = class_indices.values().map(Vec::len).collect();
        let allocation = allocate_test_counts(&counts, n_samples, n_test);

        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        let mut train = Vec::with_capacity(n_samples - n_test);
        let mut test = Vec::with_capacity(n_test);

        for (members, &n_class_test) in class_indices.values().zip(allocation.iter()) {
            let mut members = members.clone();
            members.shuffle(&mut rng);
            test.extend_from_slice(&members[..n_class_test]);
            train.extend_from_slice(&members[n_class_test..]);
        }

        train.shuffle(&mut rng);
        test.shuffle(&mut rng);

        debug!(
            n_train = train.len(),
            n_test = test.len(),
            n_classes = class_indices.len(),
            seed = self.seed,
            "Stratified split computed"
        );

        Ok(SplitIndices { train, test })
    }
}

/// Convenience wrapper around [`DatasetSplitter`]
pub fn train_test_split(
    dataset: &Dataset,
    test_fraction: f64,
    seed: u64,
) -> Result<(Dataset, Dataset)> {
    DatasetSplitter::new(test_fraction).with_seed(seed).split(dataset)
}

/// Largest-remainder apportionment of `n_test` across classes.
///
/// Every class keeps at least one member on each side of the split. The
/// allocations sum to exactly `n_test` whenever that bound allows it, i.e.
/// `n_classes <= n_test <= n_samples - n_classes`.
fn allocate_test_counts(counts: &[usize], n_samples: usize, n_test: usize) -> Vec<usize> {
    let exact: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_test as f64 / n_samples as f64)
        .collect();
    let mut allocation: Vec<usize> = exact.iter().map(|e| e.floor() as usize).collect();

    let assigned: usize = allocation.iter().sum();
    let mut order: Vec<usize> = (0..counts.len()).collect();
    // Stable sort: equal remainders go to the lower label first
    order.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.partial_cmp(&ra).unwrap_or(std::cmp::Ordering::Equal)
    });
    for &class_idx in order.iter().take(n_test.saturating_sub(assigned)) {
        allocation[class_idx] += 1;
    }

    for (alloc, &count) in allocation.iter_mut().zip(counts) {
        *alloc = (*alloc).clamp(1, count - 1);
    }

    // Clamping may drift from `n_test`: give back from the largest test share,
    // or take from the class with the most training rows to spare
    let mut total: usize = allocation.iter().sum();
    while total > n_test {
        let donor = (0..counts.len())
            .filter(|&i| allocation[i] > 1)
            .max_by_key(|&i| (allocation[i], Reverse(i)));
        match donor {
            Some(i) => allocation[i] -= 1,
            None => break,
        }
        total -= 1;
    }
    while total < n_test {
        let receiver = (0..counts.len())
            .filter(|&i| allocation[i] + 1 < counts[i])
            .max_by_key(|&i| (counts[i] - allocation[i], Reverse(i)));
        match receiver {
            Some(i) => allocation[i] += 1,
            None => break,
        }
        total += 1;
    }
    allocation
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn labelled(labels: Vec<i64>) -> Dataset {
        let n = labels.len();
        let x = Array2::from_shape_fn((n, 2), |(i, j)| (i * 2 + j) as f64);
        Dataset::new(x, Array1::from_vec(labels)).unwrap()
    }

    #[test]
    fn test_split_is_deterministic() {
        let ds = labelled((0..50).map(|i| (i % 3) as i64).collect());
        let splitter = DatasetSplitter::new(0.2).with_seed(7);

        let a = splitter.split_indices(&ds).unwrap();
        let b = splitter.split_indices(&ds).unwrap();
        assert_eq!(a, b);

        let (train_a, test_a) = splitter.split(&ds).unwrap();
        let (train_b, test_b) = splitter.split(&ds).unwrap();
        assert_eq!(train_a, train_b);
        assert_eq!(test_a, test_b);
    }

    #[test]
    fn test_different_seeds_shuffle_differently() {
        let ds = labelled((0..100).map(|i| (i % 2) as i64).collect());
        let a = DatasetSplitter::new(0.2).with_seed(1).split_indices(&ds).unwrap();
        let b = DatasetSplitter::new(0.2).with_seed(2).split_indices(&ds).unwrap();
        assert_ne!(a.test, b.test);
    }

    #[test]
    fn test_split_is_a_partition() {
        let ds = labelled((0..37).map(|i| (i % 4) as i64).collect());
        let idx = DatasetSplitter::default().split_indices(&ds).unwrap();

        let mut all: Vec<usize> = idx.train.iter().chain(idx.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_class_proportions_preserved() {
        // 60 / 30 / 10 imbalance
        let mut labels = vec![0i64; 60];
        labels.extend(vec![1i64; 30]);
        labels.extend(vec![2i64; 10]);
        let ds = labelled(labels);

        let (train, test) = DatasetSplitter::new(0.25).split(&ds).unwrap();
        let full = ds.class_counts();
        let test_counts = test.class_counts();
        let train_counts = train.class_counts();

        for (label, &n) in &full {
            let expected_test = n as f64 * 0.25;
            let got_test = test_counts[label] as f64;
            assert!((got_test - expected_test).abs() <= 1.0, "class {label}");
            assert_eq!(train_counts[label] + test_counts[label], n);
        }
        assert_eq!(test.n_samples(), 25);
    }

    #[test]
    fn test_singleton_class_fails() {
        let ds = labelled(vec![0, 0, 0, 1, 1, 2]);
        let err = DatasetSplitter::default().split(&ds).unwrap_err();
        assert!(matches!(err, HarnessError::InsufficientData(_)));
    }

    #[test]
    fn test_single_class_fails() {
        let ds = labelled(vec![1; 10]);
        assert!(matches!(
            DatasetSplitter::default().split(&ds),
            Err(HarnessError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_empty_train_subset_fails() {
        let ds = labelled(vec![0, 0, 1, 1]);
        assert!(matches!(
            DatasetSplitter::new(0.9).split(&ds),
            Err(HarnessError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_fraction_out_of_range() {
        let ds = labelled(vec![0, 0, 1, 1]);
        for fraction in [0.0, 1.0, -0.5, f64::NAN] {
            assert!(matches!(
                DatasetSplitter::new(fraction).split(&ds),
                Err(HarnessError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_allocation_keeps_each_class_on_both_sides() {
        let alloc = allocate_test_counts(&[2, 2, 96], 100, 20);
        assert!(alloc.iter().all(|&a| a >= 1));
        assert_eq!(alloc[0], 1);
        assert_eq!(alloc[1], 1);
    }

    #[test]
    fn test_allocation_total_matches_test_size_after_clamping() {
        // Minority classes are raised to one: the surplus comes off the majority
        let alloc = allocate_test_counts(&[2, 2, 96], 100, 20);
        assert_eq!(alloc, vec![1, 1, 18]);

        // A class capped at count - 1 hands its share to one with room
        let alloc = allocate_test_counts(&[2, 2, 6], 10, 7);
        assert_eq!(alloc, vec![1, 1, 5]);

        let counts = [2usize, 2, 96];
        let ds = labelled(
            counts
                .iter()
                .enumerate()
                .flat_map(|(label, &n)| std::iter::repeat(label as i64).take(n))
                .collect(),
        );
        let (train, test) = DatasetSplitter::new(0.2).split(&ds).unwrap();
        assert_eq!(test.n_samples(), 20);
        assert_eq!(train.n_samples(), 80);
    }
}
