//! Multinomial logistic regression over routing features.
//!
//! Deterministic end to end: the train/test split uses a fixed seed and the
//! optimiser is plain batch gradient descent, so the same rows always produce
//! the same model.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::error::PredictionError;

/// Optimiser and split settings
#[derive(Debug, Clone, Copy)]
pub struct TrainingOptions {
    pub learning_rate: f64,
    pub epochs: usize,
    /// L2 penalty on non-bias weights
    pub l2: f64,
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            learning_rate: 0.5,
            epochs: 400,
            l2: 1e-4,
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

/// Trained softmax classifier. Immutable once fitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    labels: Vec<String>,
    dimension: usize,
    means: Vec<f64>,
    scales: Vec<f64>,
    /// One row per label; the last column is the bias
    weights: Vec<Vec<f64>>,
}

impl SoftmaxClassifier {
    /// Fit on `features` (rows of equal length) and `labels`.
    ///
    /// Returns `None` for an empty or ragged training set.
    pub fn fit(features: &[Vec<f64>], labels: &[String], options: &TrainingOptions) -> Option<Self> {
        let first = features.first()?;
        let dimension = first.len();
        if features.len() != labels.len() || features.iter().any(|row| row.len() != dimension) {
            return None;
        }

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        let targets: Vec<usize> = labels
            .iter()
            .filter_map(|l| classes.binary_search(l).ok())
            .collect();

        let (means, scales) = standardisation(features, dimension);
        let inputs: Vec<Vec<f64>> = features
            .iter()
            .map(|row| standardise(row, &means, &scales))
            .collect();

        let k = classes.len();
        let n = inputs.len() as f64;
        let mut weights = vec![vec![0.0; dimension + 1]; k];

        for _ in 0..options.epochs {
            let mut gradients = vec![vec![0.0; dimension + 1]; k];
            for (x, &target) in inputs.iter().zip(&targets) {
                let probs = softmax(&logits(&weights, x));
                for (class, p) in probs.iter().enumerate() {
                    let err = p - if class == target { 1.0 } else { 0.0 };
                    let grad = &mut gradients[class];
                    for (g, xi) in grad.iter_mut().zip(x) {
                        *g += err * xi;
                    }
                    grad[dimension] += err;
                }
            }
            for (w_row, g_row) in weights.iter_mut().zip(&gradients) {
                for (j, (w, g)) in w_row.iter_mut().zip(g_row).enumerate() {
                    let penalty = if j < dimension { options.l2 * *w } else { 0.0 };
                    *w -= options.learning_rate * (g / n + penalty);
                }
            }
        }

        Some(Self {
            labels: classes,
            dimension,
            means,
            scales,
            weights,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Class probabilities in `labels()` order
    pub fn predict_proba(&self, features: &[f64]) -> Result<Vec<f64>, PredictionError> {
        if features.len() != self.dimension {
            return Err(PredictionError::DimensionMismatch {
                expected: self.dimension,
                actual: features.len(),
            });
        }
        let x = standardise(features, &self.means, &self.scales);
        let probs = softmax(&logits(&self.weights, &x));
        if probs.iter().any(|p| !p.is_finite()) {
            return Err(PredictionError::Degenerate);
        }
        Ok(probs)
    }

    /// Most probable label and its probability
    pub fn predict(&self, features: &[f64]) -> Result<(String, f64), PredictionError> {
        let probs = self.predict_proba(features)?;
        probs
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(idx, p)| (self.labels[idx].clone(), *p))
            .ok_or(PredictionError::Degenerate)
    }
}

fn standardisation(features: &[Vec<f64>], dimension: usize) -> (Vec<f64>, Vec<f64>) {
    let n = features.len() as f64;
    let mut means = vec![0.0; dimension];
    for row in features {
        for (m, v) in means.iter_mut().zip(row) {
            *m += v / n;
        }
    }
    let mut scales = vec![0.0; dimension];
    for row in features {
        for ((s, v), m) in scales.iter_mut().zip(row).zip(&means) {
            *s += (v - m).powi(2) / n;
        }
    }
    for s in scales.iter_mut() {
        *s = if *s > 1e-12 { s.sqrt() } else { 1.0 };
    }
    (means, scales)
}

fn standardise(row: &[f64], means: &[f64], scales: &[f64]) -> Vec<f64> {
    row.iter()
        .zip(means)
        .zip(scales)
        .map(|((v, m), s)| (v - m) / s)
        .collect()
}

fn logits(weights: &[Vec<f64>], x: &[f64]) -> Vec<f64> {
    weights
        .iter()
        .map(|w| {
            let (bias, coef) = match w.split_last() {
                Some((bias, coef)) => (*bias, coef),
                None => (0.0, &[][..]),
            };
            coef.iter().zip(x).map(|(c, v)| c * v).sum::<f64>() + bias
        })
        .collect()
}

fn softmax(logits: &[f64]) -> Vec<f64> {
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let total: f64 = exps.iter().sum();
    exps.iter().map(|e| e / total).collect()
}

/// Result of a train/test split over row indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Split {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
    pub stratified: bool,
}

/// Deterministic train/test split.
///
/// Stratified per label when every label has at least two rows, otherwise a
/// seeded shuffle of all rows. The test set takes `test_fraction` of the rows
/// (rounded up, at least one) while leaving at least one training row.
pub fn train_test_split(labels: &[String], test_fraction: f64, seed: u64) -> Split {
    let n = labels.len();
    if n < 2 {
        return Split {
            train: (0..n).collect(),
            test: Vec::new(),
            stratified: false,
        };
    }

    let mut by_label: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (idx, label) in labels.iter().enumerate() {
        by_label.entry(label.as_str()).or_default().push(idx);
    }
    let stratified = by_label.values().all(|rows| rows.len() >= 2);
    let mut rng = StdRng::seed_from_u64(seed);

    let (mut train, mut test) = (Vec::new(), Vec::new());
    if stratified {
        for rows in by_label.values_mut() {
            rows.shuffle(&mut rng);
            let n_test = test_count(rows.len(), test_fraction);
            test.extend_from_slice(&rows[..n_test]);
            train.extend_from_slice(&rows[n_test..]);
        }
    } else {
        let mut rows: Vec<usize> = (0..n).collect();
        rows.shuffle(&mut rng);
        let n_test = test_count(n, test_fraction);
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();

    Split {
        train,
        test,
        stratified,
    }
}

fn test_count(rows: usize, fraction: f64) -> usize {
    let wanted = (rows as f64 * fraction).ceil() as usize;
    wanted.clamp(1, rows - 1)
}

/// Precision/recall breakdown for one label
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

/// Per-label metrics over `(actual, predicted)` pairs. Zero division yields 0.
pub fn classification_report(
    actual: &[String],
    predicted: &[String],
) -> BTreeMap<String, ClassMetrics> {
    let mut labels: Vec<&String> = actual.iter().chain(predicted).collect();
    labels.sort();
    labels.dedup();

    labels
        .into_iter()
        .map(|label| {
            let tp = actual
                .iter()
                .zip(predicted)
                .filter(|(a, p)| *a == label && *p == label)
                .count();
            let predicted_pos = predicted.iter().filter(|p| *p == label).count();
            let support = actual.iter().filter(|a| *a == label).count();

            let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
            let precision = ratio(tp, predicted_pos);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };

            (
                label.clone(),
                ClassMetrics {
                    precision,
                    recall,
                    f1,
                    support,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_fit_separable_data() {
        let mut features = Vec::new();
        let mut targets = Vec::new();
        for i in 0..20 {
            let v = i as f64 / 20.0;
            features.push(vec![v, 0.5]);
            targets.push("flash".to_string());
            features.push(vec![v + 2.0, 0.5]);
            targets.push("opus".to_string());
        }

        let model = SoftmaxClassifier::fit(&features, &targets, &TrainingOptions::default()).unwrap();
        assert_eq!(model.labels(), &["flash".to_string(), "opus".to_string()]);

        let (label, confidence) = model.predict(&[0.1, 0.5]).unwrap();
        assert_eq!(label, "flash");
        assert!(confidence > 0.5);
        let (label, _) = model.predict(&[2.9, 0.5]).unwrap();
        assert_eq!(label, "opus");
    }

    #[test]
    fn test_probabilities_sum_to_one() {
        let features = vec![vec![0.0], vec![1.0], vec![2.0]];
        let targets = labels(&["a", "b", "c"]);
        let model = SoftmaxClassifier::fit(&features, &targets, &TrainingOptions::default()).unwrap();

        let probs = model.predict_proba(&[1.5]).unwrap();
        assert_eq!(probs.len(), 3);
        assert!((probs.iter().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_dimension_mismatch() {
        let model =
            SoftmaxClassifier::fit(&[vec![0.0, 1.0]], &labels(&["a"]), &TrainingOptions::default())
                .unwrap();
        assert!(matches!(
            model.predict(&[1.0]),
            Err(PredictionError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_fit_rejects_empty_and_ragged() {
        assert!(SoftmaxClassifier::fit(&[], &[], &TrainingOptions::default()).is_none());
        let ragged = vec![vec![0.0], vec![0.0, 1.0]];
        assert!(SoftmaxClassifier::fit(&ragged, &labels(&["a", "b"]), &TrainingOptions::default()).is_none());
    }

    #[test]
    fn test_stratified_split() {
        let targets = labels(&["a", "a", "a", "a", "a", "b", "b", "b", "b", "b"]);
        let split = train_test_split(&targets, 0.2, 42);
        assert!(split.stratified);
        assert_eq!(split.test.len(), 2);
        assert_eq!(split.train.len(), 8);
        let test_labels: Vec<_> = split.test.iter().map(|&i| targets[i].as_str()).collect();
        assert!(test_labels.contains(&"a"));
        assert!(test_labels.contains(&"b"));
    }

    #[test]
    fn test_unstratified_split_with_singleton_class() {
        let targets = labels(&["a", "a", "a", "a", "b"]);
        let split = train_test_split(&targets, 0.2, 42);
        assert!(!split.stratified);
        assert_eq!(split.test.len(), 1);
        assert_eq!(split.train.len(), 4);
    }

    #[test]
    fn test_split_is_deterministic() {
        let targets = labels(&["a", "b", "a", "b", "a", "b", "a", "b"]);
        assert_eq!(
            train_test_split(&targets, 0.2, 42),
            train_test_split(&targets, 0.2, 42)
        );
    }

    #[test]
    fn test_split_partitions_rows_for_any_seed() {
        let targets: Vec<String> = (0..40)
            .map(|i| if i % 3 == 0 { "a" } else { "b" }.to_string())
            .collect();
        for seed in [0, 1, 7, u64::MAX] {
            let split = train_test_split(&targets, 0.25, seed);
            let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
            all.sort_unstable();
            assert_eq!(all, (0..40).collect::<Vec<_>>());
            assert!(split.test.iter().all(|i| !split.train.contains(i)));
        }
    }

    #[test]
    fn test_classification_report() {
        let actual = labels(&["a", "a", "b", "b"]);
        let predicted = labels(&["a", "b", "b", "b"]);
        let report = classification_report(&actual, &predicted);

        assert_eq!(report["a"].precision, 1.0);
        assert_eq!(report["a"].recall, 0.5);
        assert_eq!(report["a"].support, 2);
        assert!((report["b"].precision - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(report["b"].recall, 1.0);
    }
}
