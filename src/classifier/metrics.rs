//! Evaluation scores for a trained classifier

use super::{Classifier, DataClass};
use serde::Serialize;

/// Per-class and aggregate scores over a labeled dataset.
///
/// Rows of the confusion matrix are true classes, columns predicted classes.
/// Predictions rejected by the threshold are counted in `unsure` rather than
/// in any column.
#[derive(Debug, Clone, Serialize)]
pub struct Scores {
    pub labels: Vec<String>,
    pub confusion: Vec<Vec<usize>>,
    pub unsure: Vec<usize>,
    pub precision: Vec<f64>,
    pub recall: Vec<f64>,
    pub f1: Vec<f64>,
    pub precision_avg: f64,
    pub recall_avg: f64,
    pub f1_avg: f64,
    pub precision_weighted_avg: f64,
    pub recall_weighted_avg: f64,
    pub f1_weighted_avg: f64,
    pub accuracy: f64,
}

#[allow(clippy::cast_precision_loss)]
fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Classify every example in `dataset` and score the results
#[allow(clippy::cast_precision_loss)]
pub fn evaluate(classifier: &Classifier, dataset: &[DataClass]) -> Scores {
    let mut labels: Vec<String> = Vec::new();
    for class in dataset {
        if !labels.contains(&class.command) {
            labels.push(class.command.clone());
        }
    }
    for label in classifier.labels() {
        if !labels.contains(label) {
            labels.push(label.clone());
        }
    }

    let n = labels.len();
    let mut confusion = vec![vec![0usize; n]; n];
    let mut unsure = vec![0usize; n];

    for class in dataset {
        let Some(truth) = labels.iter().position(|l| *l == class.command) else {
            continue;
        };
        for text in &class.texts {
            let prediction = classifier.predict(text);
            match labels.iter().position(|l| *l == prediction.label) {
                Some(predicted) if !prediction.is_unsure() => confusion[truth][predicted] += 1,
                _ => unsure[truth] += 1,
            }
        }
    }

    let row_sums: Vec<usize> = (0..n)
        .map(|i| confusion[i].iter().sum::<usize>() + unsure[i])
        .collect();
    let col_sums: Vec<usize> = (0..n).map(|j| (0..n).map(|i| confusion[i][j]).sum()).collect();
    let total: usize = row_sums.iter().sum();
    let correct: usize = (0..n).map(|i| confusion[i][i]).sum();

    let precision: Vec<f64> = (0..n).map(|i| ratio(confusion[i][i], col_sums[i])).collect();
    let recall: Vec<f64> = (0..n).map(|i| ratio(confusion[i][i], row_sums[i])).collect();
    let f1: Vec<f64> = precision
        .iter()
        .zip(&recall)
        .map(|(p, r)| if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 })
        .collect();

    let avg = |values: &[f64]| {
        if n == 0 {
            0.0
        } else {
            values.iter().sum::<f64>() / n as f64
        }
    };
    let weighted = |values: &[f64]| {
        if total == 0 {
            0.0
        } else {
            values
                .iter()
                .zip(&row_sums)
                .map(|(v, &w)| v * w as f64)
                .sum::<f64>()
                / total as f64
        }
    };

    Scores {
        precision_avg: avg(&precision),
        recall_avg: avg(&recall),
        f1_avg: avg(&f1),
        precision_weighted_avg: weighted(&precision),
        recall_weighted_avg: weighted(&recall),
        f1_weighted_avg: weighted(&f1),
        accuracy: ratio(correct, total),
        labels,
        confusion,
        unsure,
        precision,
        recall,
        f1,
    }
}
