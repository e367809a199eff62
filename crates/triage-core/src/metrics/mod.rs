//! Held-out evaluation of diagnostic models.
//!
//! - [`stratified_split`]: per-class shuffled train/test split
//! - [`undersample`]: random undersampling down to the minority class
//! - [`evaluate`]: accuracy, per-class precision/recall/F1, macro and
//!   weighted averages, confusion matrix
//!
//! Shuffles use a `ChaCha20Rng` seeded from the caller's seed, so splits are
//! reproducible across runs and platforms. Ratios with a zero denominator are
//! reported as 0.0.

use std::collections::BTreeSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::engine::errors::TriageError;
use crate::engine::learn::DiagnosticModel;
use crate::storage::Dataset;

/// Splits `data` into `(train, test)`, drawing `test_fraction` of every class
/// into the test set.
pub fn stratified_split(
    data: &Dataset,
    test_fraction: f64,
    seed: u64,
) -> Result<(Dataset, Dataset), TriageError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(TriageError::Validation(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(data.len());
    let mut test = Vec::new();
    for mut rows in rows_by_class(data) {
        rows.shuffle(&mut rng);
        let n_test = ((rows.len() as f64 * test_fraction).round() as usize).min(rows.len());
        test.extend_from_slice(&rows[..n_test]);
        train.extend_from_slice(&rows[n_test..]);
    }
    if train.is_empty() || test.is_empty() {
        return Err(TriageError::DataFormat(format!(
            "cannot split {} records with test_fraction {}",
            data.len(),
            test_fraction
        )));
    }
    train.sort_unstable();
    test.sort_unstable();
    tracing::debug!(train = train.len(), test = test.len(), "stratified split");
    Ok((data.select_rows(&train)?, data.select_rows(&test)?))
}

/// Randomly drops records until every present class has as many records as
/// the rarest one.
pub fn undersample(data: &Dataset, seed: u64) -> Result<Dataset, TriageError> {
    let classes: Vec<Vec<usize>> = rows_by_class(data)
        .into_iter()
        .filter(|rows| !rows.is_empty())
        .collect();
    let minority = classes.iter().map(Vec::len).min().unwrap_or(0);
    if minority == 0 {
        return Err(TriageError::DataFormat("cannot undersample an empty dataset".into()));
    }

    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut keep = Vec::with_capacity(minority * classes.len());
    for mut rows in classes {
        rows.shuffle(&mut rng);
        keep.extend_from_slice(&rows[..minority]);
    }
    keep.sort_unstable();
    tracing::debug!(per_class = minority, kept = keep.len(), "undersampled");
    data.select_rows(&keep)
}

fn rows_by_class(data: &Dataset) -> Vec<Vec<usize>> {
    let target = data.target_index();
    let mut classes = vec![Vec::new(); data.cardinality(target)];
    for (row, &state) in data.column(target).iter().enumerate() {
        classes[state].push(row);
    }
    classes
}

/// Per-class scores.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ClassMetrics {
    pub label: String,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Number of records whose actual label is this class.
    pub support: usize,
}

/// Averaged precision, recall and F1.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// Classification report over a labelled test set.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct EvaluationReport {
    /// Sorted labels; indexes the confusion matrix.
    pub labels: Vec<String>,
    /// `confusion[actual][predicted]`.
    pub confusion: Vec<Vec<usize>>,
    pub classes: Vec<ClassMetrics>,
    pub accuracy: f64,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
    pub total: usize,
}

impl EvaluationReport {
    /// Builds the report from parallel slices of actual and predicted labels.
    pub fn from_predictions<S: AsRef<str>>(
        actual: &[S],
        predicted: &[S],
    ) -> Result<Self, TriageError> {
        if actual.len() != predicted.len() {
            return Err(TriageError::Validation(format!(
                "{} actual labels but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }
        if actual.is_empty() {
            return Err(TriageError::Validation("nothing to evaluate".into()));
        }

        let labels: Vec<String> = actual
            .iter()
            .chain(predicted)
            .map(|s| s.as_ref().to_string())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let slot = |label: &str| labels.binary_search_by(|l| l.as_str().cmp(label));

        let mut confusion = vec![vec![0usize; labels.len()]; labels.len()];
        for (a, p) in actual.iter().zip(predicted) {
            match (slot(a.as_ref()), slot(p.as_ref())) {
                (Ok(i), Ok(j)) => confusion[i][j] += 1,
                _ => return Err(TriageError::Internal("label missing from label set".into())),
            }
        }

        let total = actual.len();
        let correct: usize = (0..labels.len()).map(|i| confusion[i][i]).sum();
        let classes: Vec<ClassMetrics> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let tp = confusion[i][i];
                let support: usize = confusion[i].iter().sum();
                let predicted_as: usize = confusion.iter().map(|row| row[i]).sum();
                let precision = ratio(tp, predicted_as);
                let recall = ratio(tp, support);
                let f1 = if precision + recall > 0.0 {
                    2.0 * precision * recall / (precision + recall)
                } else {
                    0.0
                };
                ClassMetrics {
                    label: label.clone(),
                    precision,
                    recall,
                    f1,
                    support,
                }
            })
            .collect();

        let k = classes.len() as f64;
        let macro_avg = AveragedMetrics {
            precision: classes.iter().map(|c| c.precision).sum::<f64>() / k,
            recall: classes.iter().map(|c| c.recall).sum::<f64>() / k,
            f1: classes.iter().map(|c| c.f1).sum::<f64>() / k,
        };
        let weight = |c: &ClassMetrics| c.support as f64 / total as f64;
        let weighted_avg = AveragedMetrics {
            precision: classes.iter().map(|c| weight(c) * c.precision).sum(),
            recall: classes.iter().map(|c| weight(c) * c.recall).sum(),
            f1: classes.iter().map(|c| weight(c) * c.f1).sum(),
        };

        Ok(Self {
            labels,
            confusion,
            classes,
            accuracy: ratio(correct, total),
            macro_avg,
            weighted_avg,
            total,
        })
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

impl fmt::Display for EvaluationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .labels
            .iter()
            .map(String::len)
            .chain(["weighted avg".len()])
            .max()
            .unwrap_or(0);
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for c in &self.classes {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                c.label, c.precision, c.recall, c.f1, c.support
            )?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>width$} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.total
        )?;
        for (name, avg) in [("macro avg", &self.macro_avg), ("weighted avg", &self.weighted_avg)] {
            writeln!(
                f,
                "{:>width$} {:>9.2} {:>9.2} {:>9.2} {:>9}",
                name, avg.precision, avg.recall, avg.f1, self.total
            )?;
        }
        writeln!(f)?;
        writeln!(f, "confusion matrix (rows = actual, columns = predicted)")?;
        write!(f, "{:>width$}", "")?;
        for label in &self.labels {
            write!(f, " {:>9}", label)?;
        }
        writeln!(f)?;
        for (label, row) in self.labels.iter().zip(&self.confusion) {
            write!(f, "{:>width$}", label)?;
            for count in row {
                write!(f, " {:>9}", count)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// Predicts every record of `data` and scores the predictions.
pub fn evaluate(model: &DiagnosticModel, data: &Dataset) -> Result<EvaluationReport, TriageError> {
    let predicted = model.predict_batch(data)?;
    let actual: Vec<String> = (0..data.len())
        .map(|row| data.target_label(row).to_string())
        .collect();
    let report = EvaluationReport::from_predictions(&actual, &predicted)?;
    tracing::info!(
        records = report.total,
        accuracy = report.accuracy,
        macro_f1 = report.macro_avg.f1,
        "evaluation finished"
    );
    Ok(report)
}
