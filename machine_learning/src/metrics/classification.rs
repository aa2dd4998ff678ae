use std::collections::BTreeMap;

use super::{Average, check_lengths};
use crate::{MlErr, Result};

/// The confusion counts of a single label.
#[derive(Debug, Default, Clone, Copy)]
struct Counts {
    tp: usize,
    fp: usize,
    fn_: usize,
}

impl Counts {
    fn support(&self) -> usize {
        self.tp + self.fn_
    }
}

/// Tallies the confusion counts of every label present in either array, sorted by label.
fn confusion(y_true: &[i64], y_pred: &[i64]) -> BTreeMap<i64, Counts> {
    let mut counts: BTreeMap<i64, Counts> = BTreeMap::new();

    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t == p {
            counts.entry(t).or_default().tp += 1;
        } else {
            counts.entry(t).or_default().fn_ += 1;
            counts.entry(p).or_default().fp += 1;
        }
    }

    counts
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0. } else { num as f64 / den as f64 }
}

/// Computes a per-label score and reduces it with `average`.
fn averaged<F>(y_true: &[i64], y_pred: &[i64], average: Option<Average>, score: F) -> Result<f64>
where
    F: Fn(Counts) -> f64,
{
    check_lengths(y_true, y_pred)?;

    let Some(average) = average else {
        return Err(MlErr::InvalidInput("classification scores need an averaging mode"));
    };

    let counts = confusion(y_true, y_pred);
    if counts.is_empty() {
        return Ok(0.);
    }

    let value = match average {
        Average::Micro => {
            let total = counts.values().fold(Counts::default(), |acc, c| Counts {
                tp: acc.tp + c.tp,
                fp: acc.fp + c.fp,
                fn_: acc.fn_ + c.fn_,
            });

            score(total)
        }
        Average::Macro => counts.values().map(|&c| score(c)).sum::<f64>() / counts.len() as f64,
        Average::Weighted => {
            let support: usize = counts.values().map(Counts::support).sum();
            if support == 0 {
                return Ok(0.);
            }

            counts
                .values()
                .map(|&c| score(c) * c.support() as f64)
                .sum::<f64>()
                / support as f64
        }
    };

    Ok(value)
}

/// The harmonic mean of precision and recall.
///
/// # Arguments
/// * `y_true` - The ground truth labels.
/// * `y_pred` - The predicted labels.
/// * `average` - How to reduce the per-label scores.
///
/// # Returns
/// The score or an error if the lengths differ or no averaging mode was given.
pub fn f1_score(y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64> {
    averaged(y_true, y_pred, average, |c| ratio(2 * c.tp, 2 * c.tp + c.fp + c.fn_))
}

/// The intersection over union of the true and predicted sets of every label.
///
/// # Arguments
/// * `y_true` - The ground truth labels.
/// * `y_pred` - The predicted labels.
/// * `average` - How to reduce the per-label scores.
///
/// # Returns
/// The score or an error if the lengths differ or no averaging mode was given.
pub fn jaccard_score(y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64> {
    averaged(y_true, y_pred, average, |c| ratio(c.tp, c.tp + c.fp + c.fn_))
}

pub fn precision_score(y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64> {
    averaged(y_true, y_pred, average, |c| ratio(c.tp, c.tp + c.fp))
}

pub fn recall_score(y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64> {
    averaged(y_true, y_pred, average, |c| ratio(c.tp, c.tp + c.fn_))
}

/// The fraction of labels predicted exactly. The averaging mode is ignored.
pub fn accuracy_score(y_true: &[i64], y_pred: &[i64], _average: Option<Average>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;

    let hits = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    Ok(ratio(hits, y_true.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const Y_TRUE: [i64; 6] = [0, 1, 2, 0, 1, 2];
    const Y_PRED: [i64; 6] = [0, 2, 1, 0, 0, 1];

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-12
    }

    #[test]
    fn f1_averages() {
        let weighted = f1_score(&Y_TRUE, &Y_PRED, Some(Average::Weighted)).unwrap();
        let macro_ = f1_score(&Y_TRUE, &Y_PRED, Some(Average::Macro)).unwrap();
        let micro = f1_score(&Y_TRUE, &Y_PRED, Some(Average::Micro)).unwrap();

        assert!(close(weighted, 0.8 / 3.));
        assert!(close(macro_, 0.8 / 3.));
        assert!(close(micro, 1. / 3.));
    }

    #[test]
    fn jaccard_weighted() {
        let score = jaccard_score(&Y_TRUE, &Y_PRED, Some(Average::Weighted)).unwrap();
        assert!(close(score, 2. / 9.));
    }

    #[test]
    fn precision_and_recall() {
        let precision = precision_score(&Y_TRUE, &Y_PRED, Some(Average::Macro)).unwrap();
        let recall = recall_score(&Y_TRUE, &Y_PRED, Some(Average::Macro)).unwrap();

        assert!(close(precision, 2. / 9.));
        assert!(close(recall, 1. / 3.));
    }

    #[test]
    fn labels_only_predicted_count_in_macro_but_not_in_weighted() {
        let y_true = [0, 0];
        let y_pred = [0, 1];

        let macro_ = f1_score(&y_true, &y_pred, Some(Average::Macro)).unwrap();
        let weighted = f1_score(&y_true, &y_pred, Some(Average::Weighted)).unwrap();

        assert!(close(macro_, 1. / 3.));
        assert!(close(weighted, 2. / 3.));
    }

    #[test]
    fn accuracy() {
        assert!(close(accuracy_score(&Y_TRUE, &Y_PRED, None).unwrap(), 1. / 3.));
        assert_eq!(accuracy_score(&[], &[], None).unwrap(), 0.);
    }

    #[test]
    fn averaging_is_required() {
        assert!(f1_score(&Y_TRUE, &Y_PRED, None).is_err());
    }

    #[test]
    fn lengths_must_match() {
        assert!(matches!(
            jaccard_score(&[0, 1], &[0], Some(Average::Weighted)),
            Err(MlErr::SizeMismatch { .. })
        ));
    }
}
