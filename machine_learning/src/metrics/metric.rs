use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use super::{accuracy_score, f1_score, jaccard_score, precision_score, recall_score, spectrum_score};
use crate::{MlErr, Result};

/// How per-label scores are reduced into a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Average {
    /// Mean of the per-label scores weighted by their true support.
    Weighted,
    /// Unweighted mean of the per-label scores.
    Macro,
    /// Score of the global true positive, false positive and false negative counts.
    Micro,
}

/// A score computed on a pair of equal length label arrays.
pub trait Metric {
    /// Scores `y_pred` against `y_true`.
    ///
    /// # Arguments
    /// * `y_true` - The ground truth labels.
    /// * `y_pred` - The predicted labels.
    /// * `average` - How to reduce per-label scores, if the metric has any.
    ///
    /// # Returns
    /// The score or an error if the arrays' lengths differ.
    fn score(&self, y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64>;
}

impl<F> Metric for F
where
    F: Fn(&[i64], &[i64], Option<Average>) -> Result<f64>,
{
    fn score(&self, y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64> {
        self(y_true, y_pred, average)
    }
}

/// The metrics that can be named in a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    F1,
    Jaccard,
    Precision,
    Recall,
    Accuracy,
    Spectrum,
}

impl Builtin {
    pub const ALL: [Builtin; 6] = [
        Builtin::F1,
        Builtin::Jaccard,
        Builtin::Precision,
        Builtin::Recall,
        Builtin::Accuracy,
        Builtin::Spectrum,
    ];

    /// Looks a metric up by its registry name.
    ///
    /// # Arguments
    /// * `name` - One of `f1_score`, `jaccard_score`, `precision_score`, `recall_score`,
    ///   `accuracy_score` or `spectrum_score`.
    ///
    /// # Returns
    /// The metric or `MlErr::UnknownMetric`.
    pub fn from_name(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|builtin| builtin.name() == name)
            .ok_or_else(|| MlErr::UnknownMetric(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        match self {
            Builtin::F1 => "f1_score",
            Builtin::Jaccard => "jaccard_score",
            Builtin::Precision => "precision_score",
            Builtin::Recall => "recall_score",
            Builtin::Accuracy => "accuracy_score",
            Builtin::Spectrum => "spectrum_score",
        }
    }
}

impl Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Metric for Builtin {
    fn score(&self, y_true: &[i64], y_pred: &[i64], average: Option<Average>) -> Result<f64> {
        match self {
            Builtin::F1 => f1_score(y_true, y_pred, average),
            Builtin::Jaccard => jaccard_score(y_true, y_pred, average),
            Builtin::Precision => precision_score(y_true, y_pred, average),
            Builtin::Recall => recall_score(y_true, y_pred, average),
            Builtin::Accuracy => accuracy_score(y_true, y_pred, average),
            Builtin::Spectrum => spectrum_score(y_true, y_pred, average),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip() {
        for builtin in Builtin::ALL {
            assert_eq!(Builtin::from_name(builtin.name()).unwrap(), builtin);
        }
    }

    #[test]
    fn unknown_names_fail() {
        assert!(matches!(
            Builtin::from_name("roc_auc"),
            Err(MlErr::UnknownMetric(name)) if name == "roc_auc"
        ));
    }

    #[test]
    fn closures_are_metrics() {
        let constant = |_: &[i64], _: &[i64], _: Option<Average>| -> Result<f64> { Ok(0.5) };
        assert_eq!(constant.score(&[1], &[1], None).unwrap(), 0.5);
    }
}
