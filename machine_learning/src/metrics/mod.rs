//! Classification metrics over flattened label arrays.
//!
//! The classification scores follow scikit-learn's semantics: the labels taken into account are
//! the sorted union of the true and predicted labels, a score whose denominator is zero counts as
//! zero, and weighted averages are weighted by each label's true support.

mod classification;
mod metric;
mod registry;
mod spectrum;

pub use classification::{accuracy_score, f1_score, jaccard_score, precision_score, recall_score};
pub use metric::{Average, Builtin, Metric};
pub use registry::MetricRegistry;
pub use spectrum::spectrum_score;

use crate::{MlErr, Result};

fn check_lengths(y_true: &[i64], y_pred: &[i64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(MlErr::SizeMismatch {
            what: "metric labels",
            got: y_pred.len(),
            expected: y_true.len(),
        });
    }

    Ok(())
}
