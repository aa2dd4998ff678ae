use super::{Average, check_lengths};
use crate::{Result, ops::SPECTRUM_WEIGHTS};

/// The largest class index, which normalizes the spectrum score into `[0, 1]`.
const MAX_CLASS: f64 = (SPECTRUM_WEIGHTS.len() - 1) as f64;

/// Mean absolute severity error between the true and predicted classes, divided by the largest
/// class index. Lower is better; the averaging mode is ignored.
///
/// # Arguments
/// * `y_true` - The ground truth classes.
/// * `y_pred` - The predicted classes.
///
/// # Returns
/// The score, zero for empty inputs, or an error if the lengths differ.
pub fn spectrum_score(y_true: &[i64], y_pred: &[i64], _average: Option<Average>) -> Result<f64> {
    check_lengths(y_true, y_pred)?;

    if y_true.is_empty() {
        return Ok(0.);
    }

    let total: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(&t, &p)| (t - p).abs() as f64)
        .sum();

    Ok(total / y_true.len() as f64 / MAX_CLASS)
}
