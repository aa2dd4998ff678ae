use ndarray::{Array2, ArrayView2, Axis};

use super::{LossFn, loss_fn::check_shapes};
use crate::{Result, ops};

/// Softmax cross-entropy over `[rows, classes]` logits and one-hot targets, averaged over rows.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        check_shapes(&y_pred, &y)?;

        let rows = y_pred.nrows().max(1) as f32;
        let mut total = 0.0;

        for (logits, target) in y_pred.rows().into_iter().zip(y.rows()) {
            let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            let log_sum = logits.mapv(|v| (v - max).exp()).sum().ln() + max;

            total -= logits
                .iter()
                .zip(target)
                .map(|(z, t)| t * (z - log_sum))
                .sum::<f32>();
        }

        Ok(total / rows)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_shapes(&y_pred, &y)?;

        let rows = y_pred.nrows().max(1) as f32;
        let probs = ops::softmax(y_pred, Axis(1));
        Ok((probs - &y) / rows)
    }
}
