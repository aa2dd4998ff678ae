use ndarray::{Array2, ArrayView2};

use super::{LossFn, loss_fn::check_shapes};
use crate::Result;

/// Mean absolute error loss function.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mae;

impl Mae {
    /// Returns a new `Mae`.
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mae {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        check_shapes(&y_pred, &y)?;
        Ok((&y_pred - &y).mapv(f32::abs).mean().unwrap_or_default())
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>> {
        check_shapes(&y_pred, &y)?;

        let n = y_pred.len().max(1) as f32;
        Ok((&y_pred - &y).mapv(|d| if d == 0.0 { 0.0 } else { d.signum() / n }))
    }
}
