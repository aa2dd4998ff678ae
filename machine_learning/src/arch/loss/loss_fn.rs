use ndarray::{Array2, ArrayView2};

use crate::{MlErr, Result};

/// A differentiable loss over `[rows, features]` predictions and targets of equal shape.
pub trait LossFn {
    /// Computes the loss of `y_pred` against `y`.
    ///
    /// # Arguments
    /// * `y_pred` - The model's output.
    /// * `y` - The expected output.
    ///
    /// # Returns
    /// The loss or an error if the shapes don't match.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32>;

    /// Computes the gradient of the loss with respect to `y_pred`.
    ///
    /// # Arguments
    /// * `y_pred` - The model's output.
    /// * `y` - The expected output.
    ///
    /// # Returns
    /// The gradient, shaped like `y_pred`, or an error if the shapes don't match.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>>;
}

impl<L: LossFn + ?Sized> LossFn for Box<L> {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<f32> {
        (**self).loss(y_pred, y)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Result<Array2<f32>> {
        (**self).loss_prime(y_pred, y)
    }
}

pub(super) fn check_shapes(y_pred: &ArrayView2<f32>, y: &ArrayView2<f32>) -> Result<()> {
    if y_pred.dim() != y.dim() {
        return Err(MlErr::SizeMismatch {
            what: "loss targets",
            got: y.len(),
            expected: y_pred.len(),
        });
    }

    Ok(())
}
