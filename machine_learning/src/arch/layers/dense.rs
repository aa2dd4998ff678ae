use ndarray::{linalg, prelude::*};

use crate::{MlErr, Result, arch::activations::ActFn};

/// A fully connected layer over `[rows, features]` inputs.
///
/// The layer doesn't own its parameters, it receives its slice of the model's flat parameter
/// buffer on each call: the first `dim.0 * dim.1` values are the row-major weights and the last
/// `dim.1` are the biases.
#[derive(Clone, Debug)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,
    size: usize,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Option<Array2<f32>>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The amount of input and output features.
    /// * `act_fn` - An optional activation applied to the output.
    ///
    /// # Returns
    /// A new `Dense` instance.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            size: (dim.0 + 1) * dim.1,
            act_fn,
            x: None,
            z: None,
        }
    }

    /// Returns the size of this layer.
    ///
    /// # Returns
    /// The amount of parameters this layer has.
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    pub fn act_fn(&self) -> Option<&ActFn> {
        self.act_fn.as_ref()
    }

    /// Computes `act_fn(x · W + b)`.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `x` - The input rows.
    /// * `cache` - Whether to keep what `backward` needs.
    ///
    /// # Returns
    /// The output rows or an error if the sizes don't match.
    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>, cache: bool) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense input features",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(params)?;
        let z = x.dot(&w) + &b;

        let a = match &self.act_fn {
            Some(act_fn) => z.mapv(|z| act_fn.f(z)),
            None => z.clone(),
        };

        if cache {
            self.x = Some(x.to_owned());
            self.z = Some(z);
        }

        Ok(a)
    }

    /// Accumulates this layer's gradient into `grad` and returns the delta for the previous
    /// layer.
    ///
    /// # Arguments
    /// * `params` - This layer's parameter slice.
    /// * `grad` - This layer's gradient slice.
    /// * `d` - The loss gradient with respect to this layer's output.
    ///
    /// # Returns
    /// The loss gradient with respect to this layer's input, or an error if there was no cached
    /// forward pass.
    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], mut d: Array2<f32>) -> Result<Array2<f32>> {
        let (Some(x), Some(z)) = (self.x.take(), self.z.take()) else {
            return Err(MlErr::InvalidInput(
                "backward called without a training forward pass",
            ));
        };

        if let Some(act_fn) = &self.act_fn {
            d.zip_mut_with(&z, |d, &z| *d *= act_fn.df(z));
        }

        let (mut dw, mut db) = self.view_grad(grad)?;
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db += &d.sum_axis(Axis(0));

        let (w, _) = self.view_params(params)?;
        Ok(d.dot(&w.t()))
    }

    pub fn clear_cache(&mut self) {
        self.x = None;
        self.z = None;
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases of this layer.
    ///
    /// # Arguments
    /// * `grad` - A gradient slice.
    ///
    /// # Returns
    /// A tuple containing the delta weights and delta biases.
    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> Result<(ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>)> {
        self.check_len("dense gradient", grad.len())?;

        let w_size = self.size - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw)?;
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw)?;
        Ok((dw, db))
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this layer.
    ///
    /// # Arguments
    /// * `params` - A slice of parameters.
    ///
    /// # Returns
    /// A tuple containing the weights and biases.
    fn view_params<'a>(&self, params: &'a [f32]) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        self.check_len("dense parameters", params.len())?;

        let w_size = self.size - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size])?;
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..])?;
        Ok((weights, biases))
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.size {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected: self.size,
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loss(layer: &mut Dense, params: &[f32], x: ArrayView2<f32>) -> f32 {
        layer.forward(params, x, false).unwrap().mapv(|v| v * v).sum() / 2.0
    }

    #[test]
    fn backward_matches_finite_differences() {
        let mut layer = Dense::new((3, 2), Some(ActFn::sigmoid(1.0)));
        let params: Vec<f32> = (0..layer.size()).map(|i| (i as f32 - 3.5) * 0.2).collect();
        let x = array![[0.5, -1.0, 2.0], [1.5, 0.25, -0.5]];

        let a = layer.forward(&params, x.view(), true).unwrap();
        let mut grad = vec![0.0; layer.size()];
        layer.backward(&params, &mut grad, a).unwrap();

        let eps = 1e-3;
        for i in 0..params.len() {
            let mut plus = params.clone();
            plus[i] += eps;
            let mut minus = params.clone();
            minus[i] -= eps;

            let numeric = (loss(&mut layer, &plus, x.view()) - loss(&mut layer, &minus, x.view())) / (2.0 * eps);
            assert!((grad[i] - numeric).abs() < 1e-2, "param {i}: {} vs {numeric}", grad[i]);
        }
    }

    #[test]
    fn gradients_accumulate_until_zeroed() {
        let mut layer = Dense::new((1, 1), None);
        let params = [2.0, 0.0];
        let x = array![[1.0]];
        let mut grad = vec![0.0; 2];

        for _ in 0..2 {
            let a = layer.forward(&params, x.view(), true).unwrap();
            layer.backward(&params, &mut grad, a).unwrap();
        }

        assert_eq!(grad, [4.0, 4.0]);
    }

    #[test]
    fn backward_without_a_cached_forward_fails() {
        let mut layer = Dense::new((2, 2), None);
        let params = [0.0; 6];
        let x = array![[1.0, 1.0]];

        layer.forward(&params, x.view(), false).unwrap();
        let mut grad = [0.0; 6];
        assert!(layer.backward(&params, &mut grad, array![[1.0, 1.0]]).is_err());
    }

    #[test]
    fn wrong_parameter_slices_are_rejected() {
        let mut layer = Dense::new((2, 1), None);
        let x = array![[1.0, 1.0]];

        assert!(matches!(
            layer.forward(&[0.0; 2], x.view(), false),
            Err(MlErr::SizeMismatch { got: 2, expected: 3, .. })
        ));
    }
}
