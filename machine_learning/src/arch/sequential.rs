use ndarray::{Array4, ArrayView4};

use super::{Mode, Model, layers::Layer};
use crate::{MlErr, Result, ops, specs::ModelSpec};

/// A sequential model applied independently to every pixel, equivalent to a stack of 1×1
/// convolutions: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Clone, Debug)]
pub struct Sequential {
    layers: Vec<Layer>,
    params: Vec<f32>,
    grad: Vec<f32>,
    mode: Mode,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        let layers: Vec<Layer> = layers.into_iter().collect();
        let size = layers.iter().map(Layer::size).sum();

        Self {
            layers,
            params: vec![0.; size],
            grad: vec![0.; size],
            mode: Mode::default(),
        }
    }

    /// Creates a new `Sequential` with the given parameters.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `params` - The flat parameter buffer, layer after layer.
    ///
    /// # Returns
    /// A new `Sequential` instance or an error if the amount of parameters is wrong.
    pub fn with_params<I>(layers: I, params: Vec<f32>) -> Result<Self>
    where
        I: IntoIterator<Item = Layer>,
    {
        let mut model = Self::new(layers);
        if params.len() != model.params.len() {
            return Err(MlErr::SizeMismatch {
                what: "sequential parameters",
                got: params.len(),
                expected: model.params.len(),
            });
        }

        model.params = params;
        Ok(model)
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Pairs every layer with its slice of the parameter buffer.
    pub fn layer_params_mut(&mut self) -> impl Iterator<Item = (&Layer, &mut [f32])> {
        let mut rest = self.params.as_mut_slice();

        self.layers.iter().map(move |layer| {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(layer.size());
            rest = tail;
            (layer, head)
        })
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.params.len()
    }

    fn mode(&self) -> Mode {
        self.mode
    }

    fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    fn forward(&mut self, x: ArrayView4<f32>) -> Result<Array4<f32>> {
        let (b, _, h, w) = x.dim();
        let cache = self.mode == Mode::Train;
        let mut a = ops::nchw_to_rows(x)?;
        let mut offset = 0;

        for layer in &mut self.layers {
            let size = layer.size();
            let params = &self.params[offset..offset + size];
            a = layer.forward(params, a.view(), cache)?;
            offset += size;
        }

        ops::rows_to_nchw(a, (b, h, w))
    }

    fn backward(&mut self, d: ArrayView4<f32>) -> Result<()> {
        if self.mode != Mode::Train {
            return Err(MlErr::InvalidInput("backward called in evaluation mode"));
        }

        let mut d = ops::nchw_to_rows(d)?;
        let mut end = self.params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&self.params[start..end], &mut self.grad[start..end], d)?;
            end = start;
        }

        Ok(())
    }

    fn params(&self) -> &[f32] {
        &self.params
    }

    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]) {
        (&mut self.params, &self.grad)
    }

    fn zero_grad(&mut self) {
        self.grad.fill(0.);
    }

    fn clear_cache(&mut self) {
        self.layers.iter_mut().for_each(Layer::clear_cache);
    }

    fn spec(&self) -> Option<ModelSpec> {
        Some(ModelSpec::Sequential {
            layers: self.layers.iter().map(Layer::spec).collect(),
        })
    }
}
