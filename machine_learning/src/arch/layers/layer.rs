use ndarray::{Array2, ArrayView2};

use super::Dense;
use crate::{Result, arch::activations::ActFn, specs::LayerSpec};

#[derive(Clone, Debug)]
pub enum Layer {
    Dense(Dense),
}
use Layer::*;

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Dense(Dense::new(dim, act_fn))
    }

    /// Returns the amount of parameters this layer has.
    pub fn size(&self) -> usize {
        match self {
            Dense(l) => l.size(),
        }
    }

    /// Returns the `(input, output)` features of this layer.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Dense(l) => l.dim(),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>, cache: bool) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.forward(params, x, cache),
        }
    }

    pub fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>) -> Result<Array2<f32>> {
        match self {
            Dense(l) => l.backward(params, grad, d),
        }
    }

    /// Drops whatever the last forward pass left cached for the backward pass.
    pub fn clear_cache(&mut self) {
        match self {
            Dense(l) => l.clear_cache(),
        }
    }

    pub fn spec(&self) -> LayerSpec {
        match self {
            Dense(l) => LayerSpec::Dense {
                dim: l.dim(),
                act_fn: l.act_fn().map(ActFn::spec),
            },
        }
    }
}

impl From<LayerSpec> for Layer {
    fn from(spec: LayerSpec) -> Self {
        match spec {
            LayerSpec::Dense { dim, act_fn } => Layer::dense(dim, act_fn.map(ActFn::from)),
        }
    }
}
