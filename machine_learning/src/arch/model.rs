use ndarray::{Array4, ArrayView4};

use crate::{MlErr, Result, specs::ModelSpec};

/// Whether a model is being trained or evaluated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Train,
    Eval,
}

/// A deep copy of a model's parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct StateDict {
    params: Vec<f32>,
}

impl StateDict {
    pub fn new(params: Vec<f32>) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn into_params(self) -> Vec<f32> {
        self.params
    }
}

/// A segmentation model.
///
/// Models take `[batch, channel, height, width]` images and produce
/// `[batch, class, height, width]` logits. They own a flat parameter buffer and a gradient buffer
/// of the same length; gradients accumulate across `backward` calls until `zero_grad`.
pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    fn mode(&self) -> Mode;

    fn set_mode(&mut self, mode: Mode);

    /// Computes the logits for a batch of images. In `Mode::Train` the model keeps what it needs
    /// for the following `backward` call.
    ///
    /// # Arguments
    /// * `x` - A `[batch, channel, height, width]` image tensor.
    ///
    /// # Returns
    /// The `[batch, class, height, width]` logits or an error if the input doesn't fit the model.
    fn forward(&mut self, x: ArrayView4<f32>) -> Result<Array4<f32>>;

    /// Accumulates into the gradient buffer the gradient of the loss with respect to the
    /// parameters, given its gradient with respect to the last forward pass' logits.
    ///
    /// # Arguments
    /// * `d` - The loss gradient with respect to the logits.
    ///
    /// # Returns
    /// An error if there was no training forward pass or the shapes don't match.
    fn backward(&mut self, d: ArrayView4<f32>) -> Result<()>;

    fn params(&self) -> &[f32];

    /// Borrows the parameters mutably alongside the gradient, for optimizer steps.
    fn params_and_grad(&mut self) -> (&mut [f32], &[f32]);

    fn zero_grad(&mut self);

    /// Releases the buffers cached by the last forward pass.
    fn clear_cache(&mut self) {}

    /// Returns the architecture of the model, if it can be rebuilt from a specification.
    fn spec(&self) -> Option<ModelSpec> {
        None
    }

    fn state_dict(&self) -> StateDict {
        StateDict::new(self.params().to_vec())
    }

    /// Overwrites the model's parameters with a snapshot.
    ///
    /// # Arguments
    /// * `state` - A snapshot taken from a model with the same architecture.
    ///
    /// # Returns
    /// An error if the snapshot's size doesn't match the model's.
    fn load_state_dict(&mut self, state: &StateDict) -> Result<()> {
        let expected = self.size();
        if state.params().len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "state dict",
                got: state.params().len(),
                expected,
            });
        }

        let (params, _) = self.params_and_grad();
        params.copy_from_slice(state.params());
        Ok(())
    }
}
