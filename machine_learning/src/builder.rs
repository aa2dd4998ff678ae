use rand::{Rng, SeedableRng, rngs::StdRng};

use crate::{
    MlErr, Result,
    arch::{
        Sequential,
        layers::Layer,
        loss::{CrossEntropy, LossFn, Mae, Mse},
    },
    initialization,
    metrics::MetricRegistry,
    ops::NUM_CLASSES,
    optimization::{Adam, GradientDescent, GradientDescentWithMomentum, Optimizer},
    specs::{LayerSpec, LossFnSpec, ModelSpec, OptimizerSpec, ParamGenSpec},
};

/// Builds the training components given their specifications.
#[derive(Default)]
pub struct ComponentBuilder;

impl ComponentBuilder {
    /// Creates a new `ComponentBuilder`.
    pub fn new() -> Self {
        Self
    }

    /// Builds an uninitialized model following a spec.
    ///
    /// # Arguments
    /// * `spec` - The specification of the model.
    ///
    /// # Returns
    /// The model or an error if it has no layers, consecutive layers don't chain or the last
    /// layer doesn't output one logit per class.
    pub fn build_model(&self, spec: &ModelSpec) -> Result<Sequential> {
        match spec {
            ModelSpec::Sequential { layers } => {
                self.validate_layers(layers)?;
                Ok(Sequential::new(layers.iter().copied().map(Layer::from)))
            }
        }
    }

    /// Builds a model following a spec and samples its initial parameters.
    ///
    /// # Arguments
    /// * `spec` - The specification of the model.
    /// * `init` - The distribution to sample the weights from.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The initialized model or an error if either spec is invalid.
    pub fn build_initialized_model<R: Rng + ?Sized>(
        &self,
        spec: &ModelSpec,
        init: ParamGenSpec,
        rng: &mut R,
    ) -> Result<Sequential> {
        let mut model = self.build_model(spec)?;
        initialization::init_params(&mut model, init, rng)?;
        Ok(model)
    }

    /// Builds an optimizer for a model with `len` parameters.
    pub fn build_optimizer(&self, spec: OptimizerSpec, len: usize) -> Box<dyn Optimizer> {
        match spec {
            OptimizerSpec::Adam {
                learning_rate,
                beta1,
                beta2,
                epsilon,
            } => Box::new(Adam::new(len, learning_rate, beta1, beta2, epsilon)),
            OptimizerSpec::GradientDescent { learning_rate } => Box::new(GradientDescent::new(learning_rate)),
            OptimizerSpec::GradientDescentWithMomentum {
                learning_rate,
                momentum,
            } => Box::new(GradientDescentWithMomentum::new(len, learning_rate, momentum)),
        }
    }

    pub fn build_loss(&self, spec: LossFnSpec) -> Box<dyn LossFn> {
        match spec {
            LossFnSpec::Mse => Box::new(Mse::new()),
            LossFnSpec::Mae => Box::new(Mae::new()),
            LossFnSpec::CrossEntropy => Box::new(CrossEntropy::new()),
        }
    }

    /// Builds an ordered metric registry out of metric names.
    pub fn build_metrics<S: AsRef<str>>(&self, names: &[S]) -> Result<MetricRegistry> {
        MetricRegistry::from_names(names)
    }

    /// Generates a random number generator given (or not) a seed.
    pub fn generate_rng(&self, seed: Option<u64>) -> StdRng {
        match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }

    fn validate_layers(&self, layers: &[LayerSpec]) -> Result<()> {
        let dims: Vec<(usize, usize)> = layers
            .iter()
            .map(|LayerSpec::Dense { dim, .. }| *dim)
            .collect();

        let Some(&(_, out)) = dims.last() else {
            return Err(MlErr::InvalidSpec("a model needs at least one layer".into()));
        };

        if let Some(i) = dims.windows(2).position(|w| w[0].1 != w[1].0) {
            return Err(MlErr::InvalidSpec(format!(
                "layer {i} outputs {} features but layer {} expects {}",
                dims[i].1,
                i + 1,
                dims[i + 1].0
            )));
        }

        if let Some(i) = dims.iter().position(|&(i, o)| i == 0 || o == 0) {
            return Err(MlErr::InvalidSpec(format!("layer {i} has no features")));
        }

        if out != NUM_CLASSES {
            return Err(MlErr::InvalidSpec(format!(
                "the last layer outputs {out} features, expected one per class ({NUM_CLASSES})"
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{arch::Model, specs::ActFnSpec};

    fn dense(dim: (usize, usize)) -> LayerSpec {
        LayerSpec::Dense {
            dim,
            act_fn: Some(ActFnSpec::Relu),
        }
    }

    #[test]
    fn builds_chained_models() {
        let spec = ModelSpec::Sequential {
            layers: vec![dense((3, 8)), dense((8, 4))],
        };
        let model = ComponentBuilder::new().build_model(&spec).unwrap();

        assert_eq!(model.size(), 4 * 8 + 9 * 4);
        assert_eq!(model.spec(), Some(spec));
    }

    #[test]
    fn rejects_broken_chains() {
        let builder = ComponentBuilder::new();
        let cases = [
            vec![],
            vec![dense((3, 8)), dense((7, 4))],
            vec![dense((3, 5))],
            vec![dense((0, 4))],
        ];

        for layers in cases {
            let spec = ModelSpec::Sequential { layers };
            assert!(matches!(builder.build_model(&spec), Err(MlErr::InvalidSpec(_))));
        }
    }

    #[test]
    fn seeded_models_are_reproducible() {
        let builder = ComponentBuilder::new();
        let spec = ModelSpec::Sequential {
            layers: vec![dense((2, 4))],
        };

        let build = || {
            let mut rng = builder.generate_rng(Some(9));
            builder
                .build_initialized_model(&spec, ParamGenSpec::XavierUniform, &mut rng)
                .unwrap()
        };

        assert_eq!(build().params(), build().params());
    }
}
