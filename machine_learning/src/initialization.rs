use rand::Rng;
use rand_distr::{Distribution, Normal, Uniform};

use crate::{MlErr, Result, arch::Sequential, specs::ParamGenSpec};

/// Samples the initial values of a weight tensor.
///
/// # Arguments
/// * `spec` - The distribution to sample from.
/// * `fan_in` - The number of input units in the weight tensor.
/// * `fan_out` - The number of output units in the weight tensor.
/// * `n` - The amount of values to sample.
/// * `rng` - A random number generator.
///
/// # Returns
/// The sampled values or an error if the distribution's parameters are invalid.
pub fn sample<R: Rng + ?Sized>(
    spec: ParamGenSpec,
    fan_in: usize,
    fan_out: usize,
    n: usize,
    rng: &mut R,
) -> Result<Vec<f32>> {
    let fan_in = fan_in.max(1) as f32;
    let fan_out = fan_out as f32;

    match spec {
        ParamGenSpec::Const { value } => Ok(vec![value; n]),
        ParamGenSpec::Uniform { low, high } => uniform(low, high, n, rng),
        ParamGenSpec::XavierUniform => {
            let range = (6. / (fan_in + fan_out)).sqrt();
            uniform(-range, range, n, rng)
        }
        ParamGenSpec::LecunUniform => {
            let range = (3. / fan_in).sqrt();
            uniform(-range, range, n, rng)
        }
        ParamGenSpec::Normal { mean, std_dev } => normal(mean, std_dev, n, rng),
        ParamGenSpec::Kaiming => normal(0., (2. / fan_in).sqrt(), n, rng),
        ParamGenSpec::Xavier => normal(0., (2. / (fan_in + fan_out)).sqrt(), n, rng),
        ParamGenSpec::Lecun => normal(0., (1. / fan_in).sqrt(), n, rng),
    }
}

/// Initializes every dense layer of `model`: weights are sampled from `spec` and biases are set
/// to zero.
///
/// # Arguments
/// * `model` - The model to initialize.
/// * `spec` - The distribution to sample the weights from.
/// * `rng` - A random number generator.
///
/// # Returns
/// An error if the distribution's parameters are invalid.
pub fn init_params<R: Rng + ?Sized>(model: &mut Sequential, spec: ParamGenSpec, rng: &mut R) -> Result<()> {
    for (layer, params) in model.layer_params_mut() {
        let (fan_in, fan_out) = layer.dim();
        let (weights, biases) = params.split_at_mut(fan_in * fan_out);

        weights.copy_from_slice(&sample(spec, fan_in, fan_out, weights.len(), rng)?);
        biases.fill(0.);
    }

    Ok(())
}

fn uniform<R: Rng + ?Sized>(low: f32, high: f32, n: usize, rng: &mut R) -> Result<Vec<f32>> {
    let distribution = Uniform::new(low, high).map_err(|e| MlErr::InvalidSpec(e.to_string()))?;
    Ok(distribution.sample_iter(rng).take(n).collect())
}

fn normal<R: Rng + ?Sized>(mean: f32, std_dev: f32, n: usize, rng: &mut R) -> Result<Vec<f32>> {
    let distribution = Normal::new(mean, std_dev).map_err(|e| MlErr::InvalidSpec(e.to_string()))?;
    Ok(distribution.sample_iter(rng).take(n).collect())
}
