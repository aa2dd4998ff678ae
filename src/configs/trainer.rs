use std::{fs, num::NonZeroUsize, path::{Path, PathBuf}};

use machine_learning::specs::{LossFnSpec, ModelSpec, OptimizerSpec, ParamGenSpec};
use serde::{Deserialize, Serialize};

use crate::{
    Result, TrainErr,
    options::{LossKind, MetricDispatch, TrainOptions},
};

/// Where the samples of a run come from.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetConfig {
    /// Seeded random images whose first channel encodes each pixel's class.
    Synthetic {
        samples: usize,
        height: usize,
        width: usize,
        channels: usize,
        /// The share of samples held out for the Test phase.
        test_fraction: f32,
    },
}

/// The configuration of a training run, as read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    /// `cross_entropy` compares logits against one-hot masks, any other value compares the
    /// spectrum against the masks.
    #[serde(default = "default_loss")]
    pub loss: String,
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,
    /// Defaults to the epoch of the snapshot being resumed, or zero.
    #[serde(default)]
    pub epoch_offset: Option<usize>,
    #[serde(default)]
    pub dispatch: MetricDispatch,
    pub metrics: Vec<String>,
    pub model: ModelSpec,
    #[serde(default)]
    pub init: ParamGenSpec,
    pub optimizer: OptimizerSpec,
    pub criterion: LossFnSpec,
    pub dataset: DatasetConfig,
    pub batch_size: NonZeroUsize,
    #[serde(default)]
    pub shuffle: bool,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub resume_from: Option<PathBuf>,
}

fn default_out_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_loss() -> String {
    "cross_entropy".to_string()
}

fn default_num_epochs() -> usize {
    TrainOptions::default().num_epochs
}

impl TrainerConfig {
    /// Reads and validates a configuration file.
    ///
    /// # Arguments
    /// * `path` - The path of a JSON file.
    ///
    /// # Returns
    /// The configuration or an error if it can't be read, parsed or is invalid.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks what the types can't: the semantic constraints between fields.
    pub fn validate(&self) -> Result<()> {
        if self.num_epochs == 0 {
            return Err(TrainErr::InvalidConfig("num_epochs must be positive".into()));
        }

        if self.metrics.is_empty() {
            return Err(TrainErr::InvalidConfig("metrics must not be empty".into()));
        }

        let loss_kind = LossKind::from(self.loss.as_str());
        match (loss_kind, self.criterion) {
            (LossKind::CrossEntropy, LossFnSpec::Mse | LossFnSpec::Mae) => {
                return Err(TrainErr::InvalidConfig(format!(
                    "loss {:?} needs the cross_entropy criterion",
                    self.loss
                )));
            }
            (LossKind::Spectrum, LossFnSpec::CrossEntropy) => {
                return Err(TrainErr::InvalidConfig(format!(
                    "loss {:?} regresses the spectrum, it needs the mse or mae criterion",
                    self.loss
                )));
            }
            _ => {}
        }

        match self.dataset {
            DatasetConfig::Synthetic {
                samples,
                height,
                width,
                channels,
                test_fraction,
            } => {
                if samples == 0 || height == 0 || width == 0 || channels == 0 {
                    return Err(TrainErr::InvalidConfig(
                        "synthetic datasets need samples, height, width and channels".into(),
                    ));
                }

                if !(0.0..1.0).contains(&test_fraction) || test_fraction == 0.0 {
                    return Err(TrainErr::InvalidConfig("test_fraction must be in (0, 1)".into()));
                }
            }
        }

        Ok(())
    }

    /// Returns the options of the run, given the epoch of the snapshot being resumed, if any.
    pub fn options(&self, resumed_epoch: Option<usize>) -> TrainOptions {
        TrainOptions {
            loss_kind: LossKind::from(self.loss.as_str()),
            num_epochs: self.num_epochs,
            epoch_offset: self.epoch_offset.or(resumed_epoch).unwrap_or_default(),
            dispatch: self.dispatch,
        }
    }
}
