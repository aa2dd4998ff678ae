use log::{info, warn};
use machine_learning::{
    arch::{Model, Sequential, loss::LossFn},
    builder::ComponentBuilder,
    dataset::{DataLoader, SegmentationDataset},
    metrics::MetricRegistry,
    optimization::Optimizer,
};

use super::{DatasetConfig, TrainerConfig};
use crate::{
    Result, TrainErr, checkpoint,
    options::TrainOptions,
    phase::Dataloaders,
    trainer::train_model,
};

/// Every component of a training run, ready to be passed to `train_model`.
pub struct Session {
    pub model: Sequential,
    pub criterion: Box<dyn LossFn>,
    pub dataloaders: Dataloaders<DataLoader>,
    pub optimizer: Box<dyn Optimizer>,
    pub metrics: MetricRegistry,
    pub options: TrainOptions,
}

impl Session {
    /// Runs `train_model` with this session's components.
    ///
    /// # Arguments
    /// * `config` - The configuration the session was built from.
    ///
    /// # Returns
    /// The model reloaded to its best weights.
    pub fn run(mut self, config: &TrainerConfig) -> Result<Sequential> {
        train_model(
            self.model,
            self.criterion.as_ref(),
            &mut self.dataloaders,
            self.optimizer.as_mut(),
            &self.metrics,
            &config.out_dir,
            &self.options,
        )
    }
}

/// Builds `Session`s given a configuration.
#[derive(Default)]
pub struct SessionBuilder {
    components: ComponentBuilder,
}

impl SessionBuilder {
    /// Creates a new `SessionBuilder`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a new `Session` following a configuration.
    ///
    /// # Arguments
    /// * `config` - A validated configuration.
    ///
    /// # Returns
    /// The session or an error if a component can't be built or the snapshot to resume from
    /// can't be read.
    pub fn build(&self, config: &TrainerConfig) -> Result<Session> {
        let mut rng = self.components.generate_rng(config.seed);
        let metrics = self.components.build_metrics(config.metrics.as_slice())?;

        let (model, resumed_epoch) = match &config.resume_from {
            Some(path) => {
                let snapshot = checkpoint::load(path)?;
                let epoch = snapshot.epoch;

                if snapshot.arch.as_ref() != Some(&config.model) {
                    warn!("resuming from {} with the snapshot's architecture", path.display());
                }

                info!("resuming from {} (epoch {epoch:?})", path.display());
                (snapshot.into_model()?, epoch)
            }
            None => {
                let model = self
                    .components
                    .build_initialized_model(&config.model, config.init, &mut rng)?;
                (model, None)
            }
        };

        let optimizer = self.components.build_optimizer(config.optimizer, model.size());
        let criterion = self.components.build_loss(config.criterion);

        let (train, test) = match config.dataset {
            DatasetConfig::Synthetic {
                samples,
                height,
                width,
                channels,
                test_fraction,
            } => SegmentationDataset::synthetic(samples, (height, width), channels, &mut rng)?.split(test_fraction)?,
        };

        if train.is_empty() || test.is_empty() {
            return Err(TrainErr::InvalidConfig(format!(
                "the split left {} training and {} test samples",
                train.len(),
                test.len()
            )));
        }

        info!(
            "built session: {} parameters, {} training and {} test samples",
            model.size(),
            train.len(),
            test.len()
        );

        let mut train = DataLoader::new(train, config.batch_size);
        if config.shuffle {
            let seed = self.components.generate_rng(config.seed.map(|s| s.wrapping_add(1)));
            train = train.shuffled(seed);
        }
        let test = DataLoader::new(test, config.batch_size);

        Ok(Session {
            model,
            criterion,
            dataloaders: Dataloaders::new(train, test),
            optimizer,
            metrics,
            options: config.options(resumed_epoch),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use machine_learning::specs::{LayerSpec, LossFnSpec, ModelSpec, OptimizerSpec, ParamGenSpec};

    use super::*;
    use crate::options::MetricDispatch;

    fn config() -> TrainerConfig {
        TrainerConfig {
            out_dir: std::env::temp_dir(),
            loss: "cross_entropy".into(),
            num_epochs: 1,
            epoch_offset: None,
            dispatch: MetricDispatch::Exclusive,
            metrics: vec!["spectrum_score".into(), "f1_score".into()],
            model: ModelSpec::Sequential {
                layers: vec![LayerSpec::Dense {
                    dim: (2, 4),
                    act_fn: None,
                }],
            },
            init: ParamGenSpec::XavierUniform,
            optimizer: OptimizerSpec::GradientDescent { learning_rate: 0.1 },
            criterion: LossFnSpec::CrossEntropy,
            dataset: DatasetConfig::Synthetic {
                samples: 10,
                height: 2,
                width: 3,
                channels: 2,
                test_fraction: 0.3,
            },
            batch_size: NonZeroUsize::new(4).unwrap(),
            shuffle: true,
            seed: Some(1),
            resume_from: None,
        }
    }

    #[test]
    fn builds_every_component() {
        let session = SessionBuilder::new().build(&config()).unwrap();

        assert_eq!(session.model.size(), 12);
        assert_eq!(session.dataloaders.train.len(), 2);
        assert_eq!(session.dataloaders.test.len(), 1);
        assert_eq!(session.metrics.names().collect::<Vec<_>>(), ["spectrum_score", "f1_score"]);
        assert_eq!(session.options.dispatch, MetricDispatch::Exclusive);
    }

    #[test]
    fn unknown_metrics_fail() {
        let mut config = config();
        config.metrics.push("auc".into());
        assert!(matches!(SessionBuilder::new().build(&config), Err(TrainErr::Ml(_))));
    }
}
