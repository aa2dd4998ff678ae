//! Training loop for per-pixel corrosion severity segmentation.
//!
//! `train_model` alternates Train and Test phases over a number of epochs, logs the per-epoch
//! means of every metric to CSV and snapshots the model whenever the Test `spectrum_score`
//! improves.

pub mod checkpoint;
pub mod configs;
pub mod dispatch;
mod error;
pub mod logbook;
pub mod options;
pub mod phase;
pub mod summary;
pub mod trainer;

pub use error::{Result, TrainErr};
pub use options::{LossKind, MetricDispatch, TrainOptions};
pub use phase::{Dataloaders, Phase};
pub use trainer::{SELECTION_METRIC, train_model};
