use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use machine_learning::MlErr;

use crate::phase::Phase;

/// The result type used across the trainer.
pub type Result<T> = std::result::Result<T, TrainErr>;

/// All errors that can occur while training.
#[derive(Debug)]
pub enum TrainErr {
    /// Failed to read or write the logs or the snapshots.
    Io(io::Error),
    /// A model, loss, optimizer or metric rejected its inputs.
    Ml(MlErr),
    /// A snapshot couldn't be encoded or decoded.
    Checkpoint(String),
    /// A phase finished without any loss having been computed in the run.
    EmptyPhase(Phase),
    /// The metric used to select the best model isn't in the registry.
    MissingSelectionMetric(&'static str),
    /// Invalid configuration, caught before training.
    InvalidConfig(String),
    Json(serde_json::Error),
    Csv(csv::Error),
}

impl Display for TrainErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Ml(e) => write!(f, "{e}"),
            Self::Checkpoint(msg) => write!(f, "checkpoint error: {msg}"),
            Self::EmptyPhase(phase) => write!(f, "the {phase} phase produced no batches and there's no previous loss"),
            Self::MissingSelectionMetric(name) => {
                write!(f, "the metric registry must contain {name:?} to select the best model")
            }
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Json(e) => write!(f, "invalid json: {e}"),
            Self::Csv(e) => write!(f, "csv error: {e}"),
        }
    }
}

impl Error for TrainErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Ml(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Csv(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for TrainErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<MlErr> for TrainErr {
    fn from(e: MlErr) -> Self {
        Self::Ml(e)
    }
}

impl From<serde_json::Error> for TrainErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<csv::Error> for TrainErr {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e)
    }
}

impl From<safetensors::SafeTensorError> for TrainErr {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Checkpoint(e.to_string())
    }
}
