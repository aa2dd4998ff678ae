use serde::{Deserialize, Serialize};

/// Which quantity the criterion compares against the masks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LossKind {
    /// The criterion sees the `[pixels, classes]` logits and one-hot masks.
    #[default]
    CrossEntropy,
    /// The criterion sees the `[1, pixels]` spectrum values and the masks as floats.
    Spectrum,
}

impl From<&str> for LossKind {
    /// `"cross_entropy"` selects the logits, any other name selects the spectrum.
    fn from(name: &str) -> Self {
        match name {
            "cross_entropy" => LossKind::CrossEntropy,
            _ => LossKind::Spectrum,
        }
    }
}

/// How metric names map to the calls recorded in the batch summary.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricDispatch {
    /// `f1_score` and `jaccard_score` record a weighted score and then fall through to the generic
    /// branch, recording a second weighted score with the labels truncated to `u8`.
    /// `spectrum_score` records a single raw score.
    #[default]
    FallThrough,
    /// Every metric records exactly one value per batch.
    Exclusive,
}

/// Knobs of a training run.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    pub loss_kind: LossKind,
    pub num_epochs: usize,
    /// Added to the epoch index when naming snapshots, so resumed runs don't overwrite them.
    pub epoch_offset: usize,
    pub dispatch: MetricDispatch,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            loss_kind: LossKind::default(),
            num_epochs: 3,
            epoch_offset: 0,
            dispatch: MetricDispatch::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_cross_entropy_uses_logits() {
        assert_eq!(LossKind::from("cross_entropy"), LossKind::CrossEntropy);
        assert_eq!(LossKind::from("mse"), LossKind::Spectrum);
        assert_eq!(LossKind::from(""), LossKind::Spectrum);
    }

    #[test]
    fn defaults() {
        let options = TrainOptions::default();
        assert_eq!(options.loss_kind, LossKind::CrossEntropy);
        assert_eq!(options.num_epochs, 3);
        assert_eq!(options.epoch_offset, 0);
        assert_eq!(options.dispatch, MetricDispatch::FallThrough);
    }
}
