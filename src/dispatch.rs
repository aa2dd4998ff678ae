use machine_learning::metrics::{Average, MetricRegistry};

use crate::{Result, options::MetricDispatch, summary::BatchSummary};

/// A single way of invoking a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    /// Weighted averaging on the labels as they are.
    Weighted,
    /// No averaging, labels as they are.
    Raw,
    /// Weighted averaging with the true labels truncated to `u8`.
    WeightedU8,
}

/// Returns the calls recorded for the metric `name`, in order.
///
/// # Arguments
/// * `name` - The registry name of the metric.
/// * `dispatch` - The dispatch policy.
pub fn calls(name: &str, dispatch: MetricDispatch) -> &'static [Call] {
    match (name, dispatch) {
        ("f1_score" | "jaccard_score", MetricDispatch::FallThrough) => &[Call::Weighted, Call::WeightedU8],
        ("f1_score" | "jaccard_score", MetricDispatch::Exclusive) => &[Call::Weighted],
        ("spectrum_score", _) => &[Call::Raw],
        _ => &[Call::WeightedU8],
    }
}

/// Whether `dispatch` records more than one value per batch for any metric in `metrics`.
pub fn duplicates(metrics: &MetricRegistry, dispatch: MetricDispatch) -> Vec<&str> {
    metrics
        .names()
        .filter(|name| calls(name, dispatch).len() > 1)
        .collect()
}

/// Scores a batch with every registered metric and appends the values to the phase's fields.
///
/// # Arguments
/// * `summary` - The running summary of the epoch.
/// * `prefix` - The phase name fields are prefixed with.
/// * `metrics` - The registry, consulted in order.
/// * `y_true` - The flattened true labels.
/// * `y_pred` - The flattened predicted labels.
/// * `dispatch` - The dispatch policy.
///
/// # Returns
/// An error if a metric fails.
pub fn record_metrics(
    summary: &mut BatchSummary,
    prefix: &str,
    metrics: &MetricRegistry,
    y_true: &[i64],
    y_pred: &[i64],
    dispatch: MetricDispatch,
) -> Result<()> {
    let mut truncated: Option<Vec<i64>> = None;

    for (name, metric) in metrics.iter() {
        let field = format!("{prefix}_{name}");

        for call in calls(name, dispatch) {
            let value = match call {
                Call::Weighted => metric.score(y_true, y_pred, Some(Average::Weighted))?,
                Call::Raw => metric.score(y_true, y_pred, None)?,
                Call::WeightedU8 => {
                    let y_true = truncated.get_or_insert_with(|| y_true.iter().map(|&t| t as u8 as i64).collect());
                    metric.score(y_true, y_pred, Some(Average::Weighted))?
                }
            };

            summary.push(&field, value);
        }
    }

    Ok(())
}
