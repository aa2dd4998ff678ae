use log::warn;
use machine_learning::metrics::MetricRegistry;

use crate::phase::Phase;

/// The per-epoch accumulator of metric values.
///
/// Every metric field starts with a single `0.0` entry, so the epoch mean of a field is taken over
/// one more value than the amount of batches that reported it.
#[derive(Debug, Clone)]
pub struct BatchSummary {
    fields: Vec<(String, Vec<f64>)>,
}

impl BatchSummary {
    /// Creates a new summary with a `<phase>_<metric>` field for every phase and metric.
    pub fn new(metrics: &MetricRegistry) -> Self {
        let fields = Phase::ALL
            .iter()
            .flat_map(|phase| metrics.names().map(move |name| phase.field(name)))
            .map(|field| (field, vec![0.]))
            .collect();

        Self { fields }
    }

    /// Returns every column of an epoch row: `epoch`, the phase losses, and then the metric
    /// fields of every phase.
    pub fn fieldnames(&self) -> Vec<String> {
        let mut names = vec!["epoch".to_string()];
        names.extend(Phase::ALL.iter().map(|phase| phase.field("loss")));
        names.extend(self.fields.iter().map(|(name, _)| name.clone()));
        names
    }

    /// Appends a value to a metric field.
    pub fn push(&mut self, field: &str, value: f64) {
        match self.fields.iter_mut().find(|(name, _)| name == field) {
            Some((_, values)) => values.push(value),
            None => warn!("dropping value for unknown field {field}"),
        }
    }

    pub fn values(&self, field: &str) -> Option<&[f64]> {
        self.fields
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, values)| values.as_slice())
    }

    /// Reduces the summary into the row of an epoch.
    ///
    /// # Arguments
    /// * `epoch` - The epoch number.
    /// * `losses` - The train and test losses of the epoch.
    ///
    /// # Returns
    /// The epoch row, with the mean of every metric field.
    pub fn finish(&self, epoch: usize, (train_loss, test_loss): (f32, f32)) -> EpochRow {
        let means = self
            .fields
            .iter()
            .map(|(name, values)| {
                let mean = values.iter().sum::<f64>() / values.len() as f64;
                (name.clone(), mean)
            })
            .collect();

        EpochRow {
            epoch,
            train_loss,
            test_loss,
            means,
        }
    }
}

/// The aggregated results of an epoch, one value per log column.
#[derive(Debug, Clone, PartialEq)]
pub struct EpochRow {
    pub epoch: usize,
    pub train_loss: f32,
    pub test_loss: f32,
    means: Vec<(String, f64)>,
}

impl EpochRow {
    /// Looks up a metric mean by its field name.
    pub fn get(&self, field: &str) -> Option<f64> {
        self.means
            .iter()
            .find(|(name, _)| name == field)
            .map(|&(_, mean)| mean)
    }

    /// Formats every column of the row, in `BatchSummary::fieldnames` order.
    pub fn record(&self) -> Vec<String> {
        let mut record = vec![
            self.epoch.to_string(),
            format!("{:?}", self.train_loss),
            format!("{:?}", self.test_loss),
        ];

        record.extend(self.means.iter().map(|(_, mean)| format!("{mean:?}")));
        record
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> BatchSummary {
        let metrics = MetricRegistry::from_names(["f1_score", "spectrum_score"]).unwrap();
        BatchSummary::new(&metrics)
    }

    #[test]
    fn fieldnames_follow_phase_then_registry_order() {
        assert_eq!(
            summary().fieldnames(),
            [
                "epoch",
                "Train_loss",
                "Test_loss",
                "Train_f1_score",
                "Train_spectrum_score",
                "Test_f1_score",
                "Test_spectrum_score",
            ]
        );
    }

    #[test]
    fn means_include_the_seed_entry() {
        let mut summary = summary();
        summary.push("Test_spectrum_score", 0.3);
        summary.push("Test_spectrum_score", 0.6);

        let row = summary.finish(1, (0.5, 0.25));
        assert!((row.get("Test_spectrum_score").unwrap() - 0.3).abs() < 1e-12);
        assert_eq!(row.get("Train_f1_score"), Some(0.));
        assert_eq!(row.get("epoch"), None);
    }

    #[test]
    fn records_have_one_column_per_field() {
        let summary = summary();
        let row = summary.finish(2, (0.5, 0.25));
        let record = row.record();

        assert_eq!(record.len(), summary.fieldnames().len());
        assert_eq!(record[..3], ["2", "0.5", "0.25"]);
        assert_eq!(record[3], "0.0");
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let mut summary = summary();
        summary.push("Test_recall_score", 1.);
        assert_eq!(summary.values("Test_recall_score"), None);
    }
}
