use super::{Builtin, Metric};
use crate::Result;

/// An ordered mapping from metric names to metrics, consulted in insertion order.
#[derive(Default)]
pub struct MetricRegistry {
    metrics: Vec<(String, Box<dyn Metric>)>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry out of builtin metric names, keeping their order.
    ///
    /// # Arguments
    /// * `names` - The names of the metrics.
    ///
    /// # Returns
    /// The registry or `MlErr::UnknownMetric` for the first unknown name.
    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut registry = Self::new();

        for name in names {
            let builtin = Builtin::from_name(name.as_ref())?;
            registry.insert(builtin.name(), builtin);
        }

        Ok(registry)
    }

    /// Inserts a metric. A metric with the same name is replaced in place.
    pub fn insert<M>(&mut self, name: impl Into<String>, metric: M)
    where
        M: Metric + 'static,
    {
        let name = name.into();
        let metric: Box<dyn Metric> = Box::new(metric);

        match self.metrics.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = metric,
            None => self.metrics.push((name, metric)),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &dyn Metric)> {
        self.metrics.iter().map(|(name, metric)| (name.as_str(), metric.as_ref()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.metrics.iter().map(|(name, _)| name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}
