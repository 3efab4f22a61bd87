use specs::MetricSpec;

use super::{Auc, AverageLoss};

/// An evaluation metric accumulated over many batches.
pub trait Metric: Send {
    fn name(&self) -> &'static str;

    /// Accounts for a batch of predicted probabilities and their labels.
    fn accumulate(&mut self, preds: &[f32], labels: &[f32]);

    /// The value over everything accumulated since the last reset.
    fn value(&self) -> f32;

    fn reset(&mut self);
}

/// The set of metrics a session evaluates.
#[derive(Default)]
pub struct Metrics {
    metrics: Vec<Box<dyn Metric>>,
}

impl Metrics {
    pub fn new(metrics: Vec<Box<dyn Metric>>) -> Self {
        Self { metrics }
    }

    pub fn from_spec(specs: &[MetricSpec]) -> Self {
        let metrics = specs
            .iter()
            .map(|spec| -> Box<dyn Metric> {
                match spec {
                    MetricSpec::Auc => Box::new(Auc::default()),
                    MetricSpec::AverageLoss => Box::new(AverageLoss::default()),
                }
            })
            .collect();

        Self::new(metrics)
    }

    pub fn accumulate(&mut self, preds: &[f32], labels: &[f32]) {
        self.metrics
            .iter_mut()
            .for_each(|metric| metric.accumulate(preds, labels));
    }

    /// Finalizes every metric and starts over.
    ///
    /// # Returns
    /// The `(name, value)` of every metric, in configuration order.
    pub fn take(&mut self) -> Vec<(String, f32)> {
        self.metrics
            .iter_mut()
            .map(|metric| {
                let entry = (metric.name().to_string(), metric.value());
                metric.reset();
                entry
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn take_reports_in_order_and_resets() {
        let mut metrics = Metrics::from_spec(&[MetricSpec::AverageLoss, MetricSpec::Auc]);

        metrics.accumulate(&[0.9, 0.1], &[1., 0.]);
        let first = metrics.take();
        let second = metrics.take();

        assert_eq!(first[0].0, "AverageLoss");
        assert_eq!(first[1], ("AUC".to_string(), 1.));
        assert_eq!(second[0].1, 0.);
        assert_eq!(second[1].1, 0.5);
    }
}
